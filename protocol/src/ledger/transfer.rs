//! # Sending
//!
//! ```text
//! validate ─► reconcile ─► check funds ─► transfer (any relay)
//!                                          ─► checkpoint (every relay)
//! ```
//!
//! The sender reconciles first so the funds check sees every incoming
//! transfer, then publishes the transfer followed by a checkpoint of the
//! post-send balance. The checkpoint absorbs the transfer's own id and
//! shares its timestamp.
//!
//! ## Timestamps
//!
//! Both events are stamped `max(requested, tip + 1)`, where `tip` is the
//! `created_at` of the checkpoint in force after the reconcile step. The
//! post-send checkpoint therefore always sorts strictly after the one it
//! replaces, even when it was signed in the same second or an incoming
//! transfer carried a timestamp from a clock running ahead.
//!
//! ## Concurrency
//!
//! There is no lock between the funds check and the publish. Two sends from
//! the same account racing each other can both pass the check and overdraw.
//! The relay network offers no compare-and-swap, so callers that care must
//! serialize sends per account themselves.
//!
//! ## Failure Points
//!
//! | Step              | Failure                     | State afterwards             |
//! |-------------------|-----------------------------|------------------------------|
//! | validate / funds  | precondition error          | nothing published            |
//! | reconcile         | propagated                  | maybe a receive checkpoint   |
//! | reconcile publish | `CheckpointNotPersisted`    | nothing sent                 |
//! | transfer publish  | `Gateway`                   | nothing new published        |
//! | checkpoint publish| `SendCheckpointNotPersisted`| transfer out, checkpoint not |
//!
//! The last row is the dangerous one: the recipient can already see the
//! transfer. The error carries the transfer id and the signed checkpoint;
//! republish it through [`ReconciliationEngine::republish`] until it sticks.
//! Never retry the send itself there.

use std::sync::Arc;

use tracing::{debug, info};

use super::error::LedgerError;
use super::reconcile::{persist_checkpoint, ReconciliationEngine};
use crate::config::unix_now;
use crate::event::{CheckpointDraft, TransferDraft};
use crate::identity::{Keypair, PublicKey};
use crate::relay::{DeliveryPolicy, RelayGateway};

/// What a successful send produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub transfer_id: String,
    pub checkpoint_id: String,
    /// Sender's balance after the send.
    pub balance: u64,
    /// Timestamp both events were signed with.
    pub created_at: u64,
}

#[derive(Debug, Clone)]
pub struct TransferEngine {
    reconciler: ReconciliationEngine,
}

impl TransferEngine {
    pub fn new(gateway: Arc<RelayGateway>) -> Self {
        Self {
            reconciler: ReconciliationEngine::new(gateway),
        }
    }

    pub fn reconciler(&self) -> &ReconciliationEngine {
        &self.reconciler
    }

    /// Send `amount` to `recipient`, timestamped now.
    pub async fn send(
        &self,
        keypair: &Keypair,
        recipient: &PublicKey,
        amount: u64,
        memo: Option<String>,
    ) -> Result<SendReceipt, LedgerError> {
        self.send_at(keypair, recipient, amount, memo, unix_now())
            .await
    }

    /// Send with an explicit timestamp for both the transfer and the
    /// checkpoint that follows it. The timestamp is pushed forward when the
    /// account already holds a checkpoint at or after it.
    pub async fn send_at(
        &self,
        keypair: &Keypair,
        recipient: &PublicKey,
        amount: u64,
        memo: Option<String>,
        created_at: u64,
    ) -> Result<SendReceipt, LedgerError> {
        let account = keypair.public_key();
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if *recipient == account {
            return Err(LedgerError::SelfTransfer);
        }

        let reconciled = self.reconciler.reconcile(keypair).await?;
        let balance = reconciled.balance;
        if amount > balance {
            return Err(LedgerError::InsufficientFunds {
                balance,
                requested: amount,
            });
        }

        let stamp = match reconciled.tip {
            Some(tip) => created_at.max(tip.saturating_add(1)),
            None => created_at,
        };
        if stamp != created_at {
            debug!(account = %account, requested = created_at, stamp, "send timestamp moved past the latest checkpoint");
        }
        let created_at = stamp;

        let transfer = TransferDraft {
            recipient: *recipient,
            amount,
            memo,
            created_at,
        }
        .sign(keypair)?;
        let gateway = self.reconciler.gateway();
        gateway.publish(&transfer, DeliveryPolicy::AnyOf).await?;
        info!(
            from = %account,
            to = %recipient,
            amount,
            transfer = %transfer.id,
            "transfer published"
        );

        let remaining = balance - amount;
        let checkpoint = CheckpointDraft {
            owner: account,
            balance: remaining,
            absorbed: vec![transfer.id.clone()],
            created_at,
        }
        .sign(keypair)?;
        let checkpoint = match persist_checkpoint(gateway, checkpoint, remaining).await {
            Ok(checkpoint) => checkpoint,
            Err(LedgerError::CheckpointNotPersisted {
                balance,
                checkpoint,
                source,
            }) => {
                return Err(LedgerError::SendCheckpointNotPersisted {
                    transfer_id: transfer.id,
                    balance,
                    checkpoint,
                    source,
                })
            }
            Err(e) => return Err(e),
        };
        info!(account = %account, checkpoint = %checkpoint.id, balance = remaining, "post-send checkpoint published");

        Ok(SendReceipt {
            transfer_id: transfer.id,
            checkpoint_id: checkpoint.id,
            balance: remaining,
            created_at,
        })
    }
}
