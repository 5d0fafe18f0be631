//! # Reconciliation
//!
//! Folds an account's incoming transfers into a new checkpoint.
//!
//! ## The Fold
//!
//! ```text
//!   latest self-authored checkpoint ──► prior balance, watermark
//!                                        │
//!   transfers #p=account since watermark ┘──► Σ amount
//!                                        │
//!   nothing new?  ──► done, publish nothing
//!   otherwise     ──► checkpoint(prior + Σ, absorbed = ids,
//!                                created_at = max transfer created_at)
//!                     published to every relay
//! ```
//!
//! The checkpoint's `created_at` is the newest absorbed transfer's timestamp,
//! not "now". The watermark therefore lands right after the last transfer we
//! actually saw, never past a gap we didn't.
//!
//! ## Retries
//!
//! Event ids exclude the signature, so reconciling the same relay state twice
//! yields the same checkpoint id. The absorbed ids are sorted before signing
//! for the same reason. A failed publish hands back the signed checkpoint in
//! [`LedgerError::CheckpointNotPersisted`]; republishing it is idempotent.
//!
//! ## What Gets Ignored
//!
//! - Events that fail to decode (bad signature, bad content, wrong kind).
//! - Checkpoints not authored by the account itself.
//! - Transfers the account sent to itself.
//! - Transfers already listed in the prior checkpoint's absorbed set.
//!
//! Each of these is logged at `warn` or `debug` and skipped. One bad event
//! never fails a reconciliation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::LedgerError;
use crate::event::{
    decode_checkpoint, decode_transfer, CheckpointDraft, CheckpointEvent, Event, EventKind,
    TransferEvent,
};
use crate::identity::{Keypair, PublicKey};
use crate::relay::{DeliveryPolicy, Filter, PublishReceipt, RelayGateway};

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Balance after folding.
    pub balance: u64,
    /// The checkpoint this run published. `None` when there was nothing new.
    pub checkpoint: Option<CheckpointEvent>,
    /// The transfers folded in by this run, newest first.
    pub absorbed: Vec<TransferEvent>,
    /// `created_at` of the checkpoint in force after this run: the one just
    /// published, else the prior one. `None` for an account with no history.
    pub tip: Option<u64>,
}

impl Reconciliation {
    pub fn published(&self) -> bool {
        self.checkpoint.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    gateway: Arc<RelayGateway>,
}

impl ReconciliationEngine {
    pub fn new(gateway: Arc<RelayGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<RelayGateway> {
        &self.gateway
    }

    /// The account's newest valid self-authored checkpoint.
    ///
    /// Asks each relay for its newest candidate first. If the winner turns
    /// out to be unusable, scans every checkpoint addressed to the account
    /// for the newest one that is.
    pub async fn latest_checkpoint(
        &self,
        account: &PublicKey,
    ) -> Result<Option<CheckpointEvent>, LedgerError> {
        let filter = checkpoint_filter(account);

        let Some(candidate) = self.gateway.query_latest(&filter).await? else {
            debug!(account = %account, "no checkpoint on any relay");
            return Ok(None);
        };
        if let Some(checkpoint) = accept_checkpoint(&candidate, account) {
            return Ok(Some(checkpoint));
        }

        warn!(
            account = %account,
            event_id = %candidate.id,
            "newest checkpoint is unusable, scanning full history"
        );
        let history = self.gateway.query_all(&filter).await?;
        Ok(history
            .iter()
            .find_map(|event| accept_checkpoint(event, account)))
    }

    /// Balance as of the latest checkpoint, without folding anything.
    pub async fn current_balance(&self, account: &PublicKey) -> Result<u64, LedgerError> {
        Ok(self
            .latest_checkpoint(account)
            .await?
            .map_or(0, |checkpoint| checkpoint.balance))
    }

    /// Valid incoming transfers created at or after `since`, newest first.
    /// Self-transfers are dropped.
    pub async fn pending_transfers(
        &self,
        account: &PublicKey,
        since: u64,
    ) -> Result<Vec<TransferEvent>, LedgerError> {
        let filter = Filter::new()
            .kind(EventKind::Transfer)
            .addressed_to(account)
            .since(since);
        let events = self.gateway.query_all(&filter).await?;

        let mut transfers = Vec::with_capacity(events.len());
        for event in &events {
            match decode_transfer(event) {
                Ok(transfer) if transfer.sender == *account => {
                    debug!(event_id = %event.id, "ignoring self-transfer");
                }
                Ok(transfer) if transfer.recipient != *account => {
                    warn!(event_id = %event.id, "transfer names another recipient, skipping");
                }
                Ok(transfer) => transfers.push(transfer),
                Err(error) => {
                    warn!(event_id = %event.id, %error, "skipping malformed transfer");
                }
            }
        }
        Ok(transfers)
    }

    /// Fold everything new into a fresh checkpoint and publish it.
    pub async fn reconcile(&self, keypair: &Keypair) -> Result<Reconciliation, LedgerError> {
        let account = keypair.public_key();
        let prior = self.latest_checkpoint(&account).await?;
        let (prior_balance, watermark) = prior
            .as_ref()
            .map_or((0, 0), |checkpoint| (checkpoint.balance, checkpoint.watermark()));

        let mut transfers = self.pending_transfers(&account, watermark).await?;
        if let Some(prior) = &prior {
            transfers.retain(|transfer| !prior.absorbed.contains(&transfer.id));
        }

        if transfers.is_empty() {
            debug!(account = %account, balance = prior_balance, "nothing to reconcile");
            return Ok(Reconciliation {
                balance: prior_balance,
                checkpoint: None,
                absorbed: Vec::new(),
                tip: prior.map(|checkpoint| checkpoint.created_at),
            });
        }

        let balance = transfers
            .iter()
            .try_fold(prior_balance, |acc, transfer| acc.checked_add(transfer.amount))
            .ok_or(LedgerError::BalanceOverflow)?;
        let created_at = transfers
            .iter()
            .map(|transfer| transfer.created_at)
            .max()
            .unwrap_or(watermark);
        let mut absorbed: Vec<String> = transfers.iter().map(|t| t.id.clone()).collect();
        absorbed.sort();

        let event = CheckpointDraft {
            owner: account,
            balance,
            absorbed,
            created_at,
        }
        .sign(keypair)?;
        let event = persist_checkpoint(&self.gateway, event, balance).await?;
        let checkpoint = decode_checkpoint(&event)?;

        info!(
            account = %account,
            checkpoint = %checkpoint.id,
            absorbed = transfers.len(),
            balance,
            "reconciled"
        );
        Ok(Reconciliation {
            balance,
            tip: Some(checkpoint.created_at),
            checkpoint: Some(checkpoint),
            absorbed: transfers,
        })
    }

    /// Publish a previously signed checkpoint to every relay again.
    pub async fn republish(&self, checkpoint: &Event) -> Result<PublishReceipt, LedgerError> {
        let decoded = decode_checkpoint(checkpoint)?;
        self.gateway
            .publish(checkpoint, DeliveryPolicy::AllOf)
            .await
            .map_err(|source| LedgerError::CheckpointNotPersisted {
                balance: decoded.balance,
                checkpoint: Box::new(checkpoint.clone()),
                source,
            })
    }
}

/// Publish a signed checkpoint to every relay, handing it back on success
/// and inside the error on failure.
pub(crate) async fn persist_checkpoint(
    gateway: &RelayGateway,
    event: Event,
    balance: u64,
) -> Result<Event, LedgerError> {
    match gateway.publish(&event, DeliveryPolicy::AllOf).await {
        Ok(_) => Ok(event),
        Err(source) => Err(LedgerError::CheckpointNotPersisted {
            balance,
            checkpoint: Box::new(event),
            source,
        }),
    }
}

fn checkpoint_filter(account: &PublicKey) -> Filter {
    Filter::new()
        .kind(EventKind::Checkpoint)
        .author(account)
        .addressed_to(account)
}

fn accept_checkpoint(event: &Event, account: &PublicKey) -> Option<CheckpointEvent> {
    match decode_checkpoint(event) {
        Ok(checkpoint) if checkpoint.owner == *account => Some(checkpoint),
        Ok(checkpoint) => {
            warn!(event_id = %event.id, owner = %checkpoint.owner, "ignoring checkpoint by another author");
            None
        }
        Err(error) => {
            warn!(event_id = %event.id, %error, "skipping malformed checkpoint");
            None
        }
    }
}
