//! Balance issuance for development networks.
//!
//! Publishes a self-authored checkpoint with whatever balance the caller
//! names and nothing absorbed. There is no mint authority in the protocol;
//! anyone can do this to their own account, and anyone reading the account
//! will believe it. Exposed only behind the CLI's `debug` commands.

use tracing::warn;

use super::error::LedgerError;
use super::reconcile::persist_checkpoint;
use crate::event::{decode_checkpoint, CheckpointDraft, CheckpointEvent};
use crate::identity::Keypair;
use crate::relay::RelayGateway;

/// Overwrite `keypair`'s balance with `balance` as of `created_at`.
///
/// Incoming transfers older than `created_at` that were never reconciled
/// fall below the new watermark and are not counted.
pub async fn issue(
    gateway: &RelayGateway,
    keypair: &Keypair,
    balance: u64,
    created_at: u64,
) -> Result<CheckpointEvent, LedgerError> {
    let account = keypair.public_key();
    let event = CheckpointDraft {
        owner: account,
        balance,
        absorbed: Vec::new(),
        created_at,
    }
    .sign(keypair)?;
    let event = persist_checkpoint(gateway, event, balance).await?;
    warn!(account = %account, balance, checkpoint = %event.id, "issued balance");
    Ok(decode_checkpoint(&event)?)
}
