//! Ledger errors.
//!
//! Three families, and callers treat them differently:
//!
//! - **Preconditions** (`InvalidAmount`, `SelfTransfer`, `InsufficientFunds`):
//!   raised before anything is published. Nothing happened; retrying the
//!   same request fails the same way.
//! - **Infrastructure** (`Gateway`, `CheckpointNotPersisted`,
//!   `SendCheckpointNotPersisted`): relays were unreachable or disagreed.
//!   Safe to retry. The checkpoint variants carry the exact checkpoint that
//!   was signed so the retry can republish it instead of recomputing.
//!   `SendCheckpointNotPersisted` additionally means the transfer itself is
//!   already out: retrying the whole send would pay twice.
//! - **Arithmetic** (`BalanceOverflow`): the incoming sum does not fit in a
//!   `u64`. Somebody is lying; no retry helps.

use thiserror::Error;

use crate::event::{CodecError, Event};
use crate::relay::GatewayError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("cannot send to yourself")]
    SelfTransfer,

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    #[error("balance overflow while folding incoming transfers")]
    BalanceOverflow,

    #[error("checkpoint {} for balance {balance} was not stored on every relay: {source}", .checkpoint.id)]
    CheckpointNotPersisted {
        balance: u64,
        checkpoint: Box<Event>,
        #[source]
        source: GatewayError,
    },

    #[error(
        "transfer {transfer_id} was published but checkpoint {} for balance {balance} \
         was not stored on every relay: {source}",
        .checkpoint.id
    )]
    SendCheckpointNotPersisted {
        transfer_id: String,
        balance: u64,
        checkpoint: Box<Event>,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl LedgerError {
    /// Whether repeating the operation (or republishing the carried
    /// checkpoint) can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CheckpointNotPersisted { .. } | Self::SendCheckpointNotPersisted { .. } => true,
            Self::Gateway(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The signed checkpoint a failed publish left behind, if any.
    pub fn unpublished_checkpoint(&self) -> Option<&Event> {
        match self {
            Self::CheckpointNotPersisted { checkpoint, .. }
            | Self::SendCheckpointNotPersisted { checkpoint, .. } => Some(checkpoint),
            _ => None,
        }
    }

    /// Id of a transfer that reached the relays even though the operation
    /// as a whole failed.
    pub fn published_transfer(&self) -> Option<&str> {
        match self {
            Self::SendCheckpointNotPersisted { transfer_id, .. } => Some(transfer_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CheckpointDraft;
    use crate::identity::Keypair;

    #[test]
    fn retryability() {
        assert!(!LedgerError::InvalidAmount.is_retryable());
        assert!(!LedgerError::InsufficientFunds {
            balance: 1,
            requested: 2
        }
        .is_retryable());
        assert!(!LedgerError::Gateway(GatewayError::NoEndpoints).is_retryable());
        assert!(
            LedgerError::Gateway(GatewayError::AllEndpointsUnreachable { failures: vec![] })
                .is_retryable()
        );
    }

    #[test]
    fn unpersisted_checkpoint_is_recoverable() {
        let kp = Keypair::generate();
        let checkpoint = CheckpointDraft {
            owner: kp.public_key(),
            balance: 9,
            absorbed: vec![],
            created_at: 1,
        }
        .sign(&kp)
        .unwrap();
        let err = LedgerError::CheckpointNotPersisted {
            balance: 9,
            checkpoint: Box::new(checkpoint.clone()),
            source: GatewayError::AllEndpointsUnreachable { failures: vec![] },
        };
        assert!(err.is_retryable());
        assert_eq!(err.unpublished_checkpoint(), Some(&checkpoint));
        assert_eq!(err.published_transfer(), None);
        assert!(err.to_string().contains(&checkpoint.id));
    }

    #[test]
    fn send_side_failure_names_the_transfer() {
        let kp = Keypair::generate();
        let checkpoint = CheckpointDraft {
            owner: kp.public_key(),
            balance: 3,
            absorbed: vec!["aa".repeat(32)],
            created_at: 7,
        }
        .sign(&kp)
        .unwrap();
        let err = LedgerError::SendCheckpointNotPersisted {
            transfer_id: "aa".repeat(32),
            balance: 3,
            checkpoint: Box::new(checkpoint.clone()),
            source: GatewayError::AllEndpointsUnreachable { failures: vec![] },
        };
        assert!(err.is_retryable());
        assert_eq!(err.unpublished_checkpoint(), Some(&checkpoint));
        assert_eq!(err.published_transfer(), Some("aa".repeat(32).as_str()));
        assert!(err.to_string().starts_with("transfer aaaa"));
    }
}
