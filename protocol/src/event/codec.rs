//! # Ledger Event Codec
//!
//! Translates between the generic [`Event`] envelope and the two typed
//! ledger events. Decoding fails closed. An event is only handed to the
//! ledger when every check passes:
//!
//! 1. `kind` is one of the two ledger kinds.
//! 2. The id is the content hash and the signature verifies.
//! 3. `content` parses as a [`LedgerContent`] whose `type` matches the kind.
//! 4. Kind-specific fields are present and sane (recipient tag, non-zero
//!    amount).
//!
//! Anything else is a [`CodecError`], which the reconciliation engine logs
//! and skips.

use std::collections::BTreeSet;

use thiserror::Error;

use super::content::LedgerContent;
use super::envelope::{EnvelopeError, Event, UnsignedEvent};
use crate::config::{CHECKPOINT_KIND, TAG_EVENT, TAG_PUBKEY, TRANSFER_KIND};
use crate::identity::{Keypair, PublicKey};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown event kind {0}")]
    UnknownKind(u32),

    #[error("envelope rejected: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("malformed content: {0}")]
    MalformedContent(String),

    #[error("content type '{content_type}' does not belong to kind {kind}")]
    KindMismatch { kind: u32, content_type: &'static str },

    #[error("transfer has no valid 'p' recipient tag")]
    MissingRecipient,

    #[error("transfer amount must be positive")]
    ZeroAmount,
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The two ledger event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Transfer,
    Checkpoint,
}

impl EventKind {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Transfer => TRANSFER_KIND,
            Self::Checkpoint => CHECKPOINT_KIND,
        }
    }
}

impl TryFrom<u32> for EventKind {
    type Error = CodecError;

    fn try_from(kind: u32) -> Result<Self, Self::Error> {
        match kind {
            TRANSFER_KIND => Ok(Self::Transfer),
            CHECKPOINT_KIND => Ok(Self::Checkpoint),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed Events
// ---------------------------------------------------------------------------

/// A verified transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub id: String,
    pub sender: PublicKey,
    pub recipient: PublicKey,
    pub amount: u64,
    pub memo: Option<String>,
    pub created_at: u64,
    pub signature: String,
}

/// A verified checkpoint. `owner` is the author; nobody else can sign one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEvent {
    pub id: String,
    pub owner: PublicKey,
    pub balance: u64,
    pub created_at: u64,
    pub absorbed: BTreeSet<String>,
    pub signature: String,
}

impl CheckpointEvent {
    /// First `created_at` not yet covered by this checkpoint.
    pub fn watermark(&self) -> u64 {
        self.created_at.saturating_add(1)
    }
}

/// Any decoded ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    Transfer(TransferEvent),
    Checkpoint(CheckpointEvent),
}

// ---------------------------------------------------------------------------
// Drafts (encode side)
// ---------------------------------------------------------------------------

/// Fields of a transfer before it is signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDraft {
    pub recipient: PublicKey,
    pub amount: u64,
    pub memo: Option<String>,
    pub created_at: u64,
}

impl TransferDraft {
    pub fn encode(&self) -> UnsignedEvent {
        let content = LedgerContent::Send {
            amount: self.amount,
            memo: self.memo.clone(),
        };
        UnsignedEvent {
            created_at: self.created_at,
            kind: TRANSFER_KIND,
            tags: vec![vec![TAG_PUBKEY.to_string(), self.recipient.to_hex()]],
            content: content.to_json(),
        }
    }

    pub fn sign(&self, keypair: &Keypair) -> Result<Event, CodecError> {
        Ok(self.encode().sign(keypair)?)
    }
}

/// Fields of a checkpoint before it is signed. The owner is whoever signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointDraft {
    pub owner: PublicKey,
    pub balance: u64,
    pub absorbed: Vec<String>,
    pub created_at: u64,
}

impl CheckpointDraft {
    pub fn encode(&self) -> UnsignedEvent {
        let mut tags = Vec::with_capacity(self.absorbed.len() + 1);
        tags.push(vec![TAG_PUBKEY.to_string(), self.owner.to_hex()]);
        tags.extend(
            self.absorbed
                .iter()
                .map(|id| vec![TAG_EVENT.to_string(), id.clone()]),
        );
        UnsignedEvent {
            created_at: self.created_at,
            kind: CHECKPOINT_KIND,
            tags,
            content: LedgerContent::Fix {
                balance: self.balance,
            }
            .to_json(),
        }
    }

    pub fn sign(&self, keypair: &Keypair) -> Result<Event, CodecError> {
        Ok(self.encode().sign(keypair)?)
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode and verify any ledger event.
pub fn decode(event: &Event) -> Result<LedgerEvent, CodecError> {
    let kind = EventKind::try_from(event.kind)?;
    event.verify()?;

    let content = LedgerContent::from_json(&event.content)
        .map_err(|e| CodecError::MalformedContent(e.to_string()))?;

    match (kind, content) {
        (EventKind::Transfer, LedgerContent::Send { amount, memo }) => {
            if amount == 0 {
                return Err(CodecError::ZeroAmount);
            }
            let recipient = event
                .first_tag_value(TAG_PUBKEY)
                .and_then(|hex| PublicKey::from_hex(hex).ok())
                .ok_or(CodecError::MissingRecipient)?;
            Ok(LedgerEvent::Transfer(TransferEvent {
                id: event.id.clone(),
                sender: event.author()?,
                recipient,
                amount,
                memo,
                created_at: event.created_at,
                signature: event.sig.clone(),
            }))
        }
        (EventKind::Checkpoint, LedgerContent::Fix { balance }) => {
            Ok(LedgerEvent::Checkpoint(CheckpointEvent {
                id: event.id.clone(),
                owner: event.author()?,
                balance,
                created_at: event.created_at,
                absorbed: event.tag_values(TAG_EVENT).map(str::to_string).collect(),
                signature: event.sig.clone(),
            }))
        }
        (kind, content) => Err(CodecError::KindMismatch {
            kind: kind.as_u32(),
            content_type: content.type_name(),
        }),
    }
}

/// Decode an event that must be a transfer.
pub fn decode_transfer(event: &Event) -> Result<TransferEvent, CodecError> {
    match decode(event)? {
        LedgerEvent::Transfer(transfer) => Ok(transfer),
        LedgerEvent::Checkpoint(_) => Err(CodecError::KindMismatch {
            kind: event.kind,
            content_type: crate::config::CONTENT_TYPE_FIX,
        }),
    }
}

/// Decode an event that must be a checkpoint.
pub fn decode_checkpoint(event: &Event) -> Result<CheckpointEvent, CodecError> {
    match decode(event)? {
        LedgerEvent::Checkpoint(checkpoint) => Ok(checkpoint),
        LedgerEvent::Transfer(_) => Err(CodecError::KindMismatch {
            kind: event.kind,
            content_type: crate::config::CONTENT_TYPE_SEND,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: u32, tags: Vec<Vec<String>>, content: &str, kp: &Keypair) -> Event {
        UnsignedEvent {
            created_at: 100,
            kind,
            tags,
            content: content.to_string(),
        }
        .sign(kp)
        .unwrap()
    }

    #[test]
    fn transfer_encode_decode() {
        let alice = Keypair::generate();
        let bob = Keypair::generate().public_key();
        let event = TransferDraft {
            recipient: bob,
            amount: 30,
            memo: Some("coffee".into()),
            created_at: 42,
        }
        .sign(&alice)
        .unwrap();

        assert_eq!(event.kind, 2940);
        let transfer = decode_transfer(&event).unwrap();
        assert_eq!(transfer.sender, alice.public_key());
        assert_eq!(transfer.recipient, bob);
        assert_eq!(transfer.amount, 30);
        assert_eq!(transfer.memo.as_deref(), Some("coffee"));
        assert_eq!(transfer.created_at, 42);
        assert_eq!(transfer.id, event.id);
    }

    #[test]
    fn checkpoint_carries_owner_and_absorbed_tags() {
        let alice = Keypair::generate();
        let event = CheckpointDraft {
            owner: alice.public_key(),
            balance: 70,
            absorbed: vec!["aa".repeat(32), "bb".repeat(32)],
            created_at: 15,
        }
        .sign(&alice)
        .unwrap();

        assert_eq!(event.kind, 12940);
        assert_eq!(
            event.first_tag_value("p"),
            Some(alice.public_key().to_hex().as_str())
        );
        let checkpoint = decode_checkpoint(&event).unwrap();
        assert_eq!(checkpoint.owner, alice.public_key());
        assert_eq!(checkpoint.balance, 70);
        assert_eq!(checkpoint.absorbed.len(), 2);
        assert_eq!(checkpoint.watermark(), 16);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let kp = Keypair::generate();
        let event = raw(1, vec![], r#"{"type":"fix","balance":1}"#, &kp);
        assert!(matches!(decode(&event), Err(CodecError::UnknownKind(1))));
    }

    #[test]
    fn content_must_match_kind() {
        let kp = Keypair::generate();
        let event = raw(TRANSFER_KIND, vec![], r#"{"type":"fix","balance":1}"#, &kp);
        assert!(matches!(
            decode(&event),
            Err(CodecError::KindMismatch {
                kind: 2940,
                content_type: "fix"
            })
        ));
    }

    #[test]
    fn negative_balance_is_malformed() {
        let kp = Keypair::generate();
        let event = raw(CHECKPOINT_KIND, vec![], r#"{"type":"fix","balance":-1}"#, &kp);
        assert!(matches!(
            decode(&event),
            Err(CodecError::MalformedContent(_))
        ));
    }

    #[test]
    fn transfer_requires_recipient_and_positive_amount() {
        let kp = Keypair::generate();
        let no_recipient = raw(TRANSFER_KIND, vec![], r#"{"type":"send","amount":5}"#, &kp);
        assert!(matches!(
            decode(&no_recipient),
            Err(CodecError::MissingRecipient)
        ));

        let bad_recipient = raw(
            TRANSFER_KIND,
            vec![vec!["p".into(), "zz".into()]],
            r#"{"type":"send","amount":5}"#,
            &kp,
        );
        assert!(matches!(
            decode(&bad_recipient),
            Err(CodecError::MissingRecipient)
        ));

        let zero = raw(
            TRANSFER_KIND,
            vec![vec!["p".into(), kp.public_key().to_hex()]],
            r#"{"type":"send","amount":0}"#,
            &kp,
        );
        assert!(matches!(decode(&zero), Err(CodecError::ZeroAmount)));
    }

    #[test]
    fn forged_signature_is_rejected() {
        let kp = Keypair::generate();
        let mut event = CheckpointDraft {
            owner: kp.public_key(),
            balance: 1,
            absorbed: vec![],
            created_at: 1,
        }
        .sign(&kp)
        .unwrap();
        event.sig = "00".repeat(64);
        assert!(matches!(decode(&event), Err(CodecError::Envelope(_))));
    }

    #[test]
    fn typed_decoders_reject_the_other_kind() {
        let kp = Keypair::generate();
        let checkpoint = CheckpointDraft {
            owner: kp.public_key(),
            balance: 1,
            absorbed: vec![],
            created_at: 1,
        }
        .sign(&kp)
        .unwrap();
        assert!(decode_transfer(&checkpoint).is_err());
        assert!(decode_checkpoint(&checkpoint).is_ok());
    }
}
