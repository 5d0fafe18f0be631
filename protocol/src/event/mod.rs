//! # Event Module
//!
//! Everything vvcoin writes to the relay network is a signed NIP-01 event.
//! This module owns both layers of that:
//!
//! ```text
//! envelope.rs: generic signed event: id hashing, signing, verification
//! content.rs : the `{"type": ...}` payloads ledger events carry
//! codec.rs   : envelope <-> typed TransferEvent / CheckpointEvent
//! ```
//!
//! The ledger engines only ever see the typed events. Raw envelopes stay at
//! the relay boundary.

pub mod codec;
pub mod content;
pub mod envelope;

pub use codec::{
    decode, decode_checkpoint, decode_transfer, CheckpointDraft, CheckpointEvent, CodecError,
    EventKind, LedgerEvent, TransferDraft, TransferEvent,
};
pub use content::LedgerContent;
pub use envelope::{EnvelopeError, Event, Tag, UnsignedEvent};
