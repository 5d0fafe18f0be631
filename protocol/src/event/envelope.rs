//! # Signed Event Envelope
//!
//! The generic container every relay stores, independent of what vvcoin puts
//! inside it. Layout and id derivation follow NIP-01:
//!
//! ```text
//! id  = sha256( json([0, pubkey, created_at, kind, tags, content]) )
//! sig = bip340_schnorr(secret, id)
//! ```
//!
//! The id covers everything except the signature, so re-signing identical
//! content yields the same id with a different `sig`. The ledger leans on
//! this: a checkpoint recomputed after a failed publish has the same id as
//! the one that failed.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::identity::{KeyError, Keypair, PublicKey};

/// Errors raised while signing or verifying an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("event id does not match its content hash")]
    IdMismatch,

    #[error("event signature does not verify against its pubkey")]
    InvalidSignature,

    #[error("malformed hex in field '{0}'")]
    MalformedHex(&'static str),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A tag is an array of strings; the first element is its key.
pub type Tag = Vec<String>;

/// A signed event exactly as relays store and serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

/// An event before signing. The author is implied by the keypair used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// Compute the id this event will have once `author` signs it.
    pub fn id_for(&self, author: &PublicKey) -> [u8; 32] {
        compute_id(
            &author.to_hex(),
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Sign with the given keypair, producing a relay-ready event.
    pub fn sign(self, keypair: &Keypair) -> Result<Event, EnvelopeError> {
        let author = keypair.public_key();
        let id = self.id_for(&author);
        let sig = keypair.sign_prehash(&id)?;
        Ok(Event {
            id: hex::encode(id),
            pubkey: author.to_hex(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig),
        })
    }
}

impl Event {
    /// Check that the id is the content hash and that the signature is valid.
    pub fn verify(&self) -> Result<(), EnvelopeError> {
        let author = self.author()?;
        let expected = compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        let claimed = hex::decode(&self.id).map_err(|_| EnvelopeError::MalformedHex("id"))?;
        if claimed.as_slice() != expected.as_slice() {
            return Err(EnvelopeError::IdMismatch);
        }
        let sig = hex::decode(&self.sig).map_err(|_| EnvelopeError::MalformedHex("sig"))?;
        if !author.verify_prehash(&expected, &sig) {
            return Err(EnvelopeError::InvalidSignature);
        }
        Ok(())
    }

    /// The author's public key.
    pub fn author(&self) -> Result<PublicKey, EnvelopeError> {
        Ok(PublicKey::from_hex(&self.pubkey)?)
    }

    /// Value of the first tag with the given key, if any.
    pub fn first_tag_value<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        self.tag_values(key).next()
    }

    /// Values (second element) of every tag with the given key.
    pub fn tag_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter_map(move |tag| match tag.as_slice() {
            [k, value, ..] if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

/// NIP-01 canonical serialization hashed with SHA-256.
fn compute_id(pubkey: &str, created_at: u64, kind: u32, tags: &[Tag], content: &str) -> [u8; 32] {
    let canonical = json!([0, pubkey, created_at, kind, tags, content]).to_string();
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(canonical.as_bytes()));
    out
}
