//! # Key Management
//!
//! secp256k1 keypairs for vvcoin accounts, signing with BIP-340 Schnorr the
//! way every Nostr relay expects. The public half is the 32-byte x-only key
//! that shows up as `pubkey` on every event; the secret half is a 32-byte
//! scalar that never leaves this process except through [`Keypair::to_nsec`].
//!
//! ## Security considerations
//!
//! - Key generation uses `OsRng`.
//! - Signing mixes fresh auxiliary randomness into every signature, as
//!   BIP-340 recommends. Two signatures over the same event id differ; the id
//!   itself does not.
//! - Secret bytes never show up in `Debug` output.

use k256::schnorr::signature::hazmat::PrehashVerifier;
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::nip19;
use crate::config::{KEY_LENGTH, NPUB_HRP, NSEC_HRP, SIGNATURE_LENGTH};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key: not a valid x-only secp256k1 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signing failed")]
    SigningFailed,

    #[error(transparent)]
    Encoding(#[from] nip19::Nip19Error),
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// An account's signing keypair.
///
/// `Keypair` intentionally does NOT implement `Serialize`. Persisting a
/// secret should be a deliberate call to [`to_nsec`](Self::to_nsec), not a
/// side effect of shoving a struct into a JSON response.
///
/// ```
/// use vvcoin_protocol::identity::Keypair;
///
/// let kp = Keypair::generate();
/// let restored = Keypair::from_nsec(&kp.to_nsec()).unwrap();
/// assert_eq!(kp.public_key(), restored.public_key());
/// ```
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuild a keypair from a raw 32-byte secret.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_bytes(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Rebuild a keypair from a hex-encoded secret.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_secret_bytes(&bytes)
    }

    /// Rebuild a keypair from a NIP-19 `nsec1...` string.
    pub fn from_nsec(nsec: &str) -> Result<Self, KeyError> {
        let bytes = nip19::decode(NSEC_HRP, nsec)?;
        Self::from_secret_bytes(&bytes)
    }

    /// Public identifier of this account.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Raw secret scalar. Handle with care.
    pub fn secret_bytes(&self) -> [u8; KEY_LENGTH] {
        let mut out = [0u8; KEY_LENGTH];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// NIP-19 encoding of the secret, the form the profile store keeps.
    pub fn to_nsec(&self) -> String {
        nip19::encode(NSEC_HRP, &self.secret_bytes())
    }

    /// Sign a 32-byte digest (an event id) with BIP-340 Schnorr.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH], KeyError> {
        let mut aux_rand = [0u8; 32];
        OsRng.fill_bytes(&mut aux_rand);
        let signature = self
            .signing_key
            .sign_prehash_with_aux_rand(digest, &aux_rand)
            .map_err(|_| KeyError::SigningFailed)?;
        Ok(signature.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for Keypair {
    /// Identity is the public key; secrets are never compared.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for Keypair {}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// The x-only public key identifying an account on the relay network.
///
/// Hex on the wire (`pubkey`, `p` tags), `npub1...` for humans.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey {
    bytes: [u8; KEY_LENGTH],
}

impl PublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        bytes.copy_from_slice(&key.to_bytes());
        Self { bytes }
    }

    /// Validate and wrap raw x-only key bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let key = VerifyingKey::from_bytes(slice).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self::from_verifying_key(&key))
    }

    /// Parse the lowercase hex form used on the wire.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_slice(&bytes)
    }

    /// Parse a NIP-19 `npub1...` string.
    pub fn from_npub(s: &str) -> Result<Self, KeyError> {
        let bytes = nip19::decode(NPUB_HRP, s)?;
        Self::from_slice(&bytes)
    }

    /// Accepts either `npub1...` or 64 hex characters.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let s = s.trim();
        if s.starts_with(NPUB_HRP) {
            Self::from_npub(s)
        } else {
            Self::from_hex(s)
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn to_npub(&self) -> String {
        nip19::encode(NPUB_HRP, &self.bytes)
    }

    /// Verify a BIP-340 signature over a 32-byte digest.
    ///
    /// Returns `false` for anything that doesn't check out, including
    /// signatures of the wrong length. Callers only want a yes/no here.
    pub fn verify_prehash(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        key.verify_prehash(digest, &signature).is_ok()
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn digest(msg: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(msg));
        out
    }

    #[test]
    fn sign_verify_roundtrip() {
        let kp = Keypair::generate();
        let d = digest(b"send 30 vvc to bob");
        let sig = kp.sign_prehash(&d).unwrap();
        assert!(kp.public_key().verify_prehash(&d, &sig));
    }

    #[test]
    fn wrong_digest_fails_verification() {
        let kp = Keypair::generate();
        let sig = kp.sign_prehash(&digest(b"right")).unwrap();
        assert!(!kp.public_key().verify_prehash(&digest(b"wrong"), &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let d = digest(b"message");
        let sig = alice.sign_prehash(&d).unwrap();
        assert!(!bob.public_key().verify_prehash(&d, &sig));
    }

    #[test]
    fn truncated_signature_is_rejected_not_panicking() {
        let kp = Keypair::generate();
        let d = digest(b"message");
        let sig = kp.sign_prehash(&d).unwrap();
        assert!(!kp.public_key().verify_prehash(&d, &sig[..63]));
    }

    #[test]
    fn nsec_roundtrip() {
        let kp = Keypair::generate();
        let nsec = kp.to_nsec();
        assert!(nsec.starts_with("nsec1"));
        assert_eq!(Keypair::from_nsec(&nsec).unwrap(), kp);
    }

    #[test]
    fn hex_secret_roundtrip() {
        let kp = Keypair::generate();
        let restored = Keypair::from_hex(&hex::encode(kp.secret_bytes())).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
    }

    #[test]
    fn zero_secret_is_rejected() {
        assert!(Keypair::from_secret_bytes(&[0u8; 32]).is_err());
        assert!(Keypair::from_hex("deadbeef").is_err());
    }

    #[test]
    fn public_key_parses_hex_and_npub() {
        let pk = Keypair::generate().public_key();
        assert_eq!(PublicKey::parse(&pk.to_hex()).unwrap(), pk);
        assert_eq!(PublicKey::parse(&pk.to_npub()).unwrap(), pk);
        assert_eq!(pk.to_hex().parse::<PublicKey>().unwrap(), pk);
    }

    #[test]
    fn nsec_is_not_accepted_as_public_key() {
        let kp = Keypair::generate();
        assert!(PublicKey::parse(&kp.to_nsec()).is_err());
    }

    #[test]
    fn known_vector_from_nip19() {
        // Test vector published in NIP-19.
        let pk = PublicKey::from_hex(
            "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e",
        )
        .unwrap();
        assert_eq!(
            pk.to_npub(),
            "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg"
        );
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = Keypair::generate();
        let dbg = format!("{:?}", kp);
        assert!(dbg.starts_with("Keypair(pub="));
        assert!(!dbg.contains(&hex::encode(kp.secret_bytes())));
    }
}
