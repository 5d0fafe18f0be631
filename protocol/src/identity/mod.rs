//! # Identity Module
//!
//! Every vvcoin account is a secp256k1 keypair. The public key is the
//! account id as far as relays and other wallets are concerned; the secret
//! signs every transfer and checkpoint the account ever publishes.
//!
//! 1. **Keys**: generation, Schnorr signing, verification.
//! 2. **NIP-19**: `npub1...` / `nsec1...` bech32 forms for humans and for
//!    the local profile file.
//!
//! Nothing in the ledger core touches key material directly. It only asks an
//! event to be signed by a [`Keypair`] and compares [`PublicKey`]s.

pub mod keys;
pub mod nip19;

pub use keys::{KeyError, Keypair, PublicKey};
pub use nip19::Nip19Error;
