// Copyright (c) 2026 vvcoin contributors. MIT License.
// See LICENSE for details.

//! # vvcoin Protocol: Core Library
//!
//! vvcoin is a toy currency that lives entirely on Nostr relays. There is no
//! server, no chain and no consensus: a balance is whatever the account's own
//! latest signed checkpoint says, plus the transfers addressed to it since.
//!
//! ## Architecture
//!
//! - **config**: Wire constants, default relays, timeouts.
//! - **identity**: secp256k1 keys, BIP-340 signatures, `npub`/`nsec`.
//! - **event**: NIP-01 envelopes and the two ledger event kinds.
//! - **relay**: Relay clients and the multi-relay gateway.
//! - **ledger**: Reconciliation, transfers and issuance.
//!
//! ## Trust Model
//!
//! Each account vouches for its own balance. Readers verify signatures and
//! authorship, never arithmetic across accounts. It is enough for a
//! playground currency and nowhere near enough for anything else.

pub mod config;
pub mod event;
pub mod identity;
pub mod ledger;
pub mod relay;
