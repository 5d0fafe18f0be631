//! # Protocol Configuration & Constants
//!
//! Every magic number in vvcoin lives here. The event kinds and payload tags
//! are wire constants: the whole ledger history already sitting on public
//! relays was written with them, so changing any of these values silently
//! orphans every balance that exists today. Don't.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Event Kinds
// ---------------------------------------------------------------------------

/// Event kind carrying a transfer (`{"type":"send", ...}`).
pub const TRANSFER_KIND: u32 = 2940;

/// Event kind carrying a balance checkpoint (`{"type":"fix", ...}`).
pub const CHECKPOINT_KIND: u32 = 12940;

// ---------------------------------------------------------------------------
// Tags & Payload Types
// ---------------------------------------------------------------------------

/// Tag key addressing an account: the recipient of a transfer, or the owner
/// of a checkpoint.
pub const TAG_PUBKEY: &str = "p";

/// Tag key referencing an absorbed transfer from a checkpoint.
pub const TAG_EVENT: &str = "e";

/// `type` discriminator of a transfer payload.
pub const CONTENT_TYPE_SEND: &str = "send";

/// `type` discriminator of a checkpoint payload.
pub const CONTENT_TYPE_FIX: &str = "fix";

// ---------------------------------------------------------------------------
// Key Encoding
// ---------------------------------------------------------------------------

/// Bech32 HRP for public keys (NIP-19).
pub const NPUB_HRP: &str = "npub";

/// Bech32 HRP for secret keys (NIP-19). Anything starting with this prefix
/// belongs in a profile file with 0600 permissions, not in a chat window.
pub const NSEC_HRP: &str = "nsec";

/// Length in bytes of an x-only secp256k1 public key and of a secret scalar.
pub const KEY_LENGTH: usize = 32;

/// Length in bytes of a BIP-340 Schnorr signature.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Relay Defaults
// ---------------------------------------------------------------------------

/// Relays used when the profile store doesn't list any.
pub const DEFAULT_RELAYS: &[&str] = &["wss://relay-jp.nostr.wirednet.jp/"];

/// How long we wait for a WebSocket handshake before giving up on a relay.
pub const RELAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-endpoint budget for a single publish or query, handshake included.
/// A relay that can't answer inside this window is treated as down.
pub const RELAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Prefix for REQ subscription ids so relay operators can tell who we are.
pub const SUBSCRIPTION_PREFIX: &str = "vvc";

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Current wall-clock time as unix seconds, the resolution of `created_at`.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
