//! # Ledger
//!
//! Balances without a server. Every account's balance is the balance in its
//! newest self-signed checkpoint plus whatever was sent to it since.
//!
//! - **reconcile**: fold incoming transfers into a new checkpoint.
//! - **transfer**: reconcile, check funds, publish a transfer and the
//!   sender's post-send checkpoint.
//! - **issuance**: set a balance outright (development only).
//! - **error**: [`LedgerError`] and its retry classification.
//!
//! Both engines hold an `Arc<RelayGateway>` and no other state. Any number of
//! them can share one gateway.

pub mod error;
pub mod issuance;
pub mod reconcile;
pub mod transfer;

pub use error::LedgerError;
pub use issuance::issue;
pub use reconcile::{Reconciliation, ReconciliationEngine};
pub use transfer::{SendReceipt, TransferEngine};
