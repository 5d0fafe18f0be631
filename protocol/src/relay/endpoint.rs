//! The seam between the gateway and a single relay.
//!
//! The gateway never knows whether it is talking to a WebSocket relay across
//! the planet or a `Vec` in the same process. Both implement
//! [`RelayEndpoint`], and tests swap one for the other freely.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::filter::Filter;
use crate::event::Event;

/// Why a single relay failed to serve a request.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("relay rejected event: {0}")]
    Rejected(String),

    #[error("subscription closed by relay: {0}")]
    SubscriptionClosed(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("connection closed by relay")]
    Closed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether the connection behind this error should be thrown away.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Transport(_) | Self::Protocol(_) | Self::Closed
        )
    }
}

/// One relay. Implementations must be safe to call from several tasks.
#[async_trait]
pub trait RelayEndpoint: Send + Sync {
    /// The relay URL, used for logging and error reports.
    fn url(&self) -> &str;

    /// Store an event. `Ok` means the relay acknowledged it.
    async fn publish(&self, event: &Event) -> Result<(), RelayError>;

    /// Every stored event matching `filter`, newest first, bounded by
    /// `filter.limit`.
    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, RelayError>;

    /// Release whatever the endpoint holds open.
    async fn close(&self) {}
}
