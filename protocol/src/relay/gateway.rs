//! # Relay Gateway
//!
//! Fans ledger traffic out over every configured relay and folds the answers
//! back into one result. The gateway is the only place that knows there is
//! more than one relay.
//!
//! ## Delivery policies
//!
//! | Policy  | Succeeds when                | Used for     |
//! |---------|------------------------------|--------------|
//! | `AnyOf` | the first relay acknowledges | transfers    |
//! | `AllOf` | every relay acknowledges     | checkpoints  |
//!
//! A transfer only needs one witness: the recipient's own reconciliation will
//! find it on whichever relay it landed. A checkpoint moves the owner's
//! watermark, and a watermark only some relays know about lets a later
//! reconciliation against the other relays re-credit transfers that were
//! already absorbed. So checkpoints go everywhere or the publish fails.
//!
//! ## Timeouts & cancellation
//!
//! Every per-relay call runs under its own timeout and observes the gateway's
//! [`CancellationToken`]. A relay that times out is a failed relay, nothing
//! more. [`RelayGateway::close`] cancels whatever is in flight and closes
//! every endpoint.
//!
//! ## Queries
//!
//! Results from all responding relays are merged, deduplicated by event id
//! and sorted newest first. Events a relay returns that don't actually match
//! the filter are dropped. Partial answers are fine; a query only fails when
//! no relay answers at all.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::endpoint::{RelayEndpoint, RelayError};
use super::filter::Filter;
use super::websocket::WsRelay;
use crate::config::{RELAY_CONNECT_TIMEOUT, RELAY_REQUEST_TIMEOUT};
use crate::event::Event;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Budget for one publish or query against one relay.
    pub request_timeout: Duration,
    /// Budget for the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: RELAY_REQUEST_TIMEOUT,
            connect_timeout: RELAY_CONNECT_TIMEOUT,
        }
    }
}

/// How many acknowledgements a publish needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    AnyOf,
    AllOf,
}

// ---------------------------------------------------------------------------
// Errors & Receipts
// ---------------------------------------------------------------------------

/// One relay's failure, kept for the aggregate error.
#[derive(Debug, Clone)]
pub struct EndpointFailure {
    pub url: String,
    pub error: RelayError,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.error)
    }
}

fn summarize(failures: &[EndpointFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no relays configured")]
    NoEndpoints,

    #[error("invalid relay url '{0}': expected ws:// or wss://")]
    InvalidRelayUrl(String),

    #[error("all {} relays failed: {}", .failures.len(), summarize(.failures))]
    AllEndpointsUnreachable { failures: Vec<EndpointFailure> },

    #[error(
        "published to {} of {} relays; failed: {}",
        .accepted.len(),
        .accepted.len() + .failures.len(),
        summarize(.failures)
    )]
    PartialPublish {
        accepted: Vec<String>,
        failures: Vec<EndpointFailure>,
    },
}

impl GatewayError {
    /// Infrastructure failures are worth retrying; configuration errors
    /// aren't.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllEndpointsUnreachable { .. } | Self::PartialPublish { .. }
        )
    }
}

/// Which relays acknowledged a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: String,
    pub accepted_by: Vec<String>,
}

// ---------------------------------------------------------------------------
// RelayGateway
// ---------------------------------------------------------------------------

pub struct RelayGateway {
    endpoints: Vec<Arc<dyn RelayEndpoint>>,
    config: GatewayConfig,
    cancel: CancellationToken,
}

impl fmt::Debug for RelayGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayGateway")
            .field("relays", &self.relay_urls())
            .field("config", &self.config)
            .finish()
    }
}

impl RelayGateway {
    /// Build a gateway over already-constructed endpoints.
    pub fn new(
        endpoints: Vec<Arc<dyn RelayEndpoint>>,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        if endpoints.is_empty() {
            return Err(GatewayError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Build a gateway of WebSocket relays. Connections open lazily.
    pub fn connect<S: AsRef<str>>(urls: &[S], config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut endpoints: Vec<Arc<dyn RelayEndpoint>> = Vec::with_capacity(urls.len());
        for url in urls {
            let url = url.as_ref().trim();
            if !(url.starts_with("wss://") || url.starts_with("ws://")) {
                return Err(GatewayError::InvalidRelayUrl(url.to_string()));
            }
            endpoints.push(Arc::new(WsRelay::with_connect_timeout(
                url,
                config.connect_timeout,
            )));
        }
        Self::new(endpoints, config)
    }

    pub fn relay_urls(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.url()).collect()
    }

    /// Token that aborts every in-flight and future call when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel in-flight calls and release every endpoint.
    pub async fn close(&self) {
        self.cancel.cancel();
        join_all(self.endpoints.iter().map(|e| e.close())).await;
        debug!(relays = self.endpoints.len(), "relay gateway closed");
    }

    /// One relay call under the per-request timeout and the cancel token.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, RelayError>>,
    ) -> Result<T, RelayError> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        let budget = self.config.request_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled),
            result = timeout(budget, call) => result.unwrap_or(Err(RelayError::Timeout(budget))),
        }
    }

    // -- publish -----------------------------------------------------------

    pub async fn publish(
        &self,
        event: &Event,
        policy: DeliveryPolicy,
    ) -> Result<PublishReceipt, GatewayError> {
        match policy {
            DeliveryPolicy::AnyOf => self.publish_any(event).await,
            DeliveryPolicy::AllOf => self.publish_all(event).await,
        }
    }

    /// Succeed on the first acknowledgement. Publishes still in flight at
    /// that point are abandoned.
    pub async fn publish_any(&self, event: &Event) -> Result<PublishReceipt, GatewayError> {
        let mut pending: FuturesUnordered<_> = self
            .endpoints
            .iter()
            .map(|endpoint| async move {
                let result = self.guarded(endpoint.publish(event)).await;
                (endpoint.url().to_string(), result)
            })
            .collect();

        let mut failures = Vec::new();
        while let Some((url, result)) = pending.next().await {
            match result {
                Ok(()) => {
                    debug!(relay = %url, event_id = %event.id, "published (any-of)");
                    return Ok(PublishReceipt {
                        event_id: event.id.clone(),
                        accepted_by: vec![url],
                    });
                }
                Err(error) => {
                    warn!(relay = %url, event_id = %event.id, %error, "publish failed");
                    failures.push(EndpointFailure { url, error });
                }
            }
        }
        Err(GatewayError::AllEndpointsUnreachable { failures })
    }

    /// Succeed only when every relay acknowledges.
    pub async fn publish_all(&self, event: &Event) -> Result<PublishReceipt, GatewayError> {
        let results = join_all(self.endpoints.iter().map(|endpoint| async move {
            let result = self.guarded(endpoint.publish(event)).await;
            (endpoint.url().to_string(), result)
        }))
        .await;

        let mut accepted = Vec::new();
        let mut failures = Vec::new();
        for (url, result) in results {
            match result {
                Ok(()) => accepted.push(url),
                Err(error) => {
                    warn!(relay = %url, event_id = %event.id, %error, "publish failed");
                    failures.push(EndpointFailure { url, error });
                }
            }
        }

        if failures.is_empty() {
            debug!(event_id = %event.id, relays = accepted.len(), "published (all-of)");
            Ok(PublishReceipt {
                event_id: event.id.clone(),
                accepted_by: accepted,
            })
        } else if accepted.is_empty() {
            Err(GatewayError::AllEndpointsUnreachable { failures })
        } else {
            Err(GatewayError::PartialPublish { accepted, failures })
        }
    }

    // -- query -------------------------------------------------------------

    /// Deduplicated union of every relay's answer, newest first.
    pub async fn query_all(&self, filter: &Filter) -> Result<Vec<Event>, GatewayError> {
        let results = join_all(self.endpoints.iter().map(|endpoint| async move {
            let result = self.guarded(endpoint.query(filter)).await;
            (endpoint.url().to_string(), result)
        }))
        .await;

        let mut responded = 0usize;
        let mut failures = Vec::new();
        let mut by_id: HashMap<String, Event> = HashMap::new();

        for (url, result) in results {
            match result {
                Ok(events) => {
                    responded += 1;
                    for event in events {
                        if !filter.matches(&event) {
                            warn!(relay = %url, event_id = %event.id, "dropping event outside the requested filter");
                            continue;
                        }
                        by_id.entry(event.id.clone()).or_insert(event);
                    }
                }
                Err(error) => {
                    warn!(relay = %url, %error, "query failed");
                    failures.push(EndpointFailure { url, error });
                }
            }
        }

        if responded == 0 {
            return Err(GatewayError::AllEndpointsUnreachable { failures });
        }
        if !failures.is_empty() {
            debug!(
                responded,
                failed = failures.len(),
                "query answered by a subset of relays"
            );
        }

        let mut events: Vec<Event> = by_id.into_values().collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    /// The newest matching event on any relay. Each relay is asked for at
    /// most one event.
    pub async fn query_latest(&self, filter: &Filter) -> Result<Option<Event>, GatewayError> {
        let filter = filter.clone().limit(1);
        Ok(self.query_all(&filter).await?.into_iter().next())
    }
}
