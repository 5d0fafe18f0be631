//! # WebSocket Relay Client
//!
//! A [`RelayEndpoint`] speaking NIP-01 over `tokio-tungstenite`.
//!
//! The connection is opened lazily on first use and reused for every later
//! request until the gateway closes it. Requests on one relay are serialized
//! through a mutex: the ledger never has more than one request in flight per
//! relay, so multiplexing subscriptions would buy nothing but bugs.
//!
//! Any transport-level failure drops the connection; the next request dials
//! again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::endpoint::{RelayEndpoint, RelayError};
use super::filter::Filter;
use super::message::{ClientMessage, RelayMessage};
use crate::config::{RELAY_CONNECT_TIMEOUT, SUBSCRIPTION_PREFIX};
use crate::event::Event;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single relay reached over `ws://` or `wss://`.
pub struct WsRelay {
    url: String,
    connect_timeout: Duration,
    connection: Mutex<Option<WsStream>>,
    next_sub: AtomicU64,
}

impl WsRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_connect_timeout(url, RELAY_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            connection: Mutex::new(None),
            next_sub: AtomicU64::new(0),
        }
    }

    async fn connect(&self) -> Result<WsStream, RelayError> {
        debug!(relay = %self.url, "connecting");
        let (stream, _response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| RelayError::Timeout(self.connect_timeout))?
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        Ok(stream)
    }

    /// Lock the shared connection, dialing first if there is none.
    async fn acquire(&self) -> Result<MutexGuard<'_, Option<WsStream>>, RelayError> {
        let mut slot = self.connection.lock().await;
        if slot.is_none() {
            *slot = Some(self.connect().await?);
        }
        Ok(slot)
    }

    /// Discard the connection if the request broke it.
    fn settle<T>(&self, slot: &mut Option<WsStream>, result: &Result<T, RelayError>) {
        if let Err(e) = result {
            if e.is_transport_failure() {
                warn!(relay = %self.url, error = %e, "dropping relay connection");
                *slot = None;
            }
        }
    }

    fn subscription_id(&self) -> String {
        let n = self.next_sub.fetch_add(1, Ordering::Relaxed);
        format!("{SUBSCRIPTION_PREFIX}-{n}")
    }
}

/// Next text frame from the relay. Control frames are handled by tungstenite
/// (pings are answered on the next read/flush).
async fn next_text(stream: &mut WsStream) -> Result<String, RelayError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Binary(bytes))) => {
                if let Ok(text) = String::from_utf8(bytes) {
                    return Ok(text);
                }
            }
            Some(Ok(Message::Close(_))) | None => return Err(RelayError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(RelayError::Transport(e.to_string())),
        }
    }
}

async fn send_text(stream: &mut WsStream, text: String) -> Result<(), RelayError> {
    stream
        .send(Message::Text(text))
        .await
        .map_err(|e| RelayError::Transport(e.to_string()))
}

async fn publish_on(stream: &mut WsStream, event: &Event) -> Result<(), RelayError> {
    send_text(stream, ClientMessage::Event(event).to_json()).await?;
    loop {
        match RelayMessage::parse(&next_text(stream).await?)? {
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } if event_id == event.id => {
                // A relay that already has the event says so with
                // `duplicate:`. For us that is as good as accepted.
                return if accepted || message.starts_with("duplicate:") {
                    Ok(())
                } else {
                    Err(RelayError::Rejected(message))
                };
            }
            RelayMessage::Notice { message } => debug!(notice = %message, "relay notice"),
            other => trace!(?other, "ignoring message while awaiting OK"),
        }
    }
}

async fn query_on(
    stream: &mut WsStream,
    sub_id: &str,
    filter: &Filter,
) -> Result<Vec<Event>, RelayError> {
    send_text(stream, ClientMessage::Req { sub_id, filter }.to_json()).await?;

    let mut events = Vec::new();
    loop {
        match RelayMessage::parse(&next_text(stream).await?)? {
            RelayMessage::Event { sub_id: sid, event } if sid == sub_id => {
                match serde_json::from_value::<Event>(event) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(error = %e, "skipping unparsable event from relay"),
                }
            }
            RelayMessage::Eose { sub_id: sid } if sid == sub_id => break,
            RelayMessage::Closed {
                sub_id: sid,
                message,
            } if sid == sub_id => return Err(RelayError::SubscriptionClosed(message)),
            RelayMessage::Notice { message } => debug!(notice = %message, "relay notice"),
            other => trace!(?other, "ignoring message for another subscription"),
        }
    }

    send_text(stream, ClientMessage::Close { sub_id }.to_json()).await?;
    Ok(events)
}

#[async_trait]
impl RelayEndpoint for WsRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let mut slot = self.acquire().await?;
        let result = match slot.as_mut() {
            Some(stream) => publish_on(stream, event).await,
            None => Err(RelayError::Closed),
        };
        self.settle(&mut slot, &result);
        result
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, RelayError> {
        let sub_id = self.subscription_id();
        let mut slot = self.acquire().await?;
        let result = match slot.as_mut() {
            Some(stream) => query_on(stream, &sub_id, filter).await,
            None => Err(RelayError::Closed),
        };
        self.settle(&mut slot, &result);
        result
    }

    async fn close(&self) {
        let mut slot = self.connection.lock().await;
        if let Some(mut stream) = slot.take() {
            if let Err(e) = stream.close(None).await {
                debug!(relay = %self.url, error = %e, "error while closing relay connection");
            }
        }
    }
}
