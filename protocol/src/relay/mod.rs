//! # Relay Layer
//!
//! Everything that moves events between this process and the relay network.
//!
//! - **endpoint**: the [`RelayEndpoint`] trait, one relay.
//! - **websocket**: NIP-01 over WebSocket, the production endpoint.
//! - **memory**: an in-process endpoint for tests and local tooling.
//! - **filter**: the NIP-01 query filter.
//! - **message**: client/relay wire frames.
//! - **gateway**: the multi-relay facade the ledger talks to.

pub mod endpoint;
pub mod filter;
pub mod gateway;
pub mod memory;
pub mod message;
pub mod websocket;

pub use endpoint::{RelayEndpoint, RelayError};
pub use filter::Filter;
pub use gateway::{
    DeliveryPolicy, EndpointFailure, GatewayConfig, GatewayError, PublishReceipt, RelayGateway,
};
pub use memory::MemoryRelay;
pub use websocket::WsRelay;
