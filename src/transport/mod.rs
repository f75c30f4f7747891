// src/transport/mod.rs
//! Message transport layer
//!
//! A transport maintains one persistent bidirectional message channel to the
//! game server:
//!
//! - `open` establishes the connection and performs a single authentication
//!   round-trip before any message is delivered
//! - inbound messages arrive on the returned channel one at a time, strictly
//!   in arrival order
//! - `send` writes one message and is a deliberate no-op while disconnected
//! - recoverable disconnects are retried internally with the original URL and
//!   auth parameters, invisibly to the layers above
//!
//! [`WebSocketTransport`] is the production implementation;
//! [`testing::ChannelTransport`] backs manager tests without a socket.

pub mod auth;
#[cfg(test)]
pub mod testing;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::utils::errors::Result;

pub use auth::{AuthStrategy, LoginPayloadAuth, OutboundLink};
pub use websocket::{ReconnectPolicy, WebSocketTransport};

/// Persistent ordered message channel to the game server
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Connect, authenticate, and start delivering inbound messages.
    ///
    /// A failed connect or rejected authentication leaves the connection
    /// unestablished; the caller may call `open` again to retry.
    async fn open(&self) -> Result<mpsc::Receiver<String>>;

    /// Write one message; a no-op (not an error) when disconnected.
    async fn send(&self, payload: &str) -> Result<()>;

    /// Permanently shut the connection down. Idempotent.
    async fn stop(&self);
}
