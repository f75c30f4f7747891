// src/transport/auth.rs
//! Pluggable connection authentication
//!
//! The handshake payload is supplied by configuration, not fixed by the
//! engine: an [`AuthStrategy`] gets a write handle to the fresh connection
//! and decides whether the session may proceed. Returning `false` aborts the
//! connection attempt as a connect failure, not a panic.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::utils::errors::Result;

/// Write handle handed to the strategy during the handshake
#[async_trait]
pub trait OutboundLink: Send {
    async fn send_text(&mut self, payload: &str) -> Result<()>;
}

/// One authentication round-trip on a fresh connection
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Authenticate the connection; `Ok(false)` closes it immediately.
    async fn authenticate(&self, link: &mut dyn OutboundLink) -> Result<bool>;
}

/// Sends a configured login payload as the first message and trusts the
/// server to disconnect on bad credentials.
pub struct LoginPayloadAuth {
    payload: Value,
}

impl LoginPayloadAuth {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl AuthStrategy for LoginPayloadAuth {
    async fn authenticate(&self, link: &mut dyn OutboundLink) -> Result<bool> {
        debug!("sending login payload");
        link.send_text(&self.payload.to_string()).await?;
        Ok(true)
    }
}
