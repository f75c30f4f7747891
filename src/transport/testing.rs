// src/transport/testing.rs
//! Channel-backed transport for tests
//!
//! Lets manager tests push server messages and inspect everything the
//! manager sent, without a socket in sight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::transport::MessageTransport;
use crate::utils::errors::{EngineError, Result};

pub struct ChannelTransport {
    inbound: Mutex<Option<mpsc::Receiver<String>>>,
    sent: Mutex<Vec<String>>,
    stopped: AtomicBool,
}

impl ChannelTransport {
    /// Returns the transport and the sender test code uses to play server.
    pub fn new() -> (Arc<Self>, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            inbound: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        (transport, tx)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn open(&self) -> Result<mpsc::Receiver<String>> {
        self.inbound
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| EngineError::Transport("channel transport already opened".into()))
    }

    async fn send(&self, payload: &str) -> Result<()> {
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
