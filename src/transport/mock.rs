//! Scriptable transport for connection and pool tests.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportHandler};

// ============================================================================
// MockTransport
// ============================================================================

/// In-memory transport that records outbound traffic and lets tests
/// drive the inbound hooks by hand.
///
/// `connect` only flips the connected flag; tests invoke
/// [`MockTransport::fire_connect`] when they want the owner's connect
/// path (keepalive, replay) to run.
pub(crate) struct MockTransport {
    connected: AtomicBool,
    handler: RwLock<Option<Arc<dyn TransportHandler>>>,
    sent: Mutex<Vec<Value>>,
    connects: AtomicUsize,
    reconnects: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            handler: RwLock::new(None),
            sent: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        })
    }

    /// Marks the transport connected without touching the handler.
    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Connects and fires the owner's `on_connect` hook.
    pub(crate) fn fire_connect(&self) {
        self.set_connected(true);
        if let Some(handler) = self.current_handler() {
            handler.on_connect();
        }
    }

    /// Feeds an inbound frame through the owner's `on_message` hook.
    pub(crate) fn deliver(&self, frame: &str) -> Result<()> {
        match self.current_handler() {
            Some(handler) => handler.on_message(frame.as_bytes()),
            None => Ok(()),
        }
    }

    /// Returns every JSON message sent so far.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn current_handler(&self) -> Option<Arc<dyn TransportHandler>> {
        self.handler.read().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.set_connected(true);
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn force_disconnect(&self) {
        self.set_connected(false);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_json(&self, message: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn set_handler(&self, handler: Arc<dyn TransportHandler>) {
        *self.handler.write() = Some(handler);
    }
}
