//! The seam between a model session and the wire it talks over.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::ModelError;
use crate::settings::ModelSettings;

/// A bidirectional frame stream to the model service.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Send one serialized JSON event.
    async fn send(&self, frame: String) -> Result<(), ModelError>;

    /// Next inbound frame, or `None` once the stream has closed.
    ///
    /// Must be cancel-safe: the receive loop polls it under a timeout.
    async fn recv(&self) -> Result<Option<Bytes>, ModelError>;

    /// Close the outbound side.
    async fn close(&self) -> Result<(), ModelError>;
}

/// Opens transports; one call per session.
#[async_trait]
pub trait ModelConnector: Send + Sync {
    async fn connect(&self, settings: &ModelSettings) -> Result<Arc<dyn ModelTransport>, ModelError>;
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

/// Transport backed by channels, driven from the other end by a [`MemoryPeer`].
pub struct MemoryTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outbound: mpsc::UnboundedSender<String>,
    closed: AtomicBool,
}

/// The model side of a [`MemoryTransport`].
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Bytes>>,
    sent: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MemoryTransport {
    pub fn pair() -> (Arc<MemoryTransport>, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MemoryTransport {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            closed: AtomicBool::new(false),
        });
        let peer = MemoryPeer {
            inbound: Some(in_tx),
            sent: Mutex::new(out_rx),
        };
        (transport, peer)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelTransport for MemoryTransport {
    async fn send(&self, frame: String) -> Result<(), ModelError> {
        if self.is_closed() {
            return Err(ModelError::Transport("transport closed".into()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| ModelError::Transport("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Bytes>, ModelError> {
        if self.is_closed() {
            return Ok(None);
        }
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), ModelError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl MemoryPeer {
    /// Deliver an event to the session as if the model had sent it.
    pub fn push_event(&self, event: Value) {
        self.push_raw(Bytes::from(event.to_string()));
    }

    pub fn push_raw(&self, frame: impl Into<Bytes>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(frame.into());
        }
    }

    /// End the inbound stream; the session sees the model hang up.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Everything the session has sent so far that has not been read yet.
    pub async fn drain_sent(&self) -> Vec<Value> {
        let mut rx = self.sent.lock().await;
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Ok(value) = serde_json::from_str(&frame) {
                out.push(value);
            }
        }
        out
    }

    /// Wait up to `wait` for the next event the session sends.
    pub async fn next_sent(&self, wait: Duration) -> Option<Value> {
        let mut rx = self.sent.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(frame)) => serde_json::from_str(&frame).ok(),
            _ => None,
        }
    }
}

/// Hands out pre-made in-memory transports in creation order.
#[derive(Default)]
pub struct MemoryConnector {
    pending: StdMutex<VecDeque<Arc<MemoryTransport>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transport for the next `connect` and return its peer.
    pub fn expect_session(&self) -> MemoryPeer {
        let (transport, peer) = MemoryTransport::pair();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(transport);
        peer
    }
}

#[async_trait]
impl ModelConnector for MemoryConnector {
    async fn connect(&self, _settings: &ModelSettings) -> Result<Arc<dyn ModelTransport>, ModelError> {
        let next = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(transport) => Ok(transport as Arc<dyn ModelTransport>),
            None => Err(ModelError::Transport("no model transport available".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (transport, mut peer) = MemoryTransport::pair();
        transport.send(json!({"a": 1}).to_string()).await.unwrap();
        assert_eq!(peer.next_sent(Duration::from_millis(50)).await, Some(json!({"a": 1})));

        peer.push_event(json!({"event": {"textOutput": {"content": "hi"}}}));
        let frame = transport.recv().await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["event"]["textOutput"]["content"], "hi");

        peer.hang_up();
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_transport_rejects_sends() {
        let (transport, _peer) = MemoryTransport::pair();
        transport.close().await.unwrap();
        assert!(transport.send("{}".into()).await.is_err());
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn connector_runs_dry() {
        let connector = MemoryConnector::new();
        let _peer = connector.expect_session();
        let settings = ModelSettings::default();
        assert!(connector.connect(&settings).await.is_ok());
        assert!(connector.connect(&settings).await.is_err());
    }
}
