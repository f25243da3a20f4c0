//! Shared fixtures for the Scanlink benchmarks.

use async_trait::async_trait;
use scanlink_core::{Session, SessionId, SessionRegistry, SessionSink, SinkError};
use scanlink_protocol::BroadcastMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A sink that counts deliveries and discards them.
#[derive(Debug, Default)]
pub struct CountingSink {
    delivered: Arc<AtomicU64>,
}

impl CountingSink {
    /// Create a sink that bumps `delivered` on every send.
    #[must_use]
    pub fn new(delivered: Arc<AtomicU64>) -> Self {
        Self { delivered }
    }
}

#[async_trait]
impl SessionSink for CountingSink {
    async fn send(&self, _message: &BroadcastMessage) -> Result<(), SinkError> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Register `count` counting sessions; returns their shared delivery counter.
pub fn populate(registry: &SessionRegistry, count: usize) -> Arc<AtomicU64> {
    let delivered = Arc::new(AtomicU64::new(0));
    for _ in 0..count {
        let sink = CountingSink::new(Arc::clone(&delivered));
        let session = Arc::new(Session::new(SessionId::next(), sink));
        registry.register(session).expect("fresh session id");
    }
    delivered
}
