//! Fan-out of scan events to every connected session.
//!
//! Each broadcast renders the event once, takes a registry snapshot and
//! sends to all sessions in it concurrently. A failing session is logged and
//! skipped; it never blocks or prevents delivery to the others.

use crate::metrics;
use crate::registry::SessionRegistry;
use crate::session::{Session, SinkError};
use futures_util::future::join_all;
use scanlink_protocol::{BroadcastMessage, Renderer, ScanEvent, WireFormat};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Upper bound on the close handshake of an evicted session.
const EVICTION_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What to do with a session whose send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvictionPolicy {
    /// Leave it registered until its own read loop notices the failure.
    #[default]
    Retain,
    /// Unregister and close it immediately.
    Evict,
}

/// Broadcaster configuration.
#[derive(Debug, Clone, Default)]
pub struct BroadcasterConfig {
    /// Wire format for outbound messages.
    pub format: WireFormat,
    /// Handling of sessions whose send failed.
    pub eviction: EvictionPolicy,
    /// Per-session send deadline. `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
}

/// Renders scan events and pushes them to all registered sessions.
#[derive(Debug)]
pub struct EventBroadcaster {
    registry: Arc<SessionRegistry>,
    renderer: Renderer,
    config: BroadcasterConfig,
}

impl EventBroadcaster {
    /// Create a broadcaster with default configuration.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_config(registry, BroadcasterConfig::default())
    }

    /// Create a broadcaster with custom configuration.
    #[must_use]
    pub fn with_config(registry: Arc<SessionRegistry>, config: BroadcasterConfig) -> Self {
        info!("Creating broadcaster with config: {:?}", config);
        Self {
            registry,
            renderer: Renderer::new(config.format),
            config,
        }
    }

    /// The registry this broadcaster reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// Broadcast a scan event to every session registered right now.
    ///
    /// Fire-and-forget: per-session failures are logged and counted, never
    /// reported back to the producer.
    pub async fn broadcast(&self, event: &ScanEvent) {
        metrics::record_scan();
        match event.symbology() {
            Some(symbology) => debug!(
                content = %event.content(),
                symbology = %symbology,
                "Got barcode"
            ),
            None => debug!(content = %event.content(), "Got barcode"),
        }

        let message = match self.renderer.render(event) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, format = %self.renderer.format(), "Failed to render scan event");
                metrics::record_error("render");
                return;
            }
        };

        self.broadcast_message(&message).await;
    }

    /// Broadcast an already rendered message.
    pub async fn broadcast_message(&self, message: &BroadcastMessage) {
        let start = Instant::now();
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            debug!("No sessions connected, dropping message");
            return;
        }

        let deliveries = snapshot
            .iter()
            .map(|session| self.deliver(session, message));
        let failed = join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| !delivered)
            .count();

        metrics::record_broadcast_latency(start.elapsed().as_secs_f64());
        debug!(recipients = snapshot.len(), failed, "Broadcast complete");
    }

    /// Send to one session. Returns whether the send succeeded.
    async fn deliver(&self, session: &Arc<Session>, message: &BroadcastMessage) -> bool {
        let result = match self.config.send_timeout {
            Some(limit) => tokio::time::timeout(limit, session.send(message))
                .await
                .unwrap_or(Err(SinkError::Timeout(limit))),
            None => session.send(message).await,
        };

        match result {
            Ok(()) => {
                trace!(session = %session.id(), bytes = message.len(), "Delivered");
                metrics::record_delivery(message.len(), true);
                true
            }
            Err(e) => {
                warn!(session = %session.id(), error = %e, "Send failed");
                metrics::record_delivery(message.len(), false);
                if self.config.eviction == EvictionPolicy::Evict {
                    self.evict(session).await;
                }
                false
            }
        }
    }

    async fn evict(&self, session: &Arc<Session>) {
        if self.registry.unregister(session.id()) {
            metrics::record_eviction();
            info!(session = %session.id(), "Evicted session after send failure");
        }

        match tokio::time::timeout(EVICTION_CLOSE_TIMEOUT, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(session = %session.id(), error = %e, "Close after eviction failed"),
            Err(_) => {
                debug!(session = %session.id(), "Close after eviction timed out");
                session.mark_closed();
            }
        }
    }
}
