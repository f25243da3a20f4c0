//! Scan sources.
//!
//! The scanner integration is an external collaborator. The core only sees
//! it through [`ScanSource`], a capability that yields [`ScanEvent`]s. For
//! callback-style SDKs, [`scan_channel`] returns a [`ScannerHandle`] whose
//! methods can be called from any thread, paired with a source that feeds
//! the broadcaster.

use crate::broadcaster::EventBroadcaster;
use async_trait::async_trait;
use scanlink_protocol::ScanEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A producer of scan events.
#[async_trait]
pub trait ScanSource: Send {
    /// Wait for the next scan. `None` means the source is exhausted.
    async fn next_event(&mut self) -> Option<ScanEvent>;
}

#[async_trait]
impl<S: ScanSource + ?Sized> ScanSource for Box<S> {
    async fn next_event(&mut self) -> Option<ScanEvent> {
        (**self).next_event().await
    }
}

/// Create a connected handle/source pair.
#[must_use]
pub fn scan_channel() -> (ScannerHandle, ChannelScanSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ScannerHandle {
        tx,
        connected: Arc::new(AtomicBool::new(false)),
    };
    (handle, ChannelScanSource { rx })
}

/// Host-facing callback surface of the scanner collaborator.
#[derive(Debug, Clone)]
pub struct ScannerHandle {
    tx: mpsc::UnboundedSender<ScanEvent>,
    connected: Arc<AtomicBool>,
}

impl ScannerHandle {
    /// Report a scan.
    ///
    /// Returns `false` if the paired source has been dropped.
    pub fn on_scan_event(&self, content: impl Into<String>, symbology: Option<&str>) -> bool {
        self.tx.send(ScanEvent::new(content, symbology)).is_ok()
    }

    /// Report that the scanner connected. Informational only.
    pub fn on_scanner_connected(&self) {
        self.connected.store(true, Ordering::Relaxed);
        info!("Scanner connected");
    }

    /// Report that the scanner disconnected. Informational only.
    pub fn on_scanner_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
        info!("Scanner disconnected");
    }

    /// Last reported scanner connection state.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Source half of [`scan_channel`].
#[derive(Debug)]
pub struct ChannelScanSource {
    rx: mpsc::UnboundedReceiver<ScanEvent>,
}

#[async_trait]
impl ScanSource for ChannelScanSource {
    async fn next_event(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }
}

/// Forward every event from `source` to `broadcaster`, one at a time.
///
/// Runs until the source is exhausted or `cancel` fires. Broadcasting
/// sequentially keeps each session's messages in production order.
///
/// `cancel` only stops the wait for the next event; a broadcast already in
/// flight runs to completion. Callers that need a hard stop race the
/// returned future against their own deadline.
pub async fn pump<S: ScanSource>(
    mut source: S,
    broadcaster: Arc<EventBroadcaster>,
    cancel: CancellationToken,
) {
    let mut forwarded = 0u64;
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = source.next_event() => event,
        };

        let Some(event) = event else {
            warn!("Scan source exhausted");
            break;
        };

        broadcaster.broadcast(&event).await;
        forwarded += 1;
    }

    debug!(forwarded, "Scan pump stopped");
}
