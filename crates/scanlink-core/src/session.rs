//! Sessions for Scanlink.
//!
//! A session is one accepted, upgraded duplex connection to a client. The
//! connection handler owns its read side; the outbound side is a
//! [`SessionSink`] that the broadcaster writes through.

use async_trait::async_trait;
use scanlink_protocol::BroadcastMessage;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Source of process-unique session identifiers.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a session, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Accepting outbound messages.
    Open = 0,
    /// A close has been requested; sends are refused.
    Closing = 1,
    /// The channel is gone.
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Open,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Errors from writing to a session.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The session is closing or closed.
    #[error("Session closed")]
    Closed,

    /// The send did not complete in time.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying transport failed.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SinkError {
    /// Wrap a transport-level error.
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SinkError::Transport(err.into())
    }
}

/// Outbound half of a session's channel.
///
/// Implementations serialize their own writes, so messages sent to one sink
/// are delivered in the order `send` was called.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Write one message and wait for it to be flushed.
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkError>;

    /// Close the channel courteously.
    async fn close(&self) -> Result<(), SinkError>;
}

/// An open client session.
pub struct Session {
    id: SessionId,
    peer: Option<SocketAddr>,
    state: AtomicU8,
    sink: Box<dyn SessionSink>,
}

impl Session {
    /// Create an open session writing through `sink`.
    #[must_use]
    pub fn new(id: SessionId, sink: impl SessionSink + 'static) -> Self {
        Self {
            id,
            peer: None,
            state: AtomicU8::new(SessionState::Open as u8),
            sink: Box::new(sink),
        }
    }

    /// Attach the remote address.
    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// The session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The remote address, if known.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the session still accepts messages.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Send a message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Closed`] if the session is no longer open, or the
    /// sink's error if the write fails.
    pub async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        self.sink.send(message).await
    }

    /// Close the session courteously.
    ///
    /// Only the first call performs I/O; later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the close handshake fails. The session is
    /// marked closed either way.
    pub async fn close(&self) -> Result<(), SinkError> {
        let opened = self.state.compare_exchange(
            SessionState::Open as u8,
            SessionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if opened.is_err() {
            return Ok(());
        }

        debug!(session = %self.id, "Closing session");
        let result = self.sink.close().await;
        self.mark_closed();
        result
    }

    /// Mark the session closed without any I/O.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
