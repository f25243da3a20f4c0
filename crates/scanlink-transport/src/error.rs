//! Transport errors.

use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket upgrade handshake failed.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// The upgrade was refused with an HTTP error (e.g. wrong path).
    #[error("Upgrade rejected with status {0}")]
    Rejected(u16),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    Send(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
