//! Rendering scan events into broadcast messages.
//!
//! The `text` format is the compatibility baseline: one text frame per event,
//! `Barcode: <content>`, with no envelope, sequence number or symbology.
//! `json` and `msgpack` carry the full event.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::ScanEvent;

/// Prefix of every text-format message.
pub const TEXT_PREFIX: &str = "Barcode: ";

/// Protocol errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire encoding for outbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `Barcode: <content>` text frames.
    #[default]
    Text,
    /// JSON envelope in a text frame.
    Json,
    /// MessagePack envelope in a binary frame.
    Msgpack,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WireFormat::Text => "text",
            WireFormat::Json => "json",
            WireFormat::Msgpack => "msgpack",
        };
        f.write_str(name)
    }
}

/// A rendered event, ready to be written to any session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastMessage {
    /// Sent as a WebSocket text frame.
    Text(String),
    /// Sent as a WebSocket binary frame.
    Binary(Bytes),
}

impl BroadcastMessage {
    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            BroadcastMessage::Text(text) => text.len(),
            BroadcastMessage::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text payload, for text messages.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BroadcastMessage::Text(text) => Some(text),
            BroadcastMessage::Binary(_) => None,
        }
    }
}

/// Structured envelope used by the `json` and `msgpack` formats.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "scan")]
struct ScanEnvelope<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbology: Option<&'a str>,
    timestamp: u64,
}

impl<'a> From<&'a ScanEvent> for ScanEnvelope<'a> {
    fn from(event: &'a ScanEvent) -> Self {
        Self {
            content: event.content(),
            symbology: event.symbology(),
            timestamp: event.timestamp(),
        }
    }
}

/// Render the base text line for an event.
#[must_use]
pub fn render_text(event: &ScanEvent) -> String {
    format!("{TEXT_PREFIX}{}", event.content())
}

/// Extract the content from a text-format line, if it carries the prefix.
#[must_use]
pub fn parse_text(line: &str) -> Option<&str> {
    line.strip_prefix(TEXT_PREFIX)
}

/// Render an event in the given format.
///
/// # Errors
///
/// Returns an error if structured encoding fails.
pub fn render(event: &ScanEvent, format: WireFormat) -> Result<BroadcastMessage, ProtocolError> {
    match format {
        WireFormat::Text => Ok(BroadcastMessage::Text(render_text(event))),
        WireFormat::Json => {
            let json = serde_json::to_string(&ScanEnvelope::from(event))?;
            Ok(BroadcastMessage::Text(json))
        }
        WireFormat::Msgpack => {
            let data = rmp_serde::to_vec_named(&ScanEnvelope::from(event))?;
            Ok(BroadcastMessage::Binary(Bytes::from(data)))
        }
    }
}

/// Renderer bound to a single wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    format: WireFormat,
}

impl Renderer {
    /// Create a renderer for the given format.
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// The format this renderer produces.
    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Render an event.
    ///
    /// # Errors
    ///
    /// Returns an error if structured encoding fails.
    pub fn render(&self, event: &ScanEvent) -> Result<BroadcastMessage, ProtocolError> {
        render(event, self.format)
    }
}
