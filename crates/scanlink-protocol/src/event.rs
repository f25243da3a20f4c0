//! Scan events produced by the scanner collaborator.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or zero if the clock is before it.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A single barcode scan.
///
/// Immutable once produced. Not every scanner reports a symbology, so an
/// empty symbology string is stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Raw scanned payload.
    content: String,
    /// Barcode symbology (e.g. `EAN-13`), when the scanner reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    symbology: Option<String>,
    /// Production time in milliseconds since the Unix epoch.
    timestamp: u64,
}

impl ScanEvent {
    /// Create a scan event stamped with the current time.
    #[must_use]
    pub fn new(content: impl Into<String>, symbology: Option<impl Into<String>>) -> Self {
        Self::at(content, symbology, now_millis())
    }

    /// Create a scan event with an explicit timestamp.
    #[must_use]
    pub fn at(
        content: impl Into<String>,
        symbology: Option<impl Into<String>>,
        timestamp: u64,
    ) -> Self {
        let symbology = symbology.map(Into::into).filter(|s| !s.is_empty());
        Self {
            content: content.into(),
            symbology,
            timestamp,
        }
    }

    /// The scanned payload.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The symbology, if known.
    #[must_use]
    pub fn symbology(&self) -> Option<&str> {
        self.symbology.as_deref()
    }

    /// When the event was produced.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
