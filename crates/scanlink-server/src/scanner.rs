//! Host-side scanner sources.
//!
//! Keyboard-wedge scanners type each barcode followed by Enter, and serial
//! scanners write one line per scan, so both are read as lines. A line is
//! either `content` or `content<TAB>symbology`; blank lines are skipped.

use crate::config::{ScannerConfig, ScannerSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use scanlink_core::ScanSource;
use scanlink_protocol::ScanEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};

/// A scan source reading one scan per line.
pub struct LineScanSource<R> {
    lines: Lines<R>,
    name: String,
}

impl<R: AsyncBufRead + Unpin> LineScanSource<R> {
    /// Read scans from `reader`; `name` identifies it in logs.
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ScanSource for LineScanSource<R> {
    async fn next_event(&mut self) -> Option<ScanEvent> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = parse_scan_line(&line) {
                        debug!(source = %self.name, content = event.content(), "Scan read");
                        return Some(event);
                    }
                }
                Ok(None) => {
                    info!(source = %self.name, "Scanner input closed");
                    return None;
                }
                Err(e) => {
                    warn!(source = %self.name, error = %e, "Failed to read from scanner");
                    return None;
                }
            }
        }
    }
}

/// Parse one scanner line. Returns `None` for blank lines.
#[must_use]
pub fn parse_scan_line(line: &str) -> Option<ScanEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    match line.split_once('\t') {
        Some((content, symbology)) => Some(ScanEvent::new(content, Some(symbology.trim()))),
        None => Some(ScanEvent::new(line, None::<String>)),
    }
}

/// Open the configured scanner source.
///
/// Returns `None` when the scanner is disabled.
///
/// # Errors
///
/// Returns an error if the device is not configured or cannot be opened.
pub async fn open_source(config: &ScannerConfig) -> Result<Option<Box<dyn ScanSource>>> {
    match config.source {
        ScannerSource::Disabled => {
            info!("Host scanner disabled");
            Ok(None)
        }
        ScannerSource::Stdin => {
            info!("Reading scans from standard input");
            let source: Box<dyn ScanSource> =
                Box::new(LineScanSource::new(BufReader::new(tokio::io::stdin()), "stdin"));
            Ok(Some(source))
        }
        ScannerSource::Device => {
            let path = config
                .device
                .as_deref()
                .context("scanner.device must be set when scanner.source = \"device\"")?;
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open scanner device: {}", path.display()))?;

            info!("Reading scans from {}", path.display());
            let source: Box<dyn ScanSource> = Box::new(LineScanSource::new(
                BufReader::new(file),
                path.display().to_string(),
            ));
            Ok(Some(source))
        }
    }
}
