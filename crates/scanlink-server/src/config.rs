//! Server configuration.
//!
//! Configuration is layered, lowest priority first:
//! - Built-in defaults
//! - TOML configuration file (`--config`, or the first default path found)
//! - Environment variables (`SCANLINK_PORT`, `SCANLINK_BROADCAST__FORMAT`, ...)
//! - Command line flags (applied by the binary)

use anyhow::{bail, Context, Result};
use scanlink_core::{BroadcasterConfig, EvictionPolicy, TickerConfig};
use scanlink_protocol::WireFormat;
use scanlink_transport::UpgradeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SCANLINK";

const DEFAULT_PATHS: [&str; 3] = [
    "scanlink.toml",
    "/etc/scanlink/scanlink.toml",
    "~/.config/scanlink/scanlink.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on. `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Broadcast configuration.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Liveness ticker configuration.
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Scanner source configuration.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Broadcast configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Wire format for scan events.
    #[serde(default)]
    pub format: WireFormat,

    /// Unregister and close sessions whose send fails.
    #[serde(default)]
    pub evict_on_send_failure: bool,

    /// Per-session send timeout in milliseconds. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
}

/// Liveness ticker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Run the ticker while the server is up.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the first tick in milliseconds.
    #[serde(default = "default_liveness_ms")]
    pub initial_delay_ms: u64,

    /// Tick interval in milliseconds.
    #[serde(default = "default_liveness_ms")]
    pub interval_ms: u64,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long sessions get to close courteously before being dropped.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

/// Where scans come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerSource {
    /// Lines typed on standard input (keyboard-wedge scanners).
    #[default]
    Stdin,
    /// A line-oriented scanner device such as `/dev/ttyACM0`.
    Device,
    /// No host scanner; scans are injected programmatically.
    Disabled,
}

/// Scanner source configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Source kind.
    #[serde(default)]
    pub source: ScannerSource,

    /// Device path, required when `source = "device"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_liveness_ms() -> u64 {
    10_000 // 10 seconds
}

fn default_grace_ms() -> u64 {
    5_000 // 5 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            broadcast: BroadcastConfig::default(),
            liveness: LivenessConfig::default(),
            shutdown: ShutdownConfig::default(),
            scanner: ScannerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_liveness_ms(),
            interval_ms: default_liveness_ms(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl TransportConfig {
    /// Upgrade settings for the WebSocket transport.
    #[must_use]
    pub fn upgrade_config(&self) -> UpgradeConfig {
        UpgradeConfig {
            path: self.websocket_path.clone(),
            max_message_size: self.max_message_size,
        }
    }
}

impl BroadcastConfig {
    /// Broadcaster settings derived from this section.
    #[must_use]
    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            format: self.format,
            eviction: if self.evict_on_send_failure {
                EvictionPolicy::Evict
            } else {
                EvictionPolicy::Retain
            },
            send_timeout: self.send_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl LivenessConfig {
    /// Ticker settings derived from this section.
    #[must_use]
    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

impl ShutdownConfig {
    /// The grace period as a [`Duration`].
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Config {
    /// Load configuration from a file, the environment, and defaults.
    ///
    /// With `explicit` set, that file must exist. Otherwise the first of the
    /// default paths that exists is used, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a config source cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let file = match explicit {
            Some(path) => Some((path.to_path_buf(), true)),
            None => Self::default_path().map(|path| (path, false)),
        };
        if let Some((path, required)) = file {
            tracing::debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build().context("Failed to load configuration")?;
        let config: Config = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn default_path() -> Option<PathBuf> {
        DEFAULT_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !self.transport.websocket_path.starts_with('/') {
            bail!(
                "transport.websocket_path must start with '/': {}",
                self.transport.websocket_path
            );
        }
        if self.liveness.enabled && self.liveness.interval_ms == 0 {
            bail!("liveness.interval_ms must be greater than zero");
        }
        if self.scanner.source == ScannerSource::Device && self.scanner.device.is_none() {
            bail!("scanner.device must be set when scanner.source = \"device\"");
        }
        Ok(())
    }

    /// The `host:port` string to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Render the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
