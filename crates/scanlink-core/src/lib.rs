//! # scanlink-core
//!
//! Core building blocks of the Scanlink broadcast server:
//!
//! - **Session** - One upgraded client connection and its outbound sink
//! - **SessionRegistry** - The serialized set of live sessions
//! - **EventBroadcaster** - Snapshot-then-send fan-out of scan events
//! - **LivenessTicker** - Cancellable periodic "still running" signal
//! - **ScanSource** - The capability through which scans arrive
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ ScanSource  │────▶│ EventBroadcaster │────▶│ Session (sink)  │ × N
//! └─────────────┘     └──────────────────┘     └─────────────────┘
//!                              │ snapshot
//!                              ▼
//!                     ┌──────────────────┐
//!                     │ SessionRegistry  │◀── register / unregister
//!                     └──────────────────┘
//! ```

pub mod broadcaster;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod source;
pub mod ticker;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcaster::{BroadcasterConfig, EventBroadcaster, EvictionPolicy};
pub use registry::{RegistryError, RegistryStats, SessionRegistry, Snapshot};
pub use session::{Session, SessionId, SessionSink, SessionState, SinkError};
pub use source::{pump, scan_channel, ChannelScanSource, ScanSource, ScannerHandle};
pub use ticker::{LivenessSink, LivenessTicker, TickerConfig};
