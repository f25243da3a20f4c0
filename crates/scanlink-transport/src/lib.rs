//! # scanlink-transport
//!
//! WebSocket transport for Scanlink sessions.
//!
//! An accepted TCP stream is upgraded on a fixed path and split in two:
//!
//! - **WebSocketSink** - implements `scanlink_core::SessionSink`; the
//!   broadcaster writes through it
//! - **WebSocketReader** - drained by the connection handler until the
//!   client goes away
//!
//! ```rust,ignore
//! use scanlink_transport::{upgrade, Inbound, UpgradeConfig};
//!
//! let (sink, mut reader) = upgrade(stream, peer, &UpgradeConfig::default()).await?;
//! while let Ok(Inbound::Discarded { .. }) = reader.next_inbound().await {}
//! ```

pub mod error;
pub mod websocket;

pub use error::TransportError;
pub use websocket::{upgrade, Inbound, UpgradeConfig, WebSocketReader, WebSocketSink};
