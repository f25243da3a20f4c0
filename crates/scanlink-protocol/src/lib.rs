//! # scanlink-protocol
//!
//! Event types and wire rendering for the Scanlink broadcast server.
//!
//! Scanlink pushes one message per barcode scan to every connected client.
//! The base protocol is a single text line per event:
//!
//! ```text
//! Barcode: <content>
//! ```
//!
//! Structured renderings (JSON text frames, MessagePack binary frames) are
//! available through [`WireFormat`] for clients that want the symbology and
//! timestamp as well.
//!
//! ## Example
//!
//! ```rust
//! use scanlink_protocol::{codec, BroadcastMessage, ScanEvent, WireFormat};
//!
//! let event = ScanEvent::new("ABC123", None::<String>);
//! let message = codec::render(&event, WireFormat::Text).unwrap();
//! assert_eq!(message, BroadcastMessage::Text("Barcode: ABC123".to_string()));
//! ```

pub mod codec;
pub mod event;

pub use codec::{render, BroadcastMessage, ProtocolError, Renderer, WireFormat};
pub use event::ScanEvent;
