//! # scanlink-server
//!
//! The Scanlink WebSocket server: a host process that pushes every barcode
//! scan to all connected WebSocket clients.
//!
//! - [`Server`] - start/stop lifecycle, accept loop, liveness ticker
//! - [`connection`] - per-connection upgrade, registration, drain, close
//! - [`scanner`] - scan sources read from standard input or a device
//! - [`config`] - layered file/environment configuration
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use scanlink_core::{scan_channel, SessionRegistry};
//! use scanlink_server::{config::Config, Server};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), scanlink_server::ServerError> {
//! let server = Server::new(Config::default(), Arc::new(SessionRegistry::new()));
//! let addr = server.start().await?;
//!
//! let (scanner, source) = scan_channel();
//! server.attach_source(source).await?;
//! scanner.on_scan_event("ABC123", None);
//!
//! server.stop(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod metrics;
pub mod scanner;
pub mod server;

pub use server::{LogLiveness, Server, ServerError};
