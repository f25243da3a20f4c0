//! WebSocket transport implementation.
//!
//! Upgrades accepted TCP streams with tokio-tungstenite and splits each
//! socket into a [`WebSocketSink`] (outbound, shared with the broadcaster)
//! and a [`WebSocketReader`] (inbound, owned by the connection handler).

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use scanlink_core::{SessionSink, SinkError};
use scanlink_protocol::BroadcastMessage;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
        error::ProtocolError,
        Error as WsError, Message,
    },
    WebSocketStream,
};
use tracing::{debug, trace};

use crate::error::TransportError;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// WebSocket upgrade configuration.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    /// The only request path accepted for upgrades.
    pub path: String,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            max_message_size: 64 * 1024, // 64 KB
        }
    }
}

/// Upgrade an accepted TCP stream to a WebSocket session.
///
/// Requests for any path other than `config.path` are answered with
/// `404 Not Found` and never become sessions.
///
/// # Errors
///
/// Returns [`TransportError::Rejected`] for a refused path and
/// [`TransportError::Handshake`] for any other handshake failure.
pub async fn upgrade(
    stream: TcpStream,
    peer: SocketAddr,
    config: &UpgradeConfig,
) -> Result<(WebSocketSink, WebSocketReader), TransportError> {
    let expected = config.path.clone();
    let check_path = move |request: &Request, response: Response| {
        let path = request.uri().path();
        if path == expected {
            return Ok(response);
        }
        let mut rejection = ErrorResponse::new(Some(format!("No WebSocket endpoint at {path}")));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        Err(rejection)
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);

    let ws_stream = accept_hdr_async_with_config(stream, check_path, Some(ws_config))
        .await
        .map_err(|e| match e {
            WsError::Http(response) => TransportError::Rejected(response.status().as_u16()),
            other => TransportError::Handshake(other.to_string()),
        })?;

    debug!("WebSocket handshake completed with {}", peer);

    let (sink, stream) = ws_stream.split();
    Ok((
        WebSocketSink {
            inner: Mutex::new(sink),
            peer,
        },
        WebSocketReader { stream, peer },
    ))
}

/// Outbound half of a WebSocket session.
///
/// Writes are serialized by an async mutex, which keeps messages to one
/// client in send order.
pub struct WebSocketSink {
    inner: Mutex<WsSink>,
    peer: SocketAddr,
}

impl WebSocketSink {
    /// The remote address.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl SessionSink for WebSocketSink {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkError> {
        let frame = match message {
            BroadcastMessage::Text(text) => Message::Text(text.clone()),
            BroadcastMessage::Binary(data) => Message::Binary(data.to_vec()),
        };

        let mut sink = self.inner.lock().await;
        sink.send(frame)
            .await
            .map_err(|e| SinkError::transport(TransportError::Send(e.to_string())))
    }

    async fn close(&self) -> Result<(), SinkError> {
        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "server closing session".into(),
        }));

        let mut sink = self.inner.lock().await;
        let result = match sink.send(frame).await {
            // The peer closed first; flush the queued reply instead.
            Err(WsError::Protocol(ProtocolError::SendAfterClosing)) => sink.close().await,
            other => other,
        };
        match result {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SinkError::transport(TransportError::Send(e.to_string()))),
        }
    }
}

/// What the read side observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// A frame arrived and was dropped unread.
    Discarded {
        /// Payload size of the dropped frame.
        bytes: usize,
    },
    /// The client closed the channel or the stream ended.
    Closed,
}

/// Inbound half of a WebSocket session.
pub struct WebSocketReader {
    stream: WsStream,
    peer: SocketAddr,
}

impl WebSocketReader {
    /// The remote address.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next inbound frame.
    ///
    /// Clients are receive-only, so application frames are drained without
    /// interpretation. Pings are answered by the WebSocket layer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Receive`] on a protocol or I/O error.
    pub async fn next_inbound(&mut self) -> Result<Inbound, TransportError> {
        match self.stream.next().await {
            Some(Ok(Message::Close(frame))) => {
                debug!(peer = %self.peer, ?frame, "Received close frame");
                Ok(Inbound::Closed)
            }
            Some(Ok(message)) => {
                trace!(peer = %self.peer, bytes = message.len(), "Discarding inbound frame");
                Ok(Inbound::Discarded {
                    bytes: message.len(),
                })
            }
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                debug!(peer = %self.peer, "WebSocket stream ended");
                Ok(Inbound::Closed)
            }
            Some(Err(e)) => Err(TransportError::Receive(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;

    async fn accept_one(
        config: UpgradeConfig,
    ) -> (
        SocketAddr,
        tokio::task::JoinHandle<Result<(WebSocketSink, WebSocketReader), TransportError>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            upgrade(stream, peer, &config).await
        });
        (addr, task)
    }

    #[test]
    fn test_upgrade_config_default() {
        let config = UpgradeConfig::default();
        assert_eq!(config.path, "/ws");
        assert_eq!(config.max_message_size, 64 * 1024);
    }

    #[tokio::test]
    async fn test_sink_delivers_text_frames() {
        let (addr, task) = accept_one(UpgradeConfig::default()).await;
        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let (sink, _reader) = task.await.unwrap().unwrap();

        sink.send(&BroadcastMessage::Text("Barcode: 42".into()))
            .await
            .unwrap();

        let received = client.next().await.unwrap().unwrap();
        assert_eq!(received, Message::Text("Barcode: 42".into()));
    }

    #[tokio::test]
    async fn test_wrong_path_is_rejected() {
        let (addr, task) = accept_one(UpgradeConfig::default()).await;
        let client = connect_async(format!("ws://{addr}/other")).await;
        assert!(client.is_err());

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TransportError::Rejected(404))));
    }

    #[tokio::test]
    async fn test_reader_drains_and_detects_close() {
        let (addr, task) = accept_one(UpgradeConfig::default()).await;
        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let (_sink, mut reader) = task.await.unwrap().unwrap();

        client.send(Message::Text("hello".into())).await.unwrap();
        assert_eq!(
            reader.next_inbound().await.unwrap(),
            Inbound::Discarded { bytes: 5 }
        );

        client.close(None).await.unwrap();
        assert_eq!(reader.next_inbound().await.unwrap(), Inbound::Closed);
    }

    #[tokio::test]
    async fn test_close_sends_going_away() {
        let (addr, task) = accept_one(UpgradeConfig::default()).await;
        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let (sink, _reader) = task.await.unwrap().unwrap();

        sink.close().await.unwrap();

        match client.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
            other => panic!("Expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_after_client_close_sends_reply() {
        let (addr, task) = accept_one(UpgradeConfig::default()).await;
        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let (sink, mut reader) = task.await.unwrap().unwrap();

        client.close(None).await.unwrap();
        assert_eq!(reader.next_inbound().await.unwrap(), Inbound::Closed);

        sink.close().await.unwrap();

        assert!(matches!(client.next().await, Some(Ok(Message::Close(_)))));
    }
}
