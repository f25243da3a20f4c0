//! Connection handler.
//!
//! Owns one accepted TCP connection from upgrade to teardown: register the
//! session, drain inbound frames until the client leaves or shutdown starts,
//! then unregister. Outbound traffic never passes through here; the
//! broadcaster writes straight to the session's sink.

use crate::metrics::ConnectionMetricsGuard;
use scanlink_core::metrics::record_error;
use scanlink_core::{Session, SessionId, SessionRegistry};
use scanlink_transport::{upgrade, Inbound, TransportError, UpgradeConfig, WebSocketReader};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// State shared by every connection of one server run.
#[derive(Debug)]
pub struct ConnectionContext {
    /// Where sessions are registered.
    pub registry: Arc<SessionRegistry>,
    /// Upgrade path and limits.
    pub upgrade: UpgradeConfig,
    /// Fires when the server starts stopping; sessions close courteously.
    pub shutdown: CancellationToken,
    /// Fires when the grace period is over; sessions are dropped.
    pub force: CancellationToken,
}

/// Unregisters the session however the handler exits.
struct Registration<'a> {
    registry: &'a SessionRegistry,
    session: &'a Session,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.session.id());
        self.session.mark_closed();
    }
}

/// Why the drain loop ended.
enum Exit {
    ClientClosed,
    Failed(TransportError),
    Shutdown,
}

/// Handle one accepted connection until it is finished.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ConnectionContext>) {
    let upgraded = tokio::select! {
        biased;
        () = ctx.shutdown.cancelled() => {
            debug!(peer = %peer, "Shutdown during handshake, dropping connection");
            return;
        }
        result = upgrade(stream, peer, &ctx.upgrade) => result,
    };

    let (sink, reader) = match upgraded {
        Ok(halves) => halves,
        Err(TransportError::Rejected(status)) => {
            debug!(peer = %peer, status, "Upgrade rejected");
            return;
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "WebSocket upgrade failed");
            record_error("handshake");
            return;
        }
    };

    let session = Arc::new(Session::new(SessionId::next(), sink).with_peer(peer));
    serve_session(session, reader, &ctx).await;
}

/// Register an upgraded session and serve it until it is finished.
async fn serve_session(session: Arc<Session>, mut reader: WebSocketReader, ctx: &ConnectionContext) {
    let id = session.id();

    if let Err(e) = ctx.registry.register(Arc::clone(&session)) {
        error!(session = %id, error = %e, "Failed to register session");
        record_error("register");
        finish_close(&session, &ctx.force).await;
        return;
    }

    let _metrics = ConnectionMetricsGuard::new();
    let _registration = Registration {
        registry: &ctx.registry,
        session: &session,
    };
    info!(session = %id, peer = %reader.peer(), "Session connected");

    match drain(&mut reader, &ctx.shutdown, id).await {
        Exit::ClientClosed => {
            ctx.registry.unregister(id);
            finish_close(&session, &ctx.force).await;
        }
        Exit::Failed(e) => {
            warn!(session = %id, error = %e, "Session read failed");
            record_error("receive");
            ctx.registry.unregister(id);
            finish_close(&session, &ctx.force).await;
        }
        Exit::Shutdown => close_courteously(&session, &mut reader, ctx).await,
    }

    info!(session = %id, "Session disconnected");
}

async fn drain(reader: &mut WebSocketReader, shutdown: &CancellationToken, id: SessionId) -> Exit {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Exit::Shutdown,
            inbound = reader.next_inbound() => match inbound {
                Ok(Inbound::Discarded { bytes }) => {
                    trace!(session = %id, bytes, "Ignoring client frame");
                }
                Ok(Inbound::Closed) => return Exit::ClientClosed,
                Err(e) => return Exit::Failed(e),
            },
        }
    }
}

/// Close our side of the channel, until `force` fires.
///
/// After a client-initiated close this writes the pending close reply.
async fn finish_close(session: &Session, force: &CancellationToken) {
    let id = session.id();
    tokio::select! {
        biased;
        () = force.cancelled() => session.mark_closed(),
        result = session.close() => {
            if let Err(e) = result {
                debug!(session = %id, error = %e, "Close not delivered");
            }
        }
    }
}

/// Send a close frame and wait for the client's reply, until `force` fires.
async fn close_courteously(session: &Session, reader: &mut WebSocketReader, ctx: &ConnectionContext) {
    let id = session.id();
    ctx.registry.unregister(id);

    let finish = async {
        if let Err(e) = session.close().await {
            debug!(session = %id, error = %e, "Close frame not delivered");
            return;
        }
        while let Ok(Inbound::Discarded { .. }) = reader.next_inbound().await {}
    };

    tokio::select! {
        biased;
        () = ctx.force.cancelled() => debug!(session = %id, "Grace period over, dropping session"),
        () = finish => debug!(session = %id, "Session closed courteously"),
    }
}
