//! Server lifecycle.
//!
//! [`Server`] binds the listener, runs the accept loop and the liveness
//! ticker, and tears everything down again on [`Server::stop`]. Every task a
//! run spawns is tracked, so stop can wait for sessions to close before it
//! returns and the port is free for the next start.

use crate::config::Config;
use crate::connection::{handle_connection, ConnectionContext};
use async_trait::async_trait;
use scanlink_core::metrics::record_error;
use scanlink_core::{pump, EventBroadcaster, LivenessSink, LivenessTicker, ScanSource, SessionRegistry};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Pause before accepting again after running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long forced tasks get to unwind after the grace period.
const FORCE_TIMEOUT: Duration = Duration::from_secs(1);

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called on a running server.
    #[error("Server is already running")]
    AlreadyRunning,

    /// The operation needs a running server.
    #[error("Server is not running")]
    NotRunning,

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// The requested `host:port`.
        addr: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The listener failed in a way the accept loop cannot recover from.
    #[error("Listener failed: {0}")]
    Accept(#[source] io::Error),
}

/// Liveness sink that logs each tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLiveness;

#[async_trait]
impl LivenessSink for LogLiveness {
    async fn still_running(&self, tick: u64) {
        info!(tick, "Scanlink still running");
    }
}

/// Everything that exists only while the server runs.
struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    force: CancellationToken,
    failed: CancellationToken,
    tracker: TaskTracker,
    accept_task: JoinHandle<Result<(), ServerError>>,
    ticker: Option<LivenessTicker>,
}

enum State {
    Stopped,
    Running(Running),
}

/// The Scanlink WebSocket server.
///
/// A server can be started and stopped any number of times. Starting and
/// stopping are serialized; a `stop` racing a `start` waits for it.
pub struct Server {
    config: Config,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    liveness: Arc<dyn LivenessSink>,
    state: Mutex<State>,
}

impl Server {
    /// Create a stopped server that registers sessions in `registry`.
    #[must_use]
    pub fn new(config: Config, registry: Arc<SessionRegistry>) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::with_config(
            Arc::clone(&registry),
            config.broadcast.broadcaster_config(),
        ));

        Self {
            config,
            registry,
            broadcaster,
            liveness: Arc::new(LogLiveness),
            state: Mutex::new(State::Stopped),
        }
    }

    /// Deliver liveness ticks to `sink` instead of the log.
    #[must_use]
    pub fn with_liveness(mut self, sink: Arc<dyn LivenessSink>) -> Self {
        self.liveness = sink;
        self
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The broadcaster feeding this server's sessions.
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// The configuration this server was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port `0` was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if the server is running, or
    /// [`ServerError::Bind`] if the listener cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Running(_)) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.launch(&mut state, listener, local_addr);
        Ok(local_addr)
    }

    /// Spawn the accept loop and ticker for a new run and record it.
    fn launch<A: Acceptor>(&self, state: &mut State, acceptor: A, local_addr: SocketAddr) {
        let shutdown = CancellationToken::new();
        let force = CancellationToken::new();
        let failed = CancellationToken::new();
        let tracker = TaskTracker::new();

        let ctx = Arc::new(ConnectionContext {
            registry: Arc::clone(&self.registry),
            upgrade: self.config.transport.upgrade_config(),
            shutdown: shutdown.clone(),
            force: force.clone(),
        });
        let accept_task = tokio::spawn(accept_loop(acceptor, ctx, tracker.clone(), failed.clone()));

        let ticker = self.config.liveness.enabled.then(|| {
            LivenessTicker::spawn(
                self.config.liveness.ticker_config(),
                Arc::clone(&self.liveness),
                &shutdown,
            )
        });

        info!("Scanlink server listening on {}", local_addr);
        info!(
            "WebSocket endpoint: ws://{}{}",
            local_addr, self.config.transport.websocket_path
        );

        *state = State::Running(Running {
            local_addr,
            shutdown,
            force,
            failed,
            tracker,
            accept_task,
            ticker,
        });
    }

    /// Forward every scan from `source` to the connected sessions.
    ///
    /// The source is consumed until it is exhausted or the server stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the server is stopped.
    pub async fn attach_source<S>(&self, source: S) -> Result<(), ServerError>
    where
        S: ScanSource + 'static,
    {
        let state = self.state.lock().await;
        let State::Running(running) = &*state else {
            return Err(ServerError::NotRunning);
        };

        let broadcaster = Arc::clone(&self.broadcaster);
        let shutdown = running.shutdown.clone();
        let force = running.force.clone();
        running.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = force.cancelled() => debug!("Scan pump abandoned mid-broadcast"),
                () = pump(source, broadcaster, shutdown) => {}
            }
        });

        debug!("Scan source attached");
        Ok(())
    }

    /// Stop the server.
    ///
    /// Stops accepting, cancels the liveness ticker, asks every session to
    /// close, and waits up to `grace` for them. Sessions still open after
    /// that are dropped. Returns once the listener is released and the
    /// registry is empty. Stopping a stopped server is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] if the listener had failed during
    /// this run. The server is stopped either way.
    pub async fn stop(&self, grace: Duration) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        let Running {
            shutdown,
            force,
            tracker,
            accept_task,
            mut ticker,
            ..
        } = match std::mem::replace(&mut *state, State::Stopped) {
            State::Stopped => {
                debug!("Stop requested, server already stopped");
                return Ok(());
            }
            State::Running(running) => running,
        };

        info!(sessions = self.registry.len(), grace = ?grace, "Stopping server");

        shutdown.cancel();
        tracker.close();

        if let Some(ticker) = ticker.as_mut() {
            ticker.stop().await;
        }

        let accept_result = match accept_task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Accept task ended abnormally");
                Ok(())
            }
        };

        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                remaining = tracker.len(),
                "Grace period elapsed, dropping remaining sessions"
            );
            force.cancel();
            if tokio::time::timeout(FORCE_TIMEOUT, tracker.wait()).await.is_err() {
                error!(remaining = tracker.len(), "Tasks still running after forced close");
            }
        }

        let leftover = self.registry.drain();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "Sessions left registered after stop");
        }
        for session in leftover {
            session.mark_closed();
        }

        info!("Server stopped");
        accept_result
    }

    /// Whether the server is running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Running(_))
    }

    /// The bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Running(running) => Some(running.local_addr),
            State::Stopped => None,
        }
    }

    /// Token that fires if the listener fails fatally during this run.
    ///
    /// The host should call [`Server::stop`] when it fires.
    pub async fn failure_token(&self) -> Option<CancellationToken> {
        match &*self.state.lock().await {
            State::Running(running) => Some(running.failed.clone()),
            State::Stopped => None,
        }
    }
}

/// Source of inbound connections for the accept loop.
#[async_trait]
trait Acceptor: Send + 'static {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(&*self).await
    }
}

async fn accept_loop<A: Acceptor>(
    mut acceptor: A,
    ctx: Arc<ConnectionContext>,
    tracker: TaskTracker,
    failed: CancellationToken,
) -> Result<(), ServerError> {
    loop {
        let accepted = tokio::select! {
            biased;
            () = ctx.shutdown.cancelled() => break,
            accepted = acceptor.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!("Accepted TCP connection from {}", peer);
                tracker.spawn(handle_connection(stream, peer, Arc::clone(&ctx)));
            }
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "Transient accept error");
                record_error("accept");
                if is_fd_exhaustion(&e) {
                    tokio::select! {
                        () = ctx.shutdown.cancelled() => break,
                        () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Listener failed, no longer accepting connections");
                record_error("listener");
                failed.cancel();
                return Err(ServerError::Accept(e));
            }
        }
    }

    debug!("Accept loop stopped");
    Ok(())
}

/// Errors that concern one connection attempt, not the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_fd_exhaustion(e)
}

/// ENFILE and EMFILE; the same values on Linux, macOS and the BSDs.
#[cfg(unix)]
const FD_EXHAUSTION_ERRNOS: [i32; 2] = [23, 24];

#[cfg(unix)]
fn is_fd_exhaustion(e: &io::Error) -> bool {
    e.raw_os_error()
        .is_some_and(|code| FD_EXHAUSTION_ERRNOS.contains(&code))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_e: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerSource;
    use futures_util::{SinkExt, StreamExt};
    use scanlink_core::scan_channel;
    use scanlink_protocol::{ScanEvent, WireFormat};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    const GRACE: Duration = Duration::from_secs(2);

    fn test_config() -> Config {
        let mut config = Config::default();
        config.port = 0;
        config.liveness.enabled = false;
        config.metrics.enabled = false;
        config.scanner.source = ScannerSource::Disabled;
        config
    }

    fn test_server() -> Server {
        Server::new(test_config(), Arc::new(SessionRegistry::new()))
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        client
    }

    async fn wait_for_sessions(registry: &SessionRegistry, count: usize) {
        timeout(Duration::from_secs(5), async {
            while registry.len() != count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session count did not settle");
    }

    async fn next_text(client: &mut Client) -> String {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no message within timeout")
            .unwrap()
            .unwrap();
        match message {
            Message::Text(text) => text,
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scan_reaches_client_verbatim() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;

        server
            .broadcaster()
            .broadcast(&ScanEvent::new("ABC123", None::<String>))
            .await;

        assert_eq!(next_text(&mut client).await, "Barcode: ABC123");
        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_fan_out_to_every_client() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(connect(addr).await);
        }
        wait_for_sessions(server.registry(), 3).await;

        server
            .broadcaster()
            .broadcast(&ScanEvent::new("X1", None::<String>))
            .await;
        server
            .broadcaster()
            .broadcast(&ScanEvent::new("X2", None::<String>))
            .await;

        for client in &mut clients {
            assert_eq!(next_text(client).await, "Barcode: X1");
            assert_eq!(next_text(client).await, "Barcode: X2");
        }
        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_format() {
        let mut config = test_config();
        config.broadcast.format = WireFormat::Json;
        let server = Server::new(config, Arc::new(SessionRegistry::new()));
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;
        server
            .broadcaster()
            .broadcast(&ScanEvent::at("9780306406157", Some("EAN13"), 42))
            .await;

        let value: serde_json::Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
        assert_eq!(value["type"], "scan");
        assert_eq!(value["content"], "9780306406157");
        assert_eq!(value["symbology"], "EAN13");
        assert_eq!(value["timestamp"], 42);
        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_path_never_registers() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        assert!(connect_async(format!("ws://{addr}/other")).await.is_err());
        sleep(Duration::from_millis(50)).await;
        assert!(server.registry().is_empty());

        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_client_disconnect_unregisters() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;

        client.close(None).await.unwrap();
        wait_for_sessions(server.registry(), 0).await;

        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_client_close_gets_close_reply() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;

        client.close(None).await.unwrap();
        let reply = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("close reply within timeout");
        assert!(matches!(reply, Some(Ok(Message::Close(_)))), "got {reply:?}");

        wait_for_sessions(server.registry(), 0).await;
        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_client_messages_are_ignored() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;
        client.send(Message::Text("hello?".into())).await.unwrap();

        server
            .broadcaster()
            .broadcast(&ScanEvent::new("after", None::<String>))
            .await;
        assert_eq!(next_text(&mut client).await, "Barcode: after");
        assert_eq!(server.registry().len(), 1);

        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let server = test_server();
        server.start().await.unwrap();

        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));
        assert!(server.is_running().await);

        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let server = test_server();
        server.stop(GRACE).await.unwrap();

        server.start().await.unwrap();
        server.stop(GRACE).await.unwrap();
        server.stop(GRACE).await.unwrap();

        assert!(!server.is_running().await);
        assert_eq!(server.local_addr().await, None);
        assert!(server.failure_token().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_releases_port_and_empties_registry() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;

        // Answer the close handshake while stop runs.
        let reader = tokio::spawn(async move {
            let mut close_code = None;
            while let Some(Ok(message)) = client.next().await {
                if let Message::Close(Some(frame)) = message {
                    close_code = Some(frame.code);
                }
            }
            close_code
        });

        server.stop(GRACE).await.unwrap();
        assert!(server.registry().is_empty());
        assert_eq!(reader.await.unwrap(), Some(CloseCode::Away));

        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let server = test_server();
        server.start().await.unwrap();
        server.stop(GRACE).await.unwrap();

        let addr = server.start().await.unwrap();
        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;
        server
            .broadcaster()
            .broadcast(&ScanEvent::new("again", None::<String>))
            .await;
        assert_eq!(next_text(&mut client).await, "Barcode: again");

        server.stop(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn test_unresponsive_client_is_dropped_after_grace() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        // Never read, so the close handshake is never answered.
        let _client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;

        let started = std::time::Instant::now();
        server.stop(Duration::from_millis(200)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn test_attach_source_pumps_scans() {
        let server = test_server();
        let addr = server.start().await.unwrap();

        let mut client = connect(addr).await;
        wait_for_sessions(server.registry(), 1).await;

        let (handle, source) = scan_channel();
        server.attach_source(source).await.unwrap();
        handle.on_scan_event("first", None);
        handle.on_scan_event("second", Some("QR"));

        assert_eq!(next_text(&mut client).await, "Barcode: first");
        assert_eq!(next_text(&mut client).await, "Barcode: second");

        server.stop(GRACE).await.unwrap();
        assert!(!handle.on_scan_event("late", None));
    }

    #[tokio::test]
    async fn test_attach_source_requires_running_server() {
        let server = test_server();
        let (_handle, source) = scan_channel();
        assert!(matches!(
            server.attach_source(source).await,
            Err(ServerError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.port = taken.local_addr().unwrap().port();

        let server = Server::new(config, Arc::new(SessionRegistry::new()));
        assert!(matches!(server.start().await, Err(ServerError::Bind { .. })));
        assert!(!server.is_running().await);
    }

    struct CountingLiveness(AtomicU64);

    #[async_trait]
    impl LivenessSink for CountingLiveness {
        async fn still_running(&self, _tick: u64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_liveness_runs_only_while_started() {
        let mut config = test_config();
        config.liveness.enabled = true;
        config.liveness.initial_delay_ms = 10;
        config.liveness.interval_ms = 10;

        let ticks = Arc::new(CountingLiveness(AtomicU64::new(0)));
        let server = Server::new(config, Arc::new(SessionRegistry::new()))
            .with_liveness(Arc::clone(&ticks) as Arc<dyn LivenessSink>);

        server.start().await.unwrap();
        timeout(Duration::from_secs(5), async {
            while ticks.0.load(Ordering::SeqCst) < 2 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("liveness ticks not delivered");
        server.stop(GRACE).await.unwrap();

        let after_stop = ticks.0.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.0.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_transient_accept_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
    }

    #[cfg(unix)]
    #[test]
    fn test_fd_exhaustion_is_transient() {
        for code in FD_EXHAUSTION_ERRNOS {
            assert!(is_transient(&io::Error::from_raw_os_error(code)));
        }
    }

    /// Fails with each queued error in turn, then never accepts again.
    struct ScriptedAcceptor(std::collections::VecDeque<io::Error>);

    #[async_trait]
    impl Acceptor for ScriptedAcceptor {
        async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
            match self.0.pop_front() {
                Some(e) => Err(e),
                None => std::future::pending().await,
            }
        }
    }

    async fn launch_scripted(server: &Server, errors: Vec<io::Error>) {
        let mut state = server.state.lock().await;
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        server.launch(&mut state, ScriptedAcceptor(errors.into()), addr);
    }

    #[tokio::test]
    async fn test_fatal_accept_error_reported_once() {
        let server = test_server();
        launch_scripted(
            &server,
            vec![
                io::Error::from(io::ErrorKind::ConnectionAborted),
                io::Error::from(io::ErrorKind::PermissionDenied),
            ],
        )
        .await;

        let failed = server.failure_token().await.unwrap();
        timeout(Duration::from_secs(5), failed.cancelled())
            .await
            .expect("failure token did not fire");
        assert!(server.is_running().await);

        match server.stop(GRACE).await {
            Err(ServerError::Accept(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("Expected accept error, got {:?}", other),
        }
        server.stop(GRACE).await.unwrap();
        assert!(!server.is_running().await);
        assert!(server.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_accept_errors_keep_loop_alive() {
        let server = test_server();
        let mut errors = vec![
            io::Error::from(io::ErrorKind::ConnectionReset),
            io::Error::from(io::ErrorKind::Interrupted),
        ];
        #[cfg(unix)]
        errors.push(io::Error::from_raw_os_error(FD_EXHAUSTION_ERRNOS[1]));
        launch_scripted(&server, errors).await;

        // Past the fd-exhaustion back-off.
        sleep(ACCEPT_BACKOFF * 5).await;

        let failed = server.failure_token().await.unwrap();
        assert!(!failed.is_cancelled());
        server.stop(GRACE).await.unwrap();
    }
}
