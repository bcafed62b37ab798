//! Native HTTP server
//!
//! hyper HTTP/1.1 on a multi-threaded tokio runtime:
//! - SO_REUSEADDR/SO_REUSEPORT listener with TCP_NODELAY
//! - request bodies collected up to the configured limit (413 beyond it)
//! - synchronous dispatch on the blocking pool
//! - WebSocket sessions on upgraded connections
//! - graceful shutdown with a bounded drain

use crate::handlers::websocket::{Message, Peer, Upgrade};
use crate::{Error, Method, Request, Response, ResponseBuilder, Result, Router, StatusCode};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub workers: usize,
    /// Maximum request body in bytes
    pub body_limit: usize,
    /// How long in-flight connections get to finish on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8080,
            workers: num_cpus::get(),
            body_limit: 10 * 1024 * 1024,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// First address `hostname:port` resolves to
    pub fn addr(&self) -> Result<SocketAddr> {
        (self.hostname.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Internal(format!("no address for {}:{}", self.hostname, self.port)))
    }
}

/// Server state shared across all connections
///
/// Dispatch takes the read lock; late registration takes the write lock,
/// so a request never sees a half-inserted route.
pub struct ServerState {
    pub router: RwLock<Router>,
}

impl ServerState {
    pub fn new(router: Router) -> Self {
        Self {
            router: RwLock::new(router),
        }
    }

    /// Mutate the router while serving
    pub fn register<R>(&self, f: impl FnOnce(&mut Router) -> R) -> R {
        f(&mut self.router.write())
    }

    pub fn dispatch(&self, req: Request) -> Response {
        self.router.read().dispatch(req)
    }
}

/// Tracks active connections for graceful shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
    shutting_down: AtomicBool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until no connection is active or `timeout` passes
    ///
    /// Returns true if all connections drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.count() == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// HTTP server around a [`Router`]
pub struct Server {
    state: Arc<ServerState>,
    config: ServerConfig,
    tracker: Arc<ConnectionTracker>,
}

impl Server {
    pub fn new(router: Router, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(ServerState::new(router)),
            config,
            tracker: Arc::new(ConnectionTracker::new()),
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    pub fn tracker(&self) -> Arc<ConnectionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Bind the configured address; must run inside a tokio runtime
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.addr()?;
        let socket = create_optimized_socket(&addr)?;
        socket.set_nonblocking(true)?;
        Ok(TcpListener::from_std(socket.into())?)
    }

    /// Build a runtime, serve until Ctrl-C
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.workers.max(1))
            .enable_all()
            .build()?;

        runtime.block_on(async move {
            let listener = self.bind()?;
            self.serve(listener, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
            })
            .await
        })
    }

    /// Accept on `listener` until `shutdown` resolves, then drain
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let limit = self.config.body_limit;
        info!(addr = %listener.local_addr()?, body_limit = limit, "listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            // Reject new connections during shutdown
            if self.tracker.is_shutting_down() {
                drop(stream);
                continue;
            }

            let state = Arc::clone(&self.state);
            let tracker = Arc::clone(&self.tracker);
            let mut stop = stop_rx.clone();
            tracker.increment();

            tokio::spawn(async move {
                let sessions = Arc::clone(&tracker);
                let session_stop = stop.clone();
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    let sessions = Arc::clone(&sessions);
                    let session_stop = session_stop.clone();
                    async move { handle(state, req, limit, sessions, session_stop).await }
                });
                let conn = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades();
                tokio::pin!(conn);

                let result = tokio::select! {
                    res = conn.as_mut() => res,
                    _ = stop.changed() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "connection error");
                }
                tracker.decrement();
            });
        }

        info!(active = self.tracker.count(), "shutting down");
        self.tracker.start_shutdown();
        let _ = stop_tx.send(true);

        if !self.tracker.drain(self.config.shutdown_timeout).await {
            warn!(remaining = self.tracker.count(), "shutdown timeout, dropping connections");
        }
        Ok(())
    }
}

async fn handle(
    state: Arc<ServerState>,
    mut req: hyper::Request<Incoming>,
    limit: usize,
    tracker: Arc<ConnectionTracker>,
    stop: watch::Receiver<bool>,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let on_upgrade = hyper::upgrade::on(&mut req);
    let mut res = match from_hyper_request(req, limit).await {
        Ok(request) => match tokio::task::spawn_blocking(move || state.dispatch(request)).await {
            Ok(res) => res,
            Err(e) => {
                error!(error = %e, "dispatch task failed");
                Response::internal_error("Internal Server Error")
            }
        },
        Err(e) => reject(&e),
    };
    if let Some(upgrade) = res.upgrade.take() {
        if res.status == StatusCode::SWITCHING_PROTOCOLS {
            tokio::spawn(serve_websocket(on_upgrade, upgrade, tracker, stop));
        }
    }
    Ok(to_hyper_response(res))
}

/// Pump frames between an upgraded connection and its session
///
/// The session runs on the blocking pool. The pump ends when either side
/// closes or the server starts shutting down; the session then sees end of
/// stream on `receive` and an error on `send`.
async fn serve_websocket(
    on_upgrade: OnUpgrade,
    upgrade: Upgrade,
    tracker: Arc<ConnectionTracker>,
    mut stop: watch::Receiver<bool>,
) {
    let io = match on_upgrade.await {
        Ok(io) => io,
        Err(e) => {
            warn!(error = %e, "websocket upgrade failed");
            return;
        }
    };
    tracker.increment();
    debug!(?upgrade, "websocket open");

    let stream = WebSocketStream::from_raw_socket(TokioIo::new(io), Role::Server, None).await;
    let (mut sink, mut source) = stream.split();
    let (peer, session) = upgrade.open();
    let Peer { inbound, mut outbound } = peer;
    let session = tokio::task::spawn_blocking(session);

    let read = async move {
        while let Some(frame) = source.next().await {
            let message = match frame {
                Ok(Frame::Text(text)) => Message::Text(text.as_str().to_string()),
                Ok(Frame::Binary(data)) => Message::Binary(data),
                Ok(Frame::Close(_)) => break,
                // Control frames are answered by the codec
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            };
            if inbound.send(message).await.is_err() {
                break;
            }
        }
    };
    let write = async move {
        loop {
            let message = tokio::select! {
                next = outbound.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
                _ = stop.changed() => break,
            };
            let frame = match message {
                Message::Text(text) => Frame::text(text),
                Message::Binary(data) => Frame::binary(data),
            };
            if let Err(e) = sink.send(frame).await {
                debug!(error = %e, "websocket write failed");
                return;
            }
        }
        let _ = sink.close().await;
    };
    tokio::select! {
        _ = read => {}
        _ = write => {}
    }

    match session.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "websocket session failed"),
        Err(e) => error!(error = %e, "websocket session panicked"),
    }
    debug!("websocket closed");
    tracker.decrement();
}

/// Reply for a request that never reached the router
fn reject(err: &Error) -> Response {
    let status = err.explicit_status().unwrap_or(StatusCode::BAD_REQUEST);
    warn!(status = status.as_u16(), error = %err, "request rejected");
    ResponseBuilder::new(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(err.to_string())
        .build()
}

/// Create a TCP socket with optimizations
pub fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // SO_REUSEPORT - enable kernel load balancing across threads
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

/// Convert a hyper request, collecting at most `limit` body bytes
pub async fn from_hyper_request(req: hyper::Request<Incoming>, limit: usize) -> Result<Request> {
    let (parts, body) = req.into_parts();
    let method = Method::from_str(parts.method.as_str())?;

    let declared = parts
        .headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(size) = declared.filter(|size| *size > limit) {
        return Err(Error::BodyTooLarge { size, limit });
    }

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(Error::BodyTooLarge {
                size: declared.unwrap_or(limit + 1),
                limit,
            });
        }
        Err(e) => return Err(Error::Hyper(e.to_string())),
    };

    let mut request = Request::new(method, parts.uri.path());
    request.query = parts.uri.query().map(str::to_string);
    request.body = body;

    // Copy headers
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    Ok(request)
}

/// Convert our Response to hyper Response
pub fn to_hyper_response(res: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(res.status.as_u16());

    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(res.body)) {
        Ok(res) => res,
        Err(e) => {
            error!(error = %e, "invalid response head");
            let mut fallback = hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_resolution() {
        let config = ServerConfig {
            hostname: "127.0.0.1".to_string(),
            port: 4000,
            ..Default::default()
        };
        assert_eq!(config.addr().unwrap(), "127.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn test_to_hyper_response() {
        let res = ResponseBuilder::new(StatusCode::CREATED)
            .header("x-a", "1")
            .header("x-a", "2")
            .body("made")
            .build();
        let hyper_res = to_hyper_response(res);

        assert_eq!(hyper_res.status().as_u16(), 201);
        assert_eq!(hyper_res.headers().get_all("x-a").iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let res = ResponseBuilder::new(StatusCode::OK).header("bad header", "x").build();
        assert_eq!(to_hyper_response(res).status().as_u16(), 500);
    }

    #[test]
    fn test_late_registration() {
        let state = ServerState::new(Router::new());
        assert_eq!(state.dispatch(Request::new(Method::Get, "/late")).status, StatusCode::NOT_FOUND);

        state.register(|router| {
            router
                .get("/late", |ctx: &mut crate::Context| ctx.response.text(200u16, "here"))
                .map(|_| ())
        })
        .unwrap();
        assert_eq!(state.dispatch(Request::new(Method::Get, "/late")).status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.drain(Duration::from_millis(10)).await);
        tracker.increment();
        assert!(!tracker.drain(Duration::from_millis(30)).await);
        tracker.decrement();
        assert_eq!(tracker.count(), 0);
    }
}
