//! The bridge session: one WebSocket connection, one TCP connection, and
//! the two forwarding loops that relay opaque bytes between them.
//!
//! VNC framing is self-delimiting at a higher protocol layer, so nothing
//! here interprets or reassembles the byte stream: every WebSocket message
//! is written whole to the TCP side, and every TCP read is forwarded as one
//! binary WebSocket message.

use super::BridgeConfig;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{RwLock, watch};
use tokio::time::timeout;
use tracing::{Instrument, debug, info, warn};

const DEFAULT_BUFFER_SIZE: usize = 65536;

/// A running websockify session.
///
/// The TCP connection lives in a swappable slot: the WebSocket→TCP loop may
/// replace it after a write failure (a redial) while the TCP→WebSocket loop
/// keeps reading. `Arc<TcpStream>` supports concurrent reads and writes
/// through readiness-based I/O, so the loops never lock around the socket.
#[derive(Debug)]
pub struct BridgeSession {
    target: SocketAddr,
    buffer_size: usize,
    dial_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    heartbeat_interval: Duration,
    tcp: RwLock<Arc<TcpStream>>,
    closing: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl BridgeSession {
    /// Dials the target and builds a session around the fresh connection.
    ///
    /// The buffer size starts at 65536; override it with
    /// [`set_buffer_size`](Self::set_buffer_size) before calling
    /// [`run`](Self::run).
    pub async fn connect(target: SocketAddr, config: &BridgeConfig) -> io::Result<Self> {
        let stream = dial(target, config.dial_timeout).await?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            target,
            buffer_size: DEFAULT_BUFFER_SIZE,
            dial_timeout: config.dial_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            heartbeat_interval: config.heartbeat_interval,
            tcp: RwLock::new(Arc::new(stream)),
            closing: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Runs both forwarding loops to completion.
    ///
    /// The loops are independent tasks; whichever one hits a fatal I/O
    /// error invokes [`teardown`](Self::teardown), which unblocks the other.
    pub async fn run(self, socket: WebSocket) {
        let session = Arc::new(self);
        let (ws_tx, ws_rx) = socket.split();

        let ws_to_tcp = tokio::spawn(
            session
                .clone()
                .forward_ws_to_tcp(ws_rx, session.shutdown_tx.subscribe())
                .instrument(tracing::Span::current()),
        );
        let tcp_to_ws = tokio::spawn(
            session
                .clone()
                .forward_tcp_to_ws(ws_tx, session.shutdown_tx.subscribe())
                .instrument(tracing::Span::current()),
        );

        let _ = ws_to_tcp.await;
        let _ = tcp_to_ws.await;
        info!(upstream = %session.target, "bridge session finished");
    }

    /// Closes the session: first caller wins, every later call is a no-op.
    ///
    /// Broadcasts the shutdown signal so a loop blocked on a read wakes up
    /// and exits; each loop drops its connection halves on the way out.
    pub fn teardown(&self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            debug!(upstream = %self.target, "tearing down bridge session");
            let _ = self.shutdown_tx.send(true);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Reads one WebSocket message at a time and writes it whole to the TCP
    /// connection. A WebSocket failure or Close frame ends the session. A
    /// TCP write failure gets exactly one redial and one retry; a second
    /// consecutive failure is fatal.
    async fn forward_ws_to_tcp(
        self: Arc<Self>,
        mut ws_rx: SplitStream<WebSocket>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let msg = tokio::select! {
                msg = ws_rx.next() => msg,
                _ = shutdown.changed() => break,
            };
            let data: Bytes = match msg {
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_bytes()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => {
                    debug!("client sent close frame");
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
                None => break,
            };

            if let Err(e) = self.write_tcp(&data).await {
                warn!(error = %e, upstream = %self.target, "tcp write failed, redialing");
                match self.redial().await {
                    Ok(conn) => {
                        if let Err(e) = write_all(&conn, &data, self.write_timeout).await {
                            warn!(error = %e, "tcp write failed after redial");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, upstream = %self.target, "redial failed");
                        break;
                    }
                }
            }
        }
        self.teardown();
    }

    /// Reads up to `buffer_size` bytes at a time from the TCP connection
    /// and forwards each read as one binary WebSocket message. Emits Ping
    /// frames on the heartbeat cadence when one is configured.
    async fn forward_tcp_to_ws(
        self: Arc<Self>,
        mut ws_tx: SplitSink<WebSocket, Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut buf = vec![0u8; self.buffer_size];
        let mut heartbeat = (!self.heartbeat_interval.is_zero()).then(|| {
            tokio::time::interval_at(
                tokio::time::Instant::now() + self.heartbeat_interval,
                self.heartbeat_interval,
            )
        });

        loop {
            tokio::select! {
                res = self.read_tcp(&mut buf) => {
                    let n = match res {
                        Ok(0) => {
                            debug!("tcp connection closed by peer");
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            debug!(error = %e, "tcp read failed");
                            break;
                        }
                    };
                    let frame = Bytes::copy_from_slice(&buf[..n]);
                    if let Err(e) = ws_tx.send(Message::Binary(frame)).await {
                        debug!(error = %e, "websocket write failed");
                        break;
                    }
                }
                _ = tick(&mut heartbeat) => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        let _ = ws_tx.close().await;
        self.teardown();
    }

    /// Writes the full buffer to the current TCP connection.
    async fn write_tcp(&self, data: &[u8]) -> io::Result<()> {
        let conn = self.tcp.read().await.clone();
        write_all(&conn, data, self.write_timeout).await
    }

    /// Reads at most `buf.len()` bytes from the current TCP connection.
    async fn read_tcp(&self, buf: &mut [u8]) -> io::Result<usize> {
        let conn = self.tcp.read().await.clone();
        maybe_timeout(self.read_timeout, read_some(&conn, buf)).await
    }

    /// Re-establishes the TCP connection and swaps it into the shared slot.
    async fn redial(&self) -> io::Result<Arc<TcpStream>> {
        let stream = Arc::new(dial(self.target, self.dial_timeout).await?);
        *self.tcp.write().await = stream.clone();
        info!(upstream = %self.target, "redialed tcp target");
        Ok(stream)
    }
}

async fn dial(target: SocketAddr, limit: Duration) -> io::Result<TcpStream> {
    match timeout(limit, TcpStream::connect(target)).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("dialing {} timed out", target),
        )),
    }
}

/// Resolves when the heartbeat interval ticks; never resolves when
/// heartbeats are disabled.
async fn tick(heartbeat: &mut Option<tokio::time::Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn maybe_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    if limit.is_zero() {
        fut.await
    } else {
        match timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "i/o deadline exceeded",
            )),
        }
    }
}

/// Readiness-based read against a shared `TcpStream`; cancel-safe, so it
/// can sit inside a `select!` without losing data.
async fn read_some(conn: &TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        conn.readable().await?;
        match conn.try_read(buf) {
            Ok(n) => return Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

async fn write_all(conn: &TcpStream, data: &[u8], limit: Duration) -> io::Result<()> {
    maybe_timeout(limit, async {
        let mut rest = data;
        while !rest.is_empty() {
            conn.writable().await?;
            match conn.try_write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn local_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn connect_dials_the_target() {
        let (listener, addr) = local_listener().await;
        let session = BridgeSession::connect(addr, &BridgeConfig::default())
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        assert_eq!(peer.peer_addr().unwrap().port(), local_port(&session).await);
        assert!(!session.is_closed());
    }

    async fn local_port(session: &BridgeSession) -> u16 {
        session.tcp.read().await.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn connect_fails_when_no_listener() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let err = BridgeSession::connect(addr, &BridgeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
        ));
    }

    #[tokio::test]
    async fn buffer_size_setter_overrides_default() {
        let (_listener, addr) = local_listener().await;
        let mut session = BridgeSession::connect(addr, &BridgeConfig::default())
            .await
            .unwrap();
        assert_eq!(session.buffer_size(), DEFAULT_BUFFER_SIZE);
        session.set_buffer_size(4096);
        assert_eq!(session.buffer_size(), 4096);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_under_races() {
        let (_listener, addr) = local_listener().await;
        let session = Arc::new(
            BridgeSession::connect(addr, &BridgeConfig::default())
                .await
                .unwrap(),
        );
        let mut shutdown = session.shutdown_tx.subscribe();

        // Both loops detecting failure at once must not panic.
        let a = tokio::spawn({
            let session = session.clone();
            async move { session.teardown() }
        });
        let b = tokio::spawn({
            let session = session.clone();
            async move { session.teardown() }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert!(session.is_closed());
        assert!(*shutdown.borrow_and_update());

        // A third call after the races is still a no-op.
        session.teardown();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn redial_replaces_connection_and_delivers_pending_bytes() {
        let (listener, addr) = local_listener().await;
        let session = BridgeSession::connect(addr, &BridgeConfig::default())
            .await
            .unwrap();

        // The first connection dies before the session writes anything.
        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        let replacement = session.redial().await.unwrap();
        let (mut second, _) = listener.accept().await.unwrap();

        // The retry path writes against the replacement connection.
        write_all(&replacement, b"pending message", Duration::ZERO)
            .await
            .unwrap();
        let mut buf = vec![0u8; 32];
        let n = second.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pending message");

        // The shared slot now hands out the replacement to both loops.
        assert!(Arc::ptr_eq(&replacement, &session.tcp.read().await.clone()));
    }

    #[tokio::test]
    async fn write_tcp_uses_the_current_slot() {
        let (listener, addr) = local_listener().await;
        let session = BridgeSession::connect(addr, &BridgeConfig::default())
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        session.write_tcp(b"hello vnc").await.unwrap();
        let mut buf = vec![0u8; 16];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello vnc");
    }

    #[tokio::test]
    async fn read_tcp_observes_peer_close_as_eof() {
        let (listener, addr) = local_listener().await;
        let session = BridgeSession::connect(addr, &BridgeConfig::default())
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        drop(peer);

        let mut buf = vec![0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(5), session.read_tcp(&mut buf))
            .await
            .expect("read should unblock once the peer closes")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn read_tcp_honors_the_read_deadline() {
        let (listener, addr) = local_listener().await;
        let config = BridgeConfig {
            read_timeout: Duration::from_millis(50),
            ..BridgeConfig::default()
        };
        let session = BridgeSession::connect(addr, &config).await.unwrap();
        let (_peer, _) = listener.accept().await.unwrap();

        let mut buf = vec![0u8; 16];
        let err = session.read_tcp(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
