//! Point-to-point message channel to the engine process.
//!
//! The engine binds a ZeroMQ PAIR socket and the tuner connects to it. Every
//! message is one UTF-8 ZeroMQ message, so framing is implicit. The link is
//! strictly alternating and has no receive timeout; a silent engine blocks
//! the tuner until the session is cancelled.

use async_trait::async_trait;
use mt_types::TransportError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest message accepted from the engine.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// How long one blocking socket call may wait before control returns to
/// the runtime, letting cancellation in.
const POLL_INTERVAL_MS: i32 = 100;

/// How long unsent messages are kept when the socket closes.
const LINGER_MS: i32 = 1000;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// One live, exactly-two-endpoint connection to the engine.
#[async_trait]
pub trait Transport: Send {
    /// Send one message.
    async fn send(&mut self, message: &str) -> TransportResult<()>;

    /// Block until the peer sends one message.
    async fn recv(&mut self) -> TransportResult<String>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> TransportResult<()>;

    /// Where this transport is connected, for logging.
    fn endpoint(&self) -> &str;
}

/// Opens a fresh [`Transport`] for every session.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self) -> TransportResult<Self::Transport>;
}

fn zmq_error(e: zmq::Error) -> TransportError {
    TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

// ---------------------------------------------------------------------------
// ZeroMQ PAIR
// ---------------------------------------------------------------------------

/// A connected PAIR socket.
///
/// libzmq calls block, so each one runs on the blocking pool with a short
/// socket timeout and is retried until it completes.
pub struct ZmqTransport {
    socket: Option<zmq::Socket>,
    endpoint: String,
}

impl std::fmt::Debug for ZmqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZmqTransport")
            .field("endpoint", &self.endpoint)
            .field("open", &self.socket.is_some())
            .finish()
    }
}

impl ZmqTransport {
    pub fn new(socket: zmq::Socket, endpoint: impl Into<String>) -> Self {
        Self {
            socket: Some(socket),
            endpoint: endpoint.into(),
        }
    }

    /// Run `op` against the socket off the async threads, repeating it while
    /// it times out.
    ///
    /// If the caller is cancelled mid-call the socket is dropped with the
    /// blocking task and the transport reads as closed afterwards.
    async fn blocking<R, F>(&mut self, mut op: F) -> TransportResult<R>
    where
        R: Send + 'static,
        F: FnMut(&zmq::Socket) -> zmq::Result<R> + Send + 'static,
    {
        loop {
            let socket = self.socket.take().ok_or(TransportError::Closed)?;
            let (socket, returned_op, result) = tokio::task::spawn_blocking(move || {
                let result = op(&socket);
                (socket, op, result)
            })
            .await
            .map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            self.socket = Some(socket);
            op = returned_op;

            match result {
                Err(zmq::Error::EAGAIN) => continue,
                other => return other.map_err(zmq_error),
            }
        }
    }
}

#[async_trait]
impl Transport for ZmqTransport {
    async fn send(&mut self, message: &str) -> TransportResult<()> {
        let len = message.len();
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        let payload = message.as_bytes().to_vec();
        self.blocking(move |socket| socket.send(payload.as_slice(), 0))
            .await?;
        debug!(endpoint = %self.endpoint, message, "sent");
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<String> {
        let payload = self.blocking(|socket| socket.recv_bytes(0)).await?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let message = String::from_utf8(payload).map_err(|_| TransportError::InvalidUtf8)?;
        debug!(endpoint = %self.endpoint, message = %message, "received");
        Ok(message)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.disconnect(&self.endpoint) {
                debug!(endpoint = %self.endpoint, error = %e, "disconnect");
            }
            drop(socket);
            info!(endpoint = %self.endpoint, "transport closed");
        }
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Connects a PAIR socket to the engine's endpoint.
///
/// ZeroMQ connects in the background, so an engine that is not listening yet
/// is not an error here; only an unusable endpoint or socket is, and that is
/// retried `attempts` times (`0` retries forever).
#[derive(Clone)]
pub struct ZmqConnector {
    context: zmq::Context,
    endpoint: String,
    attempts: u32,
    backoff: Duration,
}

impl std::fmt::Debug for ZmqConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZmqConnector")
            .field("endpoint", &self.endpoint)
            .field("attempts", &self.attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl ZmqConnector {
    pub fn new(endpoint: impl Into<String>, attempts: u32, backoff: Duration) -> Self {
        Self {
            context: zmq::Context::new(),
            endpoint: endpoint.into(),
            attempts,
            backoff,
        }
    }

    fn open(&self) -> zmq::Result<zmq::Socket> {
        let socket = self.context.socket(zmq::PAIR)?;
        socket.set_linger(LINGER_MS)?;
        socket.set_rcvtimeo(POLL_INTERVAL_MS)?;
        socket.set_sndtimeo(POLL_INTERVAL_MS)?;
        socket.set_maxmsgsize(MAX_FRAME_LEN as i64)?;
        socket.connect(&self.endpoint)?;
        Ok(socket)
    }
}

#[async_trait]
impl Connector for ZmqConnector {
    type Transport = ZmqTransport;

    async fn connect(&self) -> TransportResult<ZmqTransport> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.open() {
                Ok(socket) => {
                    info!(endpoint = %self.endpoint, attempt, "connected to engine");
                    return Ok(ZmqTransport::new(socket, self.endpoint.clone()));
                }
                Err(e) if self.attempts != 0 && attempt >= self.attempts => {
                    return Err(TransportError::ConnectFailed {
                        endpoint: self.endpoint.clone(),
                        attempts: attempt,
                        source: std::io::Error::new(std::io::ErrorKind::Other, e),
                    });
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, attempt, error = %e, "cannot open engine socket, retrying");
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipc_endpoint(dir: &tempfile::TempDir) -> String {
        format!("ipc://{}", dir.path().join("engine.ipc").display())
    }

    fn bind_engine(endpoint: &str) -> zmq::Socket {
        let context = zmq::Context::new();
        let engine = context.socket(zmq::PAIR).unwrap();
        engine.bind(endpoint).unwrap();
        engine
    }

    #[tokio::test]
    async fn exchanges_messages_with_a_bound_pair_peer() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ipc_endpoint(&dir);
        let engine = bind_engine(&endpoint);

        let peer = std::thread::spawn(move || {
            engine.send("syn", 0).unwrap();
            let ack = engine.recv_string(0).unwrap().unwrap();
            engine.send("10,0,0,0,10,0;100,,,,200,", 0).unwrap();
            let reply = engine.recv_string(0).unwrap().unwrap();
            (ack, reply)
        });

        let connector = ZmqConnector::new(&endpoint, 1, Duration::from_millis(1));
        let mut tuner = connector.connect().await.unwrap();
        assert_eq!(tuner.endpoint(), endpoint);

        assert_eq!(tuner.recv().await.unwrap(), "syn");
        tuner.send("ack").await.unwrap();
        assert_eq!(tuner.recv().await.unwrap(), "10,0,0,0,10,0;100,,,,200,");
        tuner.send("vector;24").await.unwrap();

        let (ack, reply) = peer.join().unwrap();
        assert_eq!(ack, "ack");
        assert_eq!(reply, "vector;24");
        tuner.close().await.unwrap();
    }

    #[tokio::test]
    async fn empty_messages_are_legal() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ipc_endpoint(&dir);
        let engine = bind_engine(&endpoint);
        let peer = std::thread::spawn(move || engine.send("", 0).unwrap());

        let connector = ZmqConnector::new(&endpoint, 1, Duration::from_millis(1));
        let mut tuner = connector.connect().await.unwrap();
        assert_eq!(tuner.recv().await.unwrap(), "");
        peer.join().unwrap();
    }

    #[tokio::test]
    async fn non_utf8_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = ipc_endpoint(&dir);
        let engine = bind_engine(&endpoint);
        let peer = std::thread::spawn(move || engine.send(&[0xffu8, 0xfe][..], 0).unwrap());

        let connector = ZmqConnector::new(&endpoint, 1, Duration::from_millis(1));
        let mut tuner = connector.connect().await.unwrap();
        assert!(matches!(tuner.recv().await, Err(TransportError::InvalidUtf8)));
        peer.join().unwrap();
    }

    #[tokio::test]
    async fn closed_transport_refuses_io() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ZmqConnector::new(ipc_endpoint(&dir), 1, Duration::from_millis(1));
        let mut tuner = connector.connect().await.unwrap();

        tuner.close().await.unwrap();
        tuner.close().await.unwrap();
        assert!(matches!(tuner.send("x").await, Err(TransportError::Closed)));
        assert!(matches!(tuner.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn oversized_message_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ZmqConnector::new(ipc_endpoint(&dir), 1, Duration::from_millis(1));
        let mut tuner = connector.connect().await.unwrap();

        let huge = "x".repeat(MAX_FRAME_LEN + 1);
        assert!(matches!(
            tuner.send(&huge).await,
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn connect_gives_up_after_configured_attempts() {
        let connector = ZmqConnector::new("not-an-endpoint", 2, Duration::from_millis(1));
        match connector.connect().await {
            Err(TransportError::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected ConnectFailed, got {other:?}"),
        }
    }
}
