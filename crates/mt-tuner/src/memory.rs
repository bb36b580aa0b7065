//! In-process transport for embedding the tuner next to an engine in the
//! same process, and for scripting engines in tests.

use async_trait::async_trait;
use mt_types::TransportError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::transport::{Connector, Transport, TransportResult};

/// One end of an in-memory channel.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<UnboundedSender<String>>,
    rx: UnboundedReceiver<String>,
    endpoint: String,
}

/// Create two connected endpoints. Whatever one sends, the other receives.
pub fn pair(name: &str) -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = unbounded_channel();
    let (b_tx, a_rx) = unbounded_channel();
    (
        MemoryTransport {
            tx: Some(a_tx),
            rx: a_rx,
            endpoint: format!("memory://{name}/a"),
        },
        MemoryTransport {
            tx: Some(b_tx),
            rx: b_rx,
            endpoint: format!("memory://{name}/b"),
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, message: &str) -> TransportResult<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message.to_string()).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> TransportResult<String> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Hands out pre-built transports, one per session.
///
/// Fails with [`TransportError::ConnectFailed`] once the queue is empty.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    queue: Mutex<VecDeque<MemoryTransport>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transport: MemoryTransport) {
        self.queue.lock().push_back(transport);
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self) -> TransportResult<MemoryTransport> {
        self.queue
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::ConnectFailed {
                endpoint: "memory".to_string(),
                attempts: 1,
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no engine left to connect to",
                ),
            })
    }
}
