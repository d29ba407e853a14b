//! In-memory duplex connection, used by tests and local tooling.

use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, Mutex};

use crate::{Connection, Frame, TransportError};

/// The server-side half of an in-memory connection pair.
pub struct MemoryConnection {
    tx: StdMutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
}

/// The "client" half, driven by tests: what it sends, `MemoryConnection`
/// receives, and vice versa. Dropping it simulates a client disconnect.
pub struct RemoteEnd {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryConnection {
    /// Creates a connected pair.
    pub fn pair() -> (Self, RemoteEnd) {
        let (to_server, from_remote) = mpsc::unbounded_channel();
        let (to_remote, from_server) = mpsc::unbounded_channel();
        let conn = Self {
            tx: StdMutex::new(Some(to_remote)),
            rx: Mutex::new(from_remote),
        };
        let remote = RemoteEnd {
            tx: to_server,
            rx: from_server,
        };
        (conn, remote)
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let tx = self
            .tx
            .lock()
            .expect("memory connection lock poisoned")
            .clone()
            .ok_or(TransportError::Closed)?;
        tx.send(frame)
            .map_err(|_| TransportError::SendFailed("remote end dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) {
        // Dropping the sender makes the remote's recv return None.
        self.tx.lock().expect("memory connection lock poisoned").take();
    }
}

impl RemoteEnd {
    /// Sends a frame to the server side.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::SendFailed("server end dropped".into()))
    }

    /// Receives the next frame from the server side. `None` once the
    /// server closed the connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}
