//! Transport abstraction layer for the Outpost lobby server.
//!
//! Provides the [`Connection`] trait that the lobby reader and broadcaster
//! are written against, a websocket implementation over axum's upgraded
//! sockets, and an in-memory duplex pair for tests.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — websocket connection adapter via `axum`

#![allow(async_fn_in_trait)]

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryConnection, RemoteEnd};
#[cfg(feature = "websocket")]
pub use websocket::WsConnection;

use std::future::Future;

/// A single message frame as seen by the transport.
///
/// Binary frames carry the raw wire format; text frames carry a base16 or
/// base64 rendering of the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
}

/// A bidirectional message channel to one client.
///
/// `send` and `recv` take `&self` so one task can block in `recv` while
/// broadcasts write concurrently. Implementations keep the two directions
/// independently locked.
pub trait Connection: Send + Sync + 'static {
    /// Sends a frame to the remote peer.
    fn send(&self, frame: Frame) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame. Returns `Ok(None)` on a clean close.
    fn recv(&self) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;

    /// Closes the connection. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
