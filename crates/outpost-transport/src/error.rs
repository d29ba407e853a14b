//! Error types for the transport layer.

/// Errors that can occur on a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The frame could not be written; the peer is likely gone.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The read side of the connection failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
}
