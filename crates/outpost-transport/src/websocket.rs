//! Websocket connection adapter over axum's upgraded sockets.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::{Connection, Frame, TransportError};

/// A websocket [`Connection`].
///
/// The socket is split so the reader task can sit in `recv` while
/// broadcasts go through `send`: each half has its own lock, and only the
/// lobby's single reader task ever touches the stream half.
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
}

impl WsConnection {
    /// Wraps an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }

    async fn write(&self, message: Message) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

impl Connection for WsConnection {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Text(text) => Message::Text(text.into()),
        };
        self.write(message).await
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Binary(data.to_vec())));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Text(text.to_string())));
                }
                Some(Ok(Message::Ping(payload))) => {
                    // Answer in-line; the sink lock is free while we hold
                    // only the stream half.
                    if self.write(Message::Pong(payload)).await.is_err() {
                        return Ok(None);
                    }
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn close(&self) {
        let _ = self.write(Message::Close(None)).await;
    }
}
