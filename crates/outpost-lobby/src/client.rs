//! Per-connection client state.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use outpost_protocol::payloads::{DebugMessage, PlayerMove};
use outpost_protocol::{
    deserialize, encode_base16, encode_base64, serialize, ClientId, EventSpec, Role, WireEncoding,
    SERVER_ID,
};
use outpost_transport::{Connection, Frame, TransportError};

/// State the client discloses about itself through its messages.
/// Untrustworthy by nature, but useful for the lobby snapshot API.
///
/// Updated from the client's reader task, read from API queries, so both
/// fields are atomics.
#[derive(Debug, Default)]
pub struct ClientState {
    last_known_position: AtomicU32,
    ms_of_last_message: AtomicU64,
}

impl ClientState {
    /// Id of the colony location the client last reported moving to.
    pub fn last_known_position(&self) -> u32 {
        self.last_known_position.load(Ordering::Relaxed)
    }

    /// Milliseconds since epoch of the client's last processed message.
    pub fn ms_of_last_message(&self) -> u64 {
        self.ms_of_last_message.load(Ordering::Relaxed)
    }

    /// Applies whatever tracked state the message carries, then stamps the
    /// last-message clock. Assumes the remainder passed size validation.
    pub(crate) fn update(&self, spec: &EventSpec, remainder: &[u8]) {
        if spec.id == outpost_protocol::events::PLAYER_MOVE_EVENT.id {
            if let Ok(movement) = deserialize::<PlayerMove>(remainder, true) {
                self.last_known_position
                    .store(movement.colony_location_id, Ordering::Relaxed);
            }
        }

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.ms_of_last_message.store(now_ms, Ordering::Relaxed);
    }
}

/// A client connected to a lobby, alive for the lifetime of its transport.
pub struct Client<C> {
    pub id: ClientId,
    pub ign: String,
    pub role: Role,
    pub encoding: WireEncoding,
    pub state: ClientState,
    conn: Arc<C>,
}

impl<C: Connection> Client<C> {
    pub fn new(
        id: ClientId,
        ign: String,
        role: Role,
        encoding: WireEncoding,
        conn: C,
    ) -> Self {
        Self {
            id,
            ign,
            role,
            encoding,
            state: ClientState::default(),
            conn: Arc::new(conn),
        }
    }

    pub(crate) fn conn(&self) -> &C {
        &self.conn
    }

    /// Sends a server-originated DebugInfo frame with an HTTP-style code.
    pub(crate) async fn send_debug(&self, code: u32, message: &str) -> Result<(), TransportError> {
        let payload = serialize(&DebugMessage {
            code,
            message: message.to_string(),
        });
        tracing::debug!(client = %self.id, code, message, "sending debug info");
        self.conn
            .send(encode_frame(self.encoding, with_sender(SERVER_ID, payload)))
            .await
    }
}

impl<C> fmt::Display for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}", self.id, self.ign, self.role)
    }
}

/// Prepends the sender id, completing the frame header.
pub(crate) fn with_sender(sender: ClientId, message: Vec<u8>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + message.len());
    frame.extend_from_slice(&sender.to_be_bytes());
    frame.extend_from_slice(&message);
    frame
}

/// Applies the lobby's wire encoding to a finished binary frame.
pub(crate) fn encode_frame(encoding: WireEncoding, frame: Vec<u8>) -> Frame {
    match encoding {
        WireEncoding::Binary => Frame::Binary(frame),
        WireEncoding::Base16 => Frame::Text(encode_base16(&frame)),
        WireEncoding::Base64 => Frame::Text(encode_base64(&frame)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_protocol::events::{PLAYER_MOVE_EVENT, PLAYER_READY_EVENT};
    use outpost_protocol::payloads::PlayerReady;

    #[test]
    fn test_state_update_tracks_player_move_position() {
        let state = ClientState::default();
        let message = serialize(&PlayerMove {
            player_id: ClientId(2),
            colony_location_id: 4,
        });
        state.update(&PLAYER_MOVE_EVENT, &message[4..]);
        assert_eq!(state.last_known_position(), 4);
        assert!(state.ms_of_last_message() > 0);
    }

    #[test]
    fn test_state_update_ignores_position_for_other_events() {
        let state = ClientState::default();
        let message = serialize(&PlayerReady { id: ClientId(2), ign: "g".into() });
        state.update(&PLAYER_READY_EVENT, &message[4..]);
        assert_eq!(state.last_known_position(), 0);
        assert!(state.ms_of_last_message() > 0);
    }

    #[test]
    fn test_with_sender_prepends_big_endian_id() {
        let frame = with_sender(ClientId(2), vec![9, 9]);
        assert_eq!(frame, vec![0, 0, 0, 2, 9, 9]);
    }

    #[test]
    fn test_encode_frame_matches_encoding() {
        assert_eq!(
            encode_frame(WireEncoding::Binary, vec![0xAB]),
            Frame::Binary(vec![0xAB])
        );
        assert_eq!(
            encode_frame(WireEncoding::Base16, vec![0xAB]),
            Frame::Text("ab".into())
        );
        assert_eq!(
            encode_frame(WireEncoding::Base64, vec![1, 2, 3, 4]),
            Frame::Text("AQIDBA==".into())
        );
    }
}
