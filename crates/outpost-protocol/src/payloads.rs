//! Typed payloads and their big-endian codecs.
//!
//! Every event remainder has one struct here. Encode/decode is hand-rolled
//! per event on top of the [`WireField`] helpers instead of going through
//! runtime field lookup: the declared structure in the catalog stays the
//! source of truth for sizes and offsets, and the impls below follow it
//! field for field. All integers and floats are big-endian; the terminal
//! string field is raw UTF-8 with no length prefix and consumes whatever
//! bytes remain.

use std::sync::LazyLock;

use crate::events::{self, EventCatalog, EventSpec};
use crate::structure::{FieldKind, MESSAGE_HEADER_SIZE};
use crate::types::{ClientId, MessageId};
use crate::ProtocolError;

/// A cursor over a payload remainder.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.data.len() - self.pos < n {
            return Err(ProtocolError::ShortMessage {
                expected: (self.pos + n) as u32,
                got: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Everything not yet consumed; used by the terminal string field.
    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

/// A primitive that knows how to put itself on the wire and take itself
/// back off. One impl per [`FieldKind`].
pub trait WireField: Sized {
    const KIND: FieldKind;
    fn put(&self, out: &mut Vec<u8>);
    fn take(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError>;
}

macro_rules! numeric_wire_field {
    ($ty:ty, $kind:expr, $bytes:literal) => {
        impl WireField for $ty {
            const KIND: FieldKind = $kind;

            fn put(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }

            fn take(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
                let raw = reader.take($bytes)?;
                let mut buf = [0u8; $bytes];
                buf.copy_from_slice(raw);
                Ok(<$ty>::from_be_bytes(buf))
            }
        }
    };
}

numeric_wire_field!(u8, FieldKind::U8, 1);
numeric_wire_field!(u16, FieldKind::U16, 2);
numeric_wire_field!(u32, FieldKind::U32, 4);
numeric_wire_field!(u64, FieldKind::U64, 8);
numeric_wire_field!(i8, FieldKind::I8, 1);
numeric_wire_field!(i16, FieldKind::I16, 2);
numeric_wire_field!(i32, FieldKind::I32, 4);
numeric_wire_field!(i64, FieldKind::I64, 8);
numeric_wire_field!(f32, FieldKind::F32, 4);
numeric_wire_field!(f64, FieldKind::F64, 8);

impl WireField for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn put(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn take(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(reader.take(1)?[0] != 0)
    }
}

impl WireField for String {
    const KIND: FieldKind = FieldKind::Str;

    fn put(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn take(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let rest = reader.rest();
        std::str::from_utf8(rest)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }
}

impl WireField for ClientId {
    const KIND: FieldKind = FieldKind::U32;

    fn put(&self, out: &mut Vec<u8>) {
        self.0.put(out);
    }

    fn take(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(ClientId(u32::take(reader)?))
    }
}

/// A typed event payload tied to its catalog entry.
pub trait EventPayload: Sized {
    /// The catalog entry this payload belongs to.
    fn spec() -> &'static EventSpec;

    /// Appends the payload fields in declaration order.
    fn write_fields(&self, out: &mut Vec<u8>);

    /// Reads the payload fields in declaration order.
    fn read_fields(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError>;
}

/// Serializes a payload to `[event id bytes][fields]`.
///
/// The sender id is prepended by the broadcaster, not here.
pub fn serialize<P: EventPayload>(payload: &P) -> Vec<u8> {
    let spec = P::spec();
    let mut out = Vec::with_capacity(4 + spec.min_payload_size as usize);
    out.extend_from_slice(&spec.id_bytes);
    payload.write_fields(&mut out);
    out
}

/// Deserializes a payload.
///
/// With `remainder_only` the input is just the fields (header already
/// stripped); otherwise the input is a full frame and the 8-byte header is
/// skipped. Verifies the minimum size up front; the per-field reads catch
/// truncation inside the variable region.
pub fn deserialize<P: EventPayload>(
    data: &[u8],
    remainder_only: bool,
) -> Result<P, ProtocolError> {
    let spec = P::spec();
    let header = if remainder_only { 0 } else { MESSAGE_HEADER_SIZE as usize };
    let expected = spec.min_payload_size as usize + header;
    if data.len() < expected {
        return Err(ProtocolError::ShortMessage {
            expected: expected as u32,
            got: data.len(),
        });
    }
    let mut reader = PayloadReader::new(&data[header..]);
    P::read_fields(&mut reader)
}

/// Splits a raw frame into `(sender id, spec, remainder)`.
///
/// Verifies the 8-byte header is present, the event id is registered and
/// the frame is at least `header + min payload` long.
pub fn extract_header<'a>(
    catalog: &EventCatalog,
    frame: &'a [u8],
) -> Result<(ClientId, &'static EventSpec, &'a [u8]), ProtocolError> {
    if frame.len() < MESSAGE_HEADER_SIZE as usize {
        return Err(ProtocolError::ShortMessage {
            expected: MESSAGE_HEADER_SIZE,
            got: frame.len(),
        });
    }
    let sender = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let event_id = MessageId::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);

    let spec = catalog
        .get(event_id)
        .ok_or(ProtocolError::UnknownEventId(event_id))?;

    let expected = MESSAGE_HEADER_SIZE + spec.min_payload_size;
    if (frame.len() as u32) < expected {
        return Err(ProtocolError::ShortMessage {
            expected,
            got: frame.len(),
        });
    }

    Ok((ClientId(sender), spec, &frame[MESSAGE_HEADER_SIZE as usize..]))
}

macro_rules! event_payload {
    ($(#[$meta:meta])* $name:ident => $spec:expr, { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl EventPayload for $name {
            fn spec() -> &'static EventSpec {
                LazyLock::force(&$spec)
            }

            fn write_fields(&self, out: &mut Vec<u8>) {
                $(self.$field.put(out);)*
            }

            fn read_fields(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
                Ok(Self {
                    $($field: WireField::take(reader)?,)*
                })
            }
        }
    };
}

event_payload!(
    /// Outbound diagnostics for a rejected or failed client message.
    DebugMessage => events::DEBUG_INFO_EVENT, {
        code: u32,
        message: String,
    }
);

event_payload!(PlayerJoined => events::PLAYER_JOINED_EVENT, {
    id: ClientId,
    ign: String,
});

event_payload!(PlayerLeft => events::PLAYER_LEFT_EVENT, {
    id: ClientId,
    ign: String,
});

event_payload!(EnterLocation => events::ENTER_LOCATION_EVENT, {
    id: u32,
});

event_payload!(PlayerMove => events::PLAYER_MOVE_EVENT, {
    player_id: ClientId,
    colony_location_id: u32,
});

event_payload!(DifficultySelect => events::DIFFICULTY_SELECT_EVENT, {
    colony_location_id: u32,
    minigame_id: u32,
    difficulty_id: u32,
    difficulty_name: String,
});

event_payload!(
    /// The composite the activity tracker holds while locked in.
    DifficultyConfirmed => events::DIFFICULTY_CONFIRMED_EVENT, {
        colony_location_id: u32,
        minigame_id: u32,
        difficulty_id: u32,
        difficulty_name: String,
    }
);

event_payload!(PlayerReady => events::PLAYER_READY_EVENT, {
    id: ClientId,
    ign: String,
});

event_payload!(PlayerAbortingMinigame => events::PLAYER_ABORTING_MINIGAME_EVENT, {
    id: ClientId,
    ign: String,
});

event_payload!(PlayerJoinActivity => events::PLAYER_JOIN_ACTIVITY_EVENT, {
    id: ClientId,
    ign: String,
});

event_payload!(PlayerLoadFailure => events::PLAYER_LOAD_FAILURE_EVENT, {
    reason: String,
});

event_payload!(
    /// Termination of a minigame before a victory or defeat condition.
    /// `source_id` is the client (or server) the abort originated from.
    UntimelyAbort => events::MINIGAME_UNTIMELY_ABORT_EVENT, {
        source_id: ClientId,
        reason: String,
    }
);

event_payload!(PlayerLoadComplete => events::PLAYER_LOAD_COMPLETE_EVENT, {
    id: ClientId,
    ign: String,
});

event_payload!(MinigameWon => events::MINIGAME_WON_EVENT, {
    colony_location_id: u32,
    minigame_id: u32,
    difficulty_id: u32,
    difficulty_name: String,
});

event_payload!(MinigameLost => events::MINIGAME_LOST_EVENT, {
    colony_location_id: u32,
    minigame_id: u32,
    difficulty_id: u32,
    difficulty_name: String,
});

event_payload!(
    /// Relative viewport offsets: x and y are 0-1 values the client
    /// multiplies with its viewport dimensions.
    AsteroidSpawn => events::ASTEROID_SPAWN_EVENT, {
        id: u32,
        x: f32,
        y: f32,
        health: u8,
        time_until_impact: u32,
        asteroid_type: u8,
        char_code: String,
    }
);

event_payload!(AssignPlayerData => events::ASSIGN_PLAYER_DATA_EVENT, {
    id: ClientId,
    x: f32,
    y: f32,
    tank_type: u8,
    char_code: String,
});

event_payload!(AsteroidImpact => events::ASTEROID_IMPACT_EVENT, {
    id: u32,
    colony_hp_left: u32,
});

event_payload!(PlayerShoot => events::PLAYER_SHOOT_EVENT, {
    player_id: ClientId,
    char_code: String,
});

/// Penalty type discriminators carried in [`PlayerPenalty::penalty_type`].
pub const PENALTY_TYPE_FRIENDLY_FIRE: &str = "friendlyFire";
pub const PENALTY_TYPE_MISS: &str = "miss";

event_payload!(PlayerPenalty => events::PLAYER_PENALTY_EVENT, {
    player_id: ClientId,
    timeout_duration_s: f32,
    penalty_type: String,
});
