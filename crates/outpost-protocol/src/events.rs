//! The immutable event catalog.
//!
//! Every message on the wire starts with two big-endian u32s: the sender id
//! and the event id. The event id keys into this catalog, which records who
//! may send the event, its field layout, its minimum size and how the lobby
//! dispatches it.
//!
//! Id ranges:
//!
//! - `1..=10` — system (debug, server lifecycle)
//! - `11..=999` — lobby management
//! - `1000..=1999` — colony events
//! - `2000..=2999` — minigame orchestration
//! - `3000..=3999` — asteroids

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::structure::{compute_structure, FieldKind, FieldSpec};
use crate::types::{MessageId, Role};
use crate::ProtocolError;

/// The `{guest, owner, server}` permission triple carried by every spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub guest: bool,
    pub owner: bool,
    pub server: bool,
}

impl Permissions {
    pub const ALL: Self = Self { guest: true, owner: true, server: true };
    pub const OWNER_ONLY: Self = Self { guest: false, owner: true, server: false };
    pub const SERVER_ONLY: Self = Self { guest: false, owner: false, server: true };
    pub const OWNER_AND_GUESTS: Self = Self { guest: true, owner: true, server: false };

    /// Whether the given role may send this event.
    pub fn allows(&self, role: Role) -> bool {
        match role {
            Role::Guest => self.guest,
            Role::Owner => self.owner,
            Role::Server => self.server,
        }
    }
}

/// What the lobby reader does with an inbound message once the header,
/// size and permission checks have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Accept and do nothing. Used for server-only events, so a client
    /// echoing one back is dropped without ceremony.
    Ignore,
    /// Re-broadcast `[event id][remainder]` to every other client in the
    /// lobby without inspecting the payload.
    Replicate,
    /// Log the payload. Debug traffic only.
    Debug,
}

/// One entry of the catalog: everything the server knows about an event.
#[derive(Debug)]
pub struct EventSpec {
    pub id: MessageId,
    /// The id pre-encoded big-endian, ready to prefix onto a payload.
    pub id_bytes: [u8; 4],
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: Permissions,
    /// Field layout in declaration order, offsets counted from the frame
    /// start (header included).
    pub structure: Vec<FieldSpec>,
    /// Sum of the fixed-size fields; the payload may exceed this only via
    /// the terminal variable-size field.
    pub min_payload_size: u32,
    pub handler: HandlerKind,
}

impl EventSpec {
    /// Builds a spec, computing the structure from the declared fields.
    ///
    /// Panics on a malformed field list; specs are process constants and a
    /// bad declaration is unshippable (the catalog test exercises every
    /// one of them).
    fn new(
        id: MessageId,
        name: &'static str,
        description: &'static str,
        permissions: Permissions,
        handler: HandlerKind,
        fields: &[(&'static str, FieldKind)],
    ) -> Self {
        let (min_payload_size, structure) = compute_structure(name, fields)
            .expect("static event declaration must be well-formed");
        Self {
            id,
            id_bytes: id.to_be_bytes(),
            name,
            description,
            permissions,
            structure,
            min_payload_size,
            handler,
        }
    }
}

macro_rules! event_spec {
    ($static_name:ident = $id:literal, $name:literal, $desc:literal, $perms:expr, $handler:expr, [$(($field:literal, $kind:expr)),* $(,)?]) => {
        pub static $static_name: LazyLock<EventSpec> = LazyLock::new(|| {
            EventSpec::new($id, $name, $desc, $perms, $handler, &[$(($field, $kind)),*])
        });
    };
}

use self::HandlerKind::{Ignore, Replicate};
use crate::structure::FieldKind::{Str, F32, U32, U8};

// -- System (1..=10) --------------------------------------------------------

event_spec!(DEBUG_INFO_EVENT = 1, "DebugInfo",
    "Carries an HTTP-style status code and a free-form message. Sent by the server when a client message is rejected.",
    Permissions::ALL, HandlerKind::Debug,
    [("code", U32), ("message", Str)]);

event_spec!(SERVER_CLOSING_EVENT = 2, "ServerClosing",
    "Sent to every lobby when the process shuts down, followed by LobbyClosing.",
    Permissions::SERVER_ONLY, Ignore, []);

// -- Lobby management (11..=999) --------------------------------------------

event_spec!(PLAYER_JOINED_EVENT = 11, "PlayerJoined",
    "Sent to existing members when a player joins the lobby.",
    Permissions::SERVER_ONLY, Ignore,
    [("id", U32), ("ign", Str)]);

event_spec!(PLAYER_LEFT_EVENT = 12, "PlayerLeft",
    "Sent to remaining members when a player leaves the lobby.",
    Permissions::SERVER_ONLY, Ignore,
    [("id", U32), ("ign", Str)]);

event_spec!(LOBBY_CLOSING_EVENT = 13, "LobbyClosing",
    "Sent when the lobby closes.",
    Permissions::SERVER_ONLY, Ignore, []);

// -- Colony (1000..=1999) ---------------------------------------------------

event_spec!(ENTER_LOCATION_EVENT = 1001, "EnterLocation",
    "Sent when the owner enters a colony location.",
    Permissions::OWNER_ONLY, Replicate,
    [("id", U32)]);

event_spec!(PLAYER_MOVE_EVENT = 1002, "PlayerMove",
    "Sent when any player moves to some colony location.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("playerID", U32), ("colonyLocationID", U32)]);

// -- Minigame orchestration (2000..=2999) -----------------------------------

event_spec!(DIFFICULTY_SELECT_EVENT = 2000, "DifficultySelectForMinigame",
    "Sent when the owner highlights a difficulty (not yet confirmed).",
    Permissions::OWNER_ONLY, Replicate,
    [("colonyLocationID", U32), ("minigameID", U32), ("difficultyID", U32), ("difficultyName", Str)]);

event_spec!(DIFFICULTY_CONFIRMED_EVENT = 2001, "DifficultyConfirmedForMinigame",
    "Sent when the owner confirms a selected difficulty. Locks the activity tracker.",
    Permissions::OWNER_ONLY, Replicate,
    [("colonyLocationID", U32), ("minigameID", U32), ("difficultyID", U32), ("difficultyName", Str)]);

event_spec!(PLAYERS_DECLARE_INTENT_EVENT = 2002, "PlayersDeclareIntentForMinigame",
    "Sent once every lobby member has either joined the activity or opted out.",
    Permissions::SERVER_ONLY, Ignore, []);

event_spec!(PLAYER_READY_EVENT = 2003, "PlayerReadyForMinigame",
    "Sent when a participant declares readiness.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("id", U32), ("ign", Str)]);

event_spec!(PLAYER_ABORTING_MINIGAME_EVENT = 2004, "PlayerAbortingMinigame",
    "Sent when a player opts out of the pending minigame.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("id", U32), ("ign", Str)]);

event_spec!(MINIGAME_BEGINS_EVENT = 2005, "MinigameBegins",
    "Sent when the minigame's rising edge has completed and the loop starts.",
    Permissions::SERVER_ONLY, Ignore, []);

event_spec!(PLAYER_JOIN_ACTIVITY_EVENT = 2006, "PlayerJoinActivity",
    "Sent when a player opts into the pending minigame.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("id", U32), ("ign", Str)]);

event_spec!(PLAYER_LOAD_FAILURE_EVENT = 2007, "PlayerLoadFailure",
    "Sent when a participant fails to load the minigame scene. Aborts the sequence.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("reason", Str)]);

event_spec!(MINIGAME_UNTIMELY_ABORT_EVENT = 2008, "GenericMinigameUntimelyAbort",
    "Sent when a minigame ends before its natural victory or defeat condition.",
    Permissions::SERVER_ONLY, Ignore,
    [("id", U32), ("reason", Str)]);

event_spec!(PLAYER_LOAD_COMPLETE_EVENT = 2009, "PlayerLoadComplete",
    "Sent when a participant has finished loading the minigame scene.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("id", U32), ("ign", Str)]);

event_spec!(LOAD_MINIGAME_EVENT = 2010, "LoadMinigame",
    "Sent once all participants are ready; clients load the minigame scene.",
    Permissions::SERVER_ONLY, Ignore, []);

event_spec!(MINIGAME_SEQUENCE_RESET_EVENT = 2011, "GenericMinigameSequenceReset",
    "Sent when the minigame initiation sequence is cancelled and tracking resets.",
    Permissions::SERVER_ONLY, Ignore, []);

event_spec!(MINIGAME_WON_EVENT = 2012, "MinigameWon",
    "Sent when the server determines the minigame was won.",
    Permissions::SERVER_ONLY, Ignore,
    [("colonyLocationID", U32), ("minigameID", U32), ("difficultyID", U32), ("difficultyName", Str)]);

event_spec!(MINIGAME_LOST_EVENT = 2013, "MinigameLost",
    "Sent when the server determines the minigame was lost.",
    Permissions::SERVER_ONLY, Ignore,
    [("colonyLocationID", U32), ("minigameID", U32), ("difficultyID", U32), ("difficultyName", Str)]);

// -- Asteroids (3000..=3999) ------------------------------------------------

event_spec!(ASTEROID_SPAWN_EVENT = 3000, "AsteroidsAsteroidSpawn",
    "Sent when the server spawns a new asteroid.",
    Permissions::SERVER_ONLY, Ignore,
    [("id", U32), ("x", F32), ("y", F32), ("health", U8), ("timeUntilImpact", U32), ("type", U8), ("charCode", Str)]);

event_spec!(ASSIGN_PLAYER_DATA_EVENT = 3001, "AsteroidsAssignPlayerData",
    "Sent to all players once the server has assigned the graphical layout.",
    Permissions::SERVER_ONLY, Ignore,
    [("id", U32), ("x", F32), ("y", F32), ("type", U8), ("code", Str)]);

event_spec!(ASTEROID_IMPACT_EVENT = 3002, "AsteroidsAsteroidImpactOnColony",
    "Sent when an asteroid reaches the colony and applies its damage.",
    Permissions::SERVER_ONLY, Ignore,
    [("id", U32), ("colonyHPLeft", U32)]);

event_spec!(PLAYER_SHOOT_EVENT = 3003, "AsteroidsPlayerShootAtCode",
    "Sent when any player shoots at some char combination.",
    Permissions::OWNER_AND_GUESTS, Replicate,
    [("id", U32), ("code", Str)]);

event_spec!(PLAYER_PENALTY_EVENT = 3007, "AsteroidsPlayerPenalty",
    "Sent when a player receives a shooting timeout.",
    Permissions::SERVER_ONLY, Ignore,
    [("playerID", U32), ("timeoutDurationS", F32), ("type", Str)]);

/// Every registered spec, in id order. The single source the catalog (and
/// the TypeScript export) is built from.
pub fn all_specs() -> Vec<&'static EventSpec> {
    vec![
        &DEBUG_INFO_EVENT,
        &SERVER_CLOSING_EVENT,
        &PLAYER_JOINED_EVENT,
        &PLAYER_LEFT_EVENT,
        &LOBBY_CLOSING_EVENT,
        &ENTER_LOCATION_EVENT,
        &PLAYER_MOVE_EVENT,
        &DIFFICULTY_SELECT_EVENT,
        &DIFFICULTY_CONFIRMED_EVENT,
        &PLAYERS_DECLARE_INTENT_EVENT,
        &PLAYER_READY_EVENT,
        &PLAYER_ABORTING_MINIGAME_EVENT,
        &MINIGAME_BEGINS_EVENT,
        &PLAYER_JOIN_ACTIVITY_EVENT,
        &PLAYER_LOAD_FAILURE_EVENT,
        &MINIGAME_UNTIMELY_ABORT_EVENT,
        &PLAYER_LOAD_COMPLETE_EVENT,
        &LOAD_MINIGAME_EVENT,
        &MINIGAME_SEQUENCE_RESET_EVENT,
        &MINIGAME_WON_EVENT,
        &MINIGAME_LOST_EVENT,
        &ASTEROID_SPAWN_EVENT,
        &ASSIGN_PLAYER_DATA_EVENT,
        &ASTEROID_IMPACT_EVENT,
        &PLAYER_SHOOT_EVENT,
        &PLAYER_PENALTY_EVENT,
    ]
}

/// The id-keyed registry of every event the server understands.
pub struct EventCatalog {
    by_id: HashMap<MessageId, &'static EventSpec>,
}

impl EventCatalog {
    /// Registers every spec, failing on an id clash. An id clash is a
    /// build defect and fatal at startup.
    pub fn build() -> Result<Self, ProtocolError> {
        let mut by_id: HashMap<MessageId, &'static EventSpec> = HashMap::new();
        for spec in all_specs() {
            if let Some(existing) = by_id.insert(spec.id, spec) {
                return Err(ProtocolError::IdClash {
                    id: spec.id,
                    existing: existing.name,
                    new: spec.name,
                });
            }
        }
        Ok(Self { by_id })
    }

    /// Looks up a spec by event id.
    pub fn get(&self, id: MessageId) -> Option<&'static EventSpec> {
        self.by_id.get(&id).copied()
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// The process-wide catalog. `main` calls [`EventCatalog::build`] first so
/// an id clash fails loudly; afterwards this access cannot panic.
pub fn catalog() -> &'static EventCatalog {
    static CATALOG: LazyLock<EventCatalog> =
        LazyLock::new(|| EventCatalog::build().expect("event catalog is statically well-formed"));
    &CATALOG
}
