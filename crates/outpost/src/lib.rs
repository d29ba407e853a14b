//! # Outpost
//!
//! Multiplayer session server for a colony minigame game. Clients connect
//! over websockets, are grouped into per-colony lobbies with one owner,
//! and exchange typed binary messages that the server routes, replicates
//! and drives through the minigame orchestration state machine.

pub mod api;
pub mod config;
pub mod tools;

/// Re-exports everything the binary and integration tests need.
pub mod prelude {
    pub use crate::api::router;
    pub use crate::config::{Cli, RuntimeMode, Tool};

    pub use outpost_backend::{Backend, BackendError, FixedBackend, HttpBackend};
    pub use outpost_lobby::{
        ActivityTracker, Client, JoinError, Lobby, LobbyError, LobbyManager, LobbyPhase,
    };
    pub use outpost_protocol::{
        catalog, deserialize, extract_header, serialize, ClientId, ColonyId, EventCatalog,
        LobbyId, ProtocolError, Role, WireEncoding, SERVER_ID,
    };
    pub use outpost_transport::{Connection, Frame, TransportError, WsConnection};
}
