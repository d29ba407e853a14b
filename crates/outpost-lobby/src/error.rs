//! Error types for the lobby layer.

use outpost_protocol::{ClientId, LobbyId};

/// Why a join attempt was refused. Each variant maps to a distinct HTTP
/// status on the admission surface.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// No lobby with this id exists.
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// The lobby is shutting down and no longer admits clients.
    #[error("lobby {0} is closing")]
    Closing(LobbyId),

    /// A client with this id is already connected to the lobby.
    #[error("client {0} is already in lobby {1}")]
    AlreadyInLobby(ClientId, LobbyId),

    /// The requested client id is the reserved server id.
    #[error("client id {0} is reserved for the server")]
    ReservedId(ClientId),
}

/// Errors surfaced by lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The manager has been shut down and creates no further lobbies.
    #[error("lobby manager is no longer accepting new lobbies")]
    ManagerClosed,

    /// One or more clients could not be written to during a broadcast.
    /// The caller logs and continues; clients are not torn down
    /// mid-broadcast.
    #[error("{0:?} did not receive the broadcast")]
    UnresponsiveClients(Vec<ClientId>),
}
