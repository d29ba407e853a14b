//! Lobby layer for the Outpost session server.
//!
//! Groups clients into per-colony lobbies, routes and replicates their
//! typed binary messages, and drives each lobby through the minigame
//! orchestration state machine (roaming → participant opt-in → readiness
//! → load-in → in-minigame → cleanup).

mod client;
mod error;
mod lobby;
mod manager;
pub mod minigame;
mod tracker;

pub use client::{Client, ClientState};
pub use error::{JoinError, LobbyError};
pub use lobby::{Lobby, PostProcessEntry};
pub use manager::LobbyManager;
pub use minigame::MinigameError;
pub use tracker::{ActivityTracker, LobbyPhase};
