//! Minigame controllers.
//!
//! A controller goes through four hooks: a blocking rising edge before the
//! lobby commits to `InMinigame`, a non-blocking loop start, a message
//! hook for in-game client events, and a blocking falling edge after the
//! loop ends for any reason. Controllers run as a single actor task that
//! selects between its tick interval and its message channel, so their
//! game state needs no locks.
//!
//! Controllers are registered by minigame id in [`instantiate`]; adding
//! one is a new module plus a match arm, with no lobby changes.

pub mod asteroids;
pub mod charcode;

use std::sync::Arc;

use outpost_backend::Backend;
use outpost_protocol::payloads::DifficultyConfirmed;
use outpost_transport::Connection;
use tokio::sync::mpsc;

use crate::lobby::{Lobby, PostProcessEntry};

/// Errors from minigame instantiation and message handling.
#[derive(Debug, thiserror::Error)]
pub enum MinigameError {
    /// The confirmed difficulty names a minigame nobody implements.
    #[error("minigame with id {0} not found")]
    UnknownMinigame(u32),

    /// The settings service could not provide usable settings.
    #[error("minigame settings unavailable: {0}")]
    SettingsUnavailable(String),

    /// A char-code pool cannot produce the requested number of codes.
    #[error("char code pool too small: {requested} codes requested, {permutations} possible")]
    PoolTooSmall { requested: u32, permutations: f64 },

    /// The controller's rising edge failed; the minigame never started.
    #[error("minigame rising edge failed: {0}")]
    RisingEdge(String),

    /// The controller actor is gone or saturated.
    #[error("minigame controller unavailable")]
    ControllerUnavailable,
}

/// Handle through which the lobby feeds a running controller. Dropping it
/// closes the controller's channel and winds the loop down.
pub(crate) struct MinigameHandle<C> {
    tx: mpsc::Sender<PostProcessEntry<C>>,
}

impl<C> MinigameHandle<C> {
    pub(crate) fn new(tx: mpsc::Sender<PostProcessEntry<C>>) -> Self {
        Self { tx }
    }

    /// Hands an in-game message to the controller. Non-blocking: the
    /// post-processor must not wedge behind a busy controller.
    pub(crate) fn forward(&self, entry: PostProcessEntry<C>) -> Result<(), MinigameError> {
        self.tx
            .try_send(entry)
            .map_err(|_| MinigameError::ControllerUnavailable)
    }
}

/// Instantiates the controller for the confirmed minigame, runs its
/// rising edge (blocking) and starts its loop.
pub(crate) async fn instantiate<C: Connection, B: Backend>(
    lobby: Arc<Lobby<C, B>>,
    difficulty: &DifficultyConfirmed,
) -> Result<MinigameHandle<C>, MinigameError> {
    match difficulty.minigame_id {
        asteroids::ASTEROIDS_MINIGAME_ID => asteroids::launch(lobby, difficulty).await,
        other => Err(MinigameError::UnknownMinigame(other)),
    }
}
