//! A canned backend for tests and offline development.

use std::sync::Mutex;

use outpost_protocol::{ClientId, ColonyId};

use crate::{Backend, BackendError, MinigameSettings};

/// Serves a fixed settings blob and records colony closures instead of
/// calling anywhere.
pub struct FixedBackend {
    settings: serde_json::Value,
    overwriting: Option<serde_json::Value>,
    closed: Mutex<Vec<(ColonyId, ClientId)>>,
}

impl FixedBackend {
    pub fn new(settings: serde_json::Value) -> Self {
        Self {
            settings,
            overwriting: None,
            closed: Mutex::new(Vec::new()),
        }
    }

    /// Adds an overwriting-settings blob on top of the base settings.
    pub fn with_overwriting(mut self, overwriting: serde_json::Value) -> Self {
        self.overwriting = Some(overwriting);
        self
    }

    /// The colony closures reported so far, in call order.
    pub fn closed_colonies(&self) -> Vec<(ColonyId, ClientId)> {
        self.closed.lock().expect("closed list lock poisoned").clone()
    }
}

impl Backend for FixedBackend {
    async fn minigame_settings(
        &self,
        _minigame_id: u32,
        _difficulty_id: u32,
    ) -> Result<MinigameSettings, BackendError> {
        Ok(MinigameSettings {
            settings: self.settings.clone(),
            overwriting_settings: self.overwriting.clone(),
        })
    }

    async fn close_colony(
        &self,
        colony_id: ColonyId,
        owner_id: ClientId,
    ) -> Result<(), BackendError> {
        self.closed
            .lock()
            .expect("closed list lock poisoned")
            .push((colony_id, owner_id));
        Ok(())
    }
}
