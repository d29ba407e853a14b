//! Outbound integration with the main game backend.
//!
//! The lobby server calls out for two things: minigame settings when a
//! controller is constructed, and colony closure when a lobby dies. The
//! [`Backend`] trait is the seam — production wires in [`HttpBackend`],
//! tests and local development use [`FixedBackend`].

mod error;
mod fixed;
mod http;

pub use error::BackendError;
pub use fixed::FixedBackend;
pub use http::HttpBackend;

use std::future::Future;

use outpost_protocol::{ClientId, ColonyId};
use serde::Deserialize;

/// Minigame settings as served by the main backend.
///
/// Both blobs are opaque JSON here; only the minigame that asked for them
/// knows their shape. `overwriting_settings` carries difficulty-specific
/// values that replace the base settings field-wise.
#[derive(Debug, Clone, Deserialize)]
pub struct MinigameSettings {
    pub settings: serde_json::Value,
    #[serde(rename = "overwritingSettings", default)]
    pub overwriting_settings: Option<serde_json::Value>,
}

/// The main backend's surface as seen from this server.
pub trait Backend: Send + Sync + 'static {
    /// Fetches the settings blob for a minigame at a given difficulty.
    fn minigame_settings(
        &self,
        minigame_id: u32,
        difficulty_id: u32,
    ) -> impl Future<Output = Result<MinigameSettings, BackendError>> + Send;

    /// Reports that a colony's lobby has closed.
    fn close_colony(
        &self,
        colony_id: ColonyId,
        owner_id: ClientId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
