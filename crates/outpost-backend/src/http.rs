//! The reqwest implementation used in production.

use std::time::Duration;

use outpost_protocol::{ClientId, ColonyId};
use serde::Serialize;

use crate::{Backend, BackendError, MinigameSettings};

#[derive(Serialize)]
struct CloseColonyRequest {
    #[serde(rename = "playerId")]
    player_id: u32,
}

/// HTTP client for the main backend's REST surface.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Builds a client against `https://{host}:{port}/api/v1`.
    ///
    /// The main backend runs with self-signed certificates inside the
    /// deployment network, so certificate verification is off.
    pub fn new(host: &str, port: u16) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            base_url: format!("https://{host}:{port}/api/v1"),
            client,
        })
    }
}

impl Backend for HttpBackend {
    async fn minigame_settings(
        &self,
        minigame_id: u32,
        difficulty_id: u32,
    ) -> Result<MinigameSettings, BackendError> {
        let url = format!(
            "{}/minigame/minimized?minigame={minigame_id}&difficulty={difficulty_id}",
            self.base_url
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        response
            .json::<MinigameSettings>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn close_colony(
        &self,
        colony_id: ColonyId,
        owner_id: ClientId,
    ) -> Result<(), BackendError> {
        let url = format!("{}/colony/{}/close", self.base_url, colony_id.0);
        let response = self
            .client
            .post(&url)
            .json(&CloseColonyRequest { player_id: owner_id.0 })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        tracing::debug!(%colony_id, %owner_id, "colony closure reported");
        Ok(())
    }
}
