//! Error types for the backend integration.

/// Errors from calls to the main backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request never completed (connection refused, timeout, DNS).
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-200 status.
    #[error("backend answered with status {0}")]
    Status(u16),

    /// The response body did not parse as the expected JSON shape.
    #[error("backend response malformed: {0}")]
    Decode(String),

    /// Settings for the requested minigame/difficulty are not available.
    #[error("minigame settings unavailable: {0}")]
    SettingsUnavailable(String),
}
