use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

/// Library error type for the feed and auth surfaces.
///
/// Per-event filtering never produces one of these: classification is
/// infallible and resolves every ambiguity to exclusion. Startup wiring
/// reports through `anyhow` instead.
#[derive(Error, Debug)]
pub enum RelayError {
    // ===== Transport Errors =====
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    // ===== Authentication & Authorization Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::WebSocket(err.to_string())
    }
}

impl RelayError {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        RelayError::Auth(msg.into())
    }
}
