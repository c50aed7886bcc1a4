use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// `connect` was called for a tenant other than the one currently bound.
    /// Switching tenants requires an explicit `disconnect` first.
    #[error("transport is bound to tenant '{active}', cannot connect as '{requested}'")]
    TenantConflict { active: String, requested: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
