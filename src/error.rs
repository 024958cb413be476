//! Domain error type shared by the library, the CLI and the HTTP layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewError>;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Every upstream source in the strategy list failed.
    #[error("no review source available: {}", attempts.join("; "))]
    SourceUnavailable {
        /// One `"<source>: <reason>"` entry per attempted source, in order.
        attempts: Vec<String>,
    },

    #[error("no reviews stored for app {app_id} ({country})")]
    InsufficientData { app_id: String, country: String },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReviewError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn insufficient_data(app_id: &str, country: &str) -> Self {
        Self::InsufficientData {
            app_id: app_id.to_string(),
            country: country.to_string(),
        }
    }
}
