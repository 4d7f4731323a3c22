use thiserror::Error;

use crate::models::notification::Channel;

/// Failure taxonomy for the dispatch pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no publisher registered for channel {0}")]
    UnsupportedChannel(Channel),

    #[error("no delivery strategy registered for method {0}")]
    UnsupportedMethod(String),

    #[error("notification not found: {0}")]
    NotFound(i64),

    #[error("broker publish failed: {0}")]
    Transport(String),

    #[error("qr image exceeds {limit} bytes after compression ladder: {actual} bytes")]
    SizeExceeded { limit: usize, actual: usize },

    #[error("qr encoding failed: {0}")]
    Encoding(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DispatchError {
    /// Configuration errors mean a channel or method is enabled in data but
    /// has no adapter registered. They should fail fast, not be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::UnsupportedChannel(_) | DispatchError::UnsupportedMethod(_)
        )
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(e: sqlx::Error) -> Self {
        DispatchError::Storage(e.to_string())
    }
}

impl From<lapin::Error> for DispatchError {
    fn from(e: lapin::Error) -> Self {
        DispatchError::Transport(e.to_string())
    }
}

impl From<image::ImageError> for DispatchError {
    fn from(e: image::ImageError) -> Self {
        DispatchError::Encoding(e.to_string())
    }
}
