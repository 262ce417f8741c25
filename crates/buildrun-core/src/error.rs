//! Core domain errors.

use thiserror::Error;

/// Core domain errors for buildrun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A task configuration is missing required fields.
    #[error("Invalid task configuration: {0}")]
    InvalidTaskConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
