//! Error type shared by every nudge crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NudgeError>;

#[derive(Debug, Error)]
pub enum NudgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Persona lookup failed: {0}")]
    Persona(String),

    #[error("Experiment assignment failed: {0}")]
    Experiment(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NudgeError {
    pub fn user_not_found(user_id: &str) -> Self {
        Self::NotFound(format!("user {user_id}"))
    }
}
