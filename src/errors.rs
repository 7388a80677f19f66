// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvianError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid cron expression '{expression}': {reason}")]
    CronExpression { expression: String, reason: String },

    #[error("Queue store error: {0}")]
    QueueStore(String),

    #[error("Worker {worker} error: {reason}")]
    Worker { worker: u32, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<redis::RedisError> for AvianError {
    fn from(err: redis::RedisError) -> Self {
        AvianError::QueueStore(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AvianError>;
