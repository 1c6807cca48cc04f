// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate job: {0}")]
    DuplicateJob(String),

    #[error("Unknown job '{missing}' referenced by '{referenced_by}'")]
    UnknownJob {
        missing: String,
        referenced_by: String,
    },

    #[error("Cycle detected in job graph: {0}")]
    Cycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Results file error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarnessError {
    /// Whether this error means the job graph is not a valid schedule.
    ///
    /// These abort the run before any process is spawned.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarnessError::ConfigError(_)
                | HarnessError::DuplicateJob(_)
                | HarnessError::UnknownJob { .. }
                | HarnessError::Cycle(_)
                | HarnessError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HarnessError>;
