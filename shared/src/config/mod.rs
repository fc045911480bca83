//! Configuration module for Vigil.
//!
//! Settings come from `VIGIL_*` environment variables with defaults for
//! everything except the database URL.

mod database;
mod engine;

pub use database::DatabaseConfig;
pub use engine::EngineConfig;

use crate::manager::UnknownSelector;
use thiserror::Error;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable holds a value of the wrong shape.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The backend selector is not recognised.
    #[error(transparent)]
    UnknownBackend(#[from] UnknownSelector),

    /// Validation failed with details.
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
