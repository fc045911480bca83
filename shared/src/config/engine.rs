//! Query engine settings.

use super::{ConfigError, DatabaseConfig};
use crate::manager::BackendSelector;
use crate::query::{ValidationLimits, DEFAULT_LARGE_LIMIT};
use std::path::PathBuf;
use validator::Validate;

/// Engine configuration.
///
/// Configuration values can be set via environment variables:
/// - `VIGIL_QUERY_BACKEND`: `mock`, `sql` or `auto` (default: `auto`)
/// - `VIGIL_MOCK_DATA`: JSON file with events for the mock backend
///   (default: built-in sample events)
/// - `VIGIL_LARGE_LIMIT`: LIMIT above which validation warns (default: 10000)
/// - `VIGIL_DB_*`: see [`DatabaseConfig::from_env`]
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct EngineConfig {
    /// Backend used when a request does not name one.
    pub backend: BackendSelector,
    /// Dataset for the mock backend.
    pub mock_data: Option<PathBuf>,
    /// LIMIT above which validation warns.
    #[validate(range(min = 1, message = "Large limit threshold must be positive"))]
    pub large_limit: usize,
    /// SQL backend settings; `None` leaves the backend unregistered.
    #[validate(nested)]
    pub database: Option<DatabaseConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendSelector::Auto,
            mock_data: None,
            large_limit: DEFAULT_LARGE_LIMIT,
            database: None,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `VIGIL_QUERY_BACKEND` is not `mock`, `sql` or `auto`
    /// - `VIGIL_LARGE_LIMIT` is not a positive integer
    /// - the database settings are invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = lookup("VIGIL_QUERY_BACKEND")
            .map(|value| value.parse::<BackendSelector>())
            .transpose()?
            .unwrap_or_default();

        let mock_data = lookup("VIGIL_MOCK_DATA")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let large_limit = match lookup("VIGIL_LARGE_LIMIT") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "VIGIL_LARGE_LIMIT",
                    value,
                })?,
            None => DEFAULT_LARGE_LIMIT,
        };

        let config = Self {
            backend,
            mock_data,
            large_limit,
            database: DatabaseConfig::from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validation thresholds derived from this configuration.
    #[must_use]
    pub fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            large_limit: self.large_limit,
        }
    }
}
