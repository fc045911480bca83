//! `ClickHouse` connection settings.

use super::ConfigError;
use crate::providers::DEFAULT_TABLE;
use clickhouse::Client;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Database configuration loaded from environment variables.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// `ClickHouse` HTTP URL (e.g., <http://localhost:8123>)
    #[validate(url(message = "Database URL must be a valid URL"))]
    pub url: String,
    /// Database name to use
    #[validate(length(min = 1, message = "Database name cannot be empty"))]
    pub database: String,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    #[serde(skip_serializing)]
    pub password: String,
    /// Table holding security events
    #[validate(length(min = 1, message = "Table name cannot be empty"))]
    pub table: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("table", &self.table)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "vigil".to_string(),
            user: "default".to_string(),
            password: String::new(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables.
    ///
    /// The SQL backend is only configured when `VIGIL_DB_URL` is set, so this
    /// returns `None` otherwise.
    ///
    /// # Environment Variables
    ///
    /// - `VIGIL_DB_URL`: Database URL (required to enable the SQL backend)
    /// - `VIGIL_DB_NAME`: Database name (default: "vigil")
    /// - `VIGIL_DB_USER`: Database user (default: "default")
    /// - `VIGIL_DB_PASSWORD`: Database password (default: empty)
    /// - `VIGIL_DB_TABLE`: Event table (default: "`security_events`")
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`DatabaseConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(url) = lookup("VIGIL_DB_URL").filter(|url| !url.trim().is_empty()) else {
            return Ok(None);
        };

        let defaults = Self::default();
        let config = Self {
            url,
            database: lookup("VIGIL_DB_NAME").unwrap_or(defaults.database),
            user: lookup("VIGIL_DB_USER").unwrap_or(defaults.user),
            password: lookup("VIGIL_DB_PASSWORD").unwrap_or(defaults.password),
            table: lookup("VIGIL_DB_TABLE").unwrap_or(defaults.table),
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Returns true if the configuration passes validation.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.validate().is_ok()
    }

    /// Builds a client for this configuration.
    ///
    /// No connection is made until the first query. 64-bit integers are
    /// requested unquoted so they decode as JSON numbers.
    #[must_use]
    pub fn client(&self) -> Client {
        Client::default()
            .with_url(&self.url)
            .with_database(&self.database)
            .with_user(&self.user)
            .with_password(&self.password)
            .with_option("output_format_json_quote_64bit_integers", "0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_database_config_requires_url() {
        assert_eq!(DatabaseConfig::from_lookup(lookup(&[])).unwrap(), None);
        assert_eq!(
            DatabaseConfig::from_lookup(lookup(&[("VIGIL_DB_URL", " ")])).unwrap(),
            None
        );
    }

    #[test]
    fn test_database_config_with_defaults() {
        let config = DatabaseConfig::from_lookup(lookup(&[("VIGIL_DB_URL", "http://ch:8123")]))
            .unwrap()
            .unwrap();

        assert_eq!(config.url, "http://ch:8123");
        assert_eq!(config.database, "vigil");
        assert_eq!(config.user, "default");
        assert_eq!(config.table, "security_events");
    }

    #[test]
    fn test_database_config_with_custom_values() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("VIGIL_DB_URL", "http://ch:8123"),
            ("VIGIL_DB_NAME", "soc"),
            ("VIGIL_DB_USER", "reader"),
            ("VIGIL_DB_PASSWORD", "secret"),
            ("VIGIL_DB_TABLE", "ocsf_events"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.database, "soc");
        assert_eq!(config.user, "reader");
        assert_eq!(config.password, "secret");
        assert_eq!(config.table, "ocsf_events");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_database_config_rejects_invalid_url() {
        let result = DatabaseConfig::from_lookup(lookup(&[("VIGIL_DB_URL", "not a url")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
