//! Query manager.
//!
//! The manager owns the registered providers, picks one per request, stamps
//! the response envelope and writes the audit trail.

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::config::EngineConfig;
use crate::providers::{
    Backend, ExecutionResult, MockDataError, MockProvider, QueryProvider, Record, SqlProvider,
};
use crate::query::{parse, QueryAst, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Backend selection
// ============================================================================

/// Which backend serves requests that do not name one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelector {
    /// Always the mock backend.
    Mock,
    /// Always the SQL backend.
    Sql,
    /// SQL when registered and available, otherwise mock.
    #[default]
    Auto,
}

impl std::fmt::Display for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::Sql => write!(f, "sql"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Error parsing a backend selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown backend selector '{0}': expected 'mock', 'sql' or 'auto'")]
pub struct UnknownSelector(pub String);

impl FromStr for BackendSelector {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            other => other
                .parse::<Backend>()
                .map(Self::from)
                .map_err(|_| UnknownSelector(s.to_string())),
        }
    }
}

impl From<Backend> for BackendSelector {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Mock => Self::Mock,
            Backend::Sql => Self::Sql,
        }
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// Response envelope for one executed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// True if the query ran.
    pub success: bool,
    /// Result rows after offset and limit.
    pub data: Vec<Record>,
    /// Number of rows before offset and limit.
    pub total: usize,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
    /// Query identifier, generated when the request had none.
    pub query_id: String,
    /// Backend that served the query.
    pub backend: Backend,
    /// When the query finished.
    pub timestamp: DateTime<Utc>,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn from_result(result: ExecutionResult, query_id: String, backend: Backend) -> Self {
        Self {
            success: result.success,
            data: result.data,
            total: result.total,
            execution_time: result.execution_time,
            query_id,
            backend,
            timestamp: Utc::now(),
            error: result.error,
        }
    }
}

/// Describes one registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Backend identifier.
    pub backend: Backend,
    /// Whether the backend can currently serve queries.
    pub available: bool,
    /// Human-readable description of the data source.
    pub description: String,
    /// Whether requests without an explicit backend go here.
    pub is_default: bool,
}

// ============================================================================
// Manager
// ============================================================================

/// Routes queries to providers.
///
/// Cloning is cheap; providers and the audit sink are shared.
#[derive(Clone)]
pub struct QueryManager {
    providers: BTreeMap<Backend, Arc<dyn QueryProvider>>,
    default_backend: BackendSelector,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for QueryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryManager")
            .field("backends", &self.providers.keys().collect::<Vec<_>>())
            .field("default_backend", &self.default_backend)
            .finish_non_exhaustive()
    }
}

impl Default for QueryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryManager {
    /// Creates a manager with no providers and a tracing audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            default_backend: BackendSelector::Auto,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Registers a provider under its own backend, replacing any previous one.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn QueryProvider>) -> Self {
        self.providers.insert(provider.backend(), provider);
        self
    }

    /// Sets the backend used when a request does not name one.
    #[must_use]
    pub fn with_default_backend(mut self, selector: BackendSelector) -> Self {
        self.default_backend = selector;
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Builds a manager from configuration.
    ///
    /// The mock backend is always registered. The SQL backend is registered
    /// when database settings are present; no connection is made here.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured mock dataset cannot be loaded.
    pub fn from_config(config: &EngineConfig) -> Result<Self, MockDataError> {
        let limits = config.limits();
        let mock = match &config.mock_data {
            Some(path) => MockProvider::from_json_file(path)?,
            None => MockProvider::with_sample_data(),
        };

        let mut manager = Self::new()
            .with_default_backend(config.backend)
            .with_provider(Arc::new(mock.with_limits(limits)));

        if let Some(database) = &config.database {
            manager = manager.with_provider(Arc::new(
                SqlProvider::new(database.clone()).with_limits(limits),
            ));
        }

        tracing::info!(
            backends = ?manager.providers.keys().collect::<Vec<_>>(),
            default_backend = %config.backend,
            "Query manager ready"
        );
        Ok(manager)
    }

    /// Picks the backend for a request.
    ///
    /// An explicit request wins, then the configured default. `Auto` prefers
    /// SQL when it is registered and available.
    #[must_use]
    pub fn resolve_backend(&self, requested: Option<Backend>) -> Backend {
        if let Some(backend) = requested {
            return backend;
        }
        match self.default_backend {
            BackendSelector::Mock => Backend::Mock,
            BackendSelector::Sql => Backend::Sql,
            BackendSelector::Auto => match self.providers.get(&Backend::Sql) {
                Some(sql) if sql.is_available() => Backend::Sql,
                _ => Backend::Mock,
            },
        }
    }

    fn provider(&self, backend: Backend) -> Option<&Arc<dyn QueryProvider>> {
        self.providers.get(&backend)
    }

    /// Executes a query and records it in the audit trail.
    ///
    /// Never fails: errors are reported in the envelope.
    pub fn execute(
        &self,
        ast: &QueryAst,
        user_id: Option<&str>,
        backend: Option<Backend>,
    ) -> QueryResponse {
        let mut ast = ast.clone();
        let query_id = ast
            .query_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let backend = self.resolve_backend(backend);

        let result = match self.provider(backend) {
            Some(provider) => {
                let started = Instant::now();
                match catch_unwind(AssertUnwindSafe(|| provider.execute_ast(&ast))) {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(query_id = %query_id, backend = %backend, "Provider panicked");
                        ExecutionResult::failed(
                            "internal error: provider panicked",
                            started.elapsed().as_secs_f64(),
                        )
                    }
                }
            }
            None => ExecutionResult::failed(format!("backend '{backend}' is not configured"), 0.0),
        };
        let response = QueryResponse::from_result(result, query_id, backend);

        tracing::debug!(
            query_id = %response.query_id,
            backend = %backend,
            success = response.success,
            total = response.total,
            "Query finished"
        );

        let record = AuditRecord {
            query_id: response.query_id.clone(),
            user_id: user_id.map(str::to_string),
            tenant_id: ast.tenant_id.clone(),
            backend,
            success: response.success,
            execution_time: response.execution_time,
            result_count: response.data.len(),
            timestamp: response.timestamp,
        };
        if let Err(e) = self.audit.record(&record) {
            tracing::warn!(query_id = %record.query_id, error = %e, "Failed to write audit record");
        }

        response
    }

    /// Parses query text for a tenant and executes it.
    pub fn execute_text(
        &self,
        text: &str,
        tenant_id: Option<&str>,
        user_id: Option<&str>,
        backend: Option<Backend>,
    ) -> QueryResponse {
        self.execute(&parse(text, tenant_id), user_id, backend)
    }

    /// Validates a query against the backend that would run it.
    #[must_use]
    pub fn validate(&self, ast: &QueryAst, backend: Option<Backend>) -> ValidationReport {
        let backend = self.resolve_backend(backend);
        match self.provider(backend) {
            Some(provider) => provider.validate_ast(ast),
            None => {
                let mut report = ValidationReport::new();
                report.error(format!("backend '{backend}' is not configured"));
                report
            }
        }
    }

    /// Describes every registered backend.
    #[must_use]
    pub fn list_backends(&self) -> Vec<BackendInfo> {
        self.providers
            .keys()
            .filter_map(|backend| self.describe_backend(*backend))
            .collect()
    }

    /// Describes one backend, or `None` if it is not registered.
    #[must_use]
    pub fn describe_backend(&self, backend: Backend) -> Option<BackendInfo> {
        let provider = self.provider(backend)?;
        Some(BackendInfo {
            backend,
            available: provider.is_available(),
            description: provider.description(),
            is_default: self.resolve_backend(None) == backend,
        })
    }
}
