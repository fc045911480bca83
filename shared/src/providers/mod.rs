//! Query providers.
//!
//! A provider executes a [`QueryAst`] against one storage backend. Every
//! provider applies the same filtering semantics (see
//! [`crate::query::semantics`]) so a query returns the same rows whichever
//! backend serves it.
//!
//! - [`MockProvider`] evaluates queries over an in-memory dataset
//! - [`SqlProvider`] compiles queries to `ClickHouse` SQL

mod compiler;
mod mock;
mod sql;

pub use compiler::{CompileError, CompiledQuery, SqlCompiler, DEFAULT_TABLE};
pub use mock::{MockDataError, MockProvider};
pub use sql::SqlProvider;

use crate::query::{QueryAst, TimeRangeError, ValidationReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;

/// One result row or source event.
///
/// Dotted logical fields are stored as nested objects.
pub type Record = serde_json::Map<String, Value>;

/// Identifies a provider implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory reference executor.
    Mock,
    /// `ClickHouse` SQL executor.
    Sql,
}

impl Backend {
    /// Every backend, in registry order.
    pub const ALL: [Self; 2] = [Self::Mock, Self::Sql];
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::Sql => write!(f, "sql"),
        }
    }
}

/// Error parsing a backend name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown backend '{0}': expected 'mock' or 'sql'")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "sql" | "clickhouse" => Ok(Self::Sql),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Errors raised while executing a query.
///
/// Providers never return these to callers directly; they are rendered into
/// [`ExecutionResult::error`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The query failed validation.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The time range could not be resolved.
    #[error("invalid time range: {0}")]
    TimeRange(#[from] TimeRangeError),

    /// The query could not be compiled to SQL.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// The database client could not be created or reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The database rejected or failed the query.
    #[error("database error: {0}")]
    Database(String),

    /// No runtime is available to drive the database client.
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A result row could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Rows and paging information produced by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True if the query ran.
    pub success: bool,
    /// Result rows after offset and limit.
    pub data: Vec<Record>,
    /// Number of rows before offset and limit.
    pub total: usize,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rows produced by a successful execution, before timing is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Rows after offset and limit.
    pub data: Vec<Record>,
    /// Rows before offset and limit.
    pub total: usize,
}

impl ExecutionResult {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(page: ResultPage, execution_time: f64) -> Self {
        Self {
            success: true,
            data: page.data,
            total: page.total,
            execution_time,
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            total: 0,
            execution_time,
            error: Some(error.into()),
        }
    }

    /// Times `run` and folds its outcome into a result.
    pub fn timed(run: impl FnOnce() -> Result<ResultPage, ExecutionError>) -> Self {
        let started = Instant::now();
        let outcome = run();
        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(page) => Self::succeeded(page, elapsed),
            Err(e) => Self::failed(e.to_string(), elapsed),
        }
    }
}

/// Trait for query execution backends.
///
/// Implementations must be thread-safe (`Send + Sync`) so one instance can be
/// shared by every request. Neither method panics or returns an error: all
/// failures are reported through the returned value.
pub trait QueryProvider: Send + Sync {
    /// Which backend this provider implements.
    fn backend(&self) -> Backend;

    /// Human-readable description of the provider and its data source.
    fn description(&self) -> String;

    /// Returns true if the provider can currently serve queries.
    fn is_available(&self) -> bool;

    /// Checks whether a query can run on this backend.
    fn validate_ast(&self, ast: &QueryAst) -> ValidationReport;

    /// Executes a query.
    fn execute_ast(&self, ast: &QueryAst) -> ExecutionResult;
}

/// Fails with the validation errors when the report is invalid.
fn ensure_valid(report: &ValidationReport) -> Result<(), ExecutionError> {
    if report.valid {
        Ok(())
    } else {
        Err(ExecutionError::InvalidQuery(report.error_summary()))
    }
}

/// Applies offset and limit to an already sorted row set.
fn paginate(rows: Vec<Record>, offset: Option<usize>, limit: Option<usize>) -> ResultPage {
    let total = rows.len();
    let data = rows
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    ResultPage { data, total }
}
