//! `ClickHouse`-backed query provider.
//!
//! Queries are compiled by [`SqlCompiler`] and run over HTTP through a
//! `clickhouse::Client`. The client is created on first use and shared by
//! every later query; it pools its own connections.
//!
//! The provider interface is synchronous while the driver is async, so calls
//! are bridged with `tokio::task::block_in_place`. That needs a
//! multi-threaded Tokio runtime. Without one the query fails with an error
//! instead of panicking.

use super::{
    ensure_valid, Backend, CompiledQuery, ExecutionError, ExecutionResult, QueryProvider, Record,
    ResultPage, SqlCompiler,
};
use crate::config::DatabaseConfig;
use crate::query::fields::{insert_dotted, nest_columns};
use crate::query::{validate_ast, QueryAst, ValidationLimits, ValidationReport};
use chrono::{DateTime, Utc};
use clickhouse::Client;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Query provider that compiles queries to `ClickHouse` SQL.
pub struct SqlProvider {
    config: DatabaseConfig,
    compiler: SqlCompiler,
    limits: ValidationLimits,
    client: OnceLock<Arc<Client>>,
}

impl std::fmt::Debug for SqlProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlProvider")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .field("table", &self.compiler.table())
            .field("connected", &self.client.get().is_some())
            .finish_non_exhaustive()
    }
}

impl SqlProvider {
    /// Creates a provider; no connection is made until the first query.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            compiler: SqlCompiler::new(config.table.clone()),
            config,
            limits: ValidationLimits::default(),
            client: OnceLock::new(),
        }
    }

    /// Creates a provider around an existing client.
    #[must_use]
    pub fn with_client(config: DatabaseConfig, client: Arc<Client>) -> Self {
        Self {
            client: OnceLock::from(client),
            ..Self::new(config)
        }
    }

    /// Sets the validation thresholds.
    #[must_use]
    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the compiler used by this provider.
    #[must_use]
    pub fn compiler(&self) -> &SqlCompiler {
        &self.compiler
    }

    /// Compiles a query without running it.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or cannot be compiled.
    pub fn compile(&self, ast: &QueryAst) -> Result<CompiledQuery, ExecutionError> {
        ensure_valid(&self.validate_ast(ast))?;
        Ok(self.compiler.compile(ast, Utc::now())?)
    }

    /// Checks that the database answers a trivial query.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or no suitable
    /// runtime is available.
    pub fn ping(&self) -> Result<(), ExecutionError> {
        let client = self.client();
        Self::block_on(async move { client.query("SELECT 1").fetch_one::<u8>().await })?;
        Ok(())
    }

    fn client(&self) -> Arc<Client> {
        Arc::clone(self.client.get_or_init(|| {
            tracing::info!(
                url = %self.config.url,
                database = %self.config.database,
                "Creating ClickHouse client"
            );
            Arc::new(self.config.client())
        }))
    }

    /// Runs an async driver call to completion on the current runtime.
    fn block_on<F, T>(future: F) -> Result<T, ExecutionError>
    where
        F: Future<Output = Result<T, clickhouse::error::Error>>,
    {
        let handle = Handle::try_current()
            .map_err(|e| ExecutionError::RuntimeUnavailable(e.to_string()))?;
        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(ExecutionError::RuntimeUnavailable(
                "the SQL backend needs a multi-threaded Tokio runtime".to_string(),
            ));
        }

        tokio::task::block_in_place(|| handle.block_on(future)).map_err(|e| match e {
            clickhouse::error::Error::Network(_) => ExecutionError::Connection(e.to_string()),
            _ => ExecutionError::Database(e.to_string()),
        })
    }

    fn run(&self, ast: &QueryAst, now: DateTime<Utc>) -> Result<ResultPage, ExecutionError> {
        ensure_valid(&validate_ast(ast, &self.limits))?;
        let compiled = self.compiler.compile(ast, now)?;
        tracing::debug!(sql = %compiled.sql, "Compiled query");

        let physical_columns = compiled.physical_columns;
        let client = self.client();
        let (body, total) = Self::block_on(async move {
            let body = client
                .query(&compiled.sql)
                .fetch_bytes("JSONEachRow")?
                .collect()
                .await?;
            let total = client
                .query(&compiled.count_sql)
                .fetch_one::<u64>()
                .await?;
            Ok((body, total))
        })?;

        let data = decode_rows(&body, physical_columns)?;
        Ok(ResultPage {
            data,
            total: usize::try_from(total).unwrap_or(usize::MAX),
        })
    }
}

/// Decodes a `JSONEachRow` body into logical records.
fn decode_rows(body: &[u8], physical_columns: bool) -> Result<Vec<Record>, ExecutionError> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Record>()
        .map(|row| {
            let row = row.map_err(|e| ExecutionError::Decode(e.to_string()))?;
            if physical_columns {
                return Ok(nest_columns(row));
            }
            let mut record = Record::new();
            for (name, value) in row {
                insert_dotted(&mut record, &name, value);
            }
            Ok(record)
        })
        .collect()
}

impl QueryProvider for SqlProvider {
    fn backend(&self) -> Backend {
        Backend::Sql
    }

    fn description(&self) -> String {
        format!(
            "ClickHouse SQL at {} (database '{}', table '{}')",
            self.config.url,
            self.config.database,
            self.compiler.table()
        )
    }

    fn is_available(&self) -> bool {
        self.config.is_usable()
    }

    fn validate_ast(&self, ast: &QueryAst) -> ValidationReport {
        let mut report = validate_ast(ast, &self.limits);
        if report.valid {
            if let Err(e) = self.compiler.compile(ast, Utc::now()) {
                report.error(e.to_string());
            }
        }
        report
    }

    fn execute_ast(&self, ast: &QueryAst) -> ExecutionResult {
        let result = ExecutionResult::timed(|| self.run(ast, Utc::now()));
        tracing::debug!(
            backend = %Backend::Sql,
            tenant_id = ?ast.tenant_id,
            success = result.success,
            total = result.total,
            returned = result.data.len(),
            "Executed query"
        );
        result
    }
}
