//! Query audit trail.
//!
//! Every execution routed through the [`QueryManager`](crate::manager::QueryManager)
//! produces one [`AuditRecord`]. Records go to an [`AuditSink`]; a failing
//! sink never changes the outcome of the query.

use crate::providers::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur while recording an audit entry.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink cannot accept records.
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    /// Failed to acquire lock on the sink.
    #[error("Failed to acquire lock on audit sink")]
    LockError,
}

/// One executed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Query identifier, shared with the response envelope.
    pub query_id: String,
    /// User who ran the query.
    pub user_id: Option<String>,
    /// Tenant the query was scoped to.
    pub tenant_id: Option<String>,
    /// Backend that served the query.
    pub backend: Backend,
    /// Whether the query ran.
    pub success: bool,
    /// Execution time in seconds.
    pub execution_time: f64,
    /// Rows returned after pagination.
    pub result_count: usize,
    /// When the query finished.
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit records.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait AuditSink: Send + Sync {
    /// Records one executed query.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be stored.
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes audit records as structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "vigil::audit",
            query_id = %record.query_id,
            user_id = ?record.user_id,
            tenant_id = ?record.tenant_id,
            backend = %record.backend,
            success = record.success,
            execution_time = record.execution_time,
            result_count = record.result_count,
            "Query executed"
        );
        Ok(())
    }
}

/// Keeps audit records in memory.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn records(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.read().map_err(|_| AuditError::LockError)?;
        Ok(records.clone())
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut records = self.records.write().map_err(|_| AuditError::LockError)?;
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(query_id: &str) -> AuditRecord {
        AuditRecord {
            query_id: query_id.to_string(),
            user_id: Some("analyst".to_string()),
            tenant_id: Some("tenant-alpha".to_string()),
            backend: Backend::Mock,
            success: true,
            execution_time: 0.002,
            result_count: 3,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_in_memory_sink_keeps_order() {
        let sink = InMemoryAuditSink::new();
        sink.record(&sample("q1")).unwrap();
        sink.record(&sample("q2")).unwrap();

        let ids: Vec<String> = sink
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.query_id)
            .collect();
        assert_eq!(ids, vec!["q1", "q2"]);
    }

    #[test]
    fn test_in_memory_sink_clones_share_storage() {
        let sink = InMemoryAuditSink::new();
        let clone = sink.clone();
        clone.record(&sample("q1")).unwrap();
        assert_eq!(sink.records().unwrap().len(), 1);
    }

    #[test]
    fn test_tracing_sink_accepts_records() {
        assert!(TracingAuditSink.record(&sample("q1")).is_ok());
    }

    #[test]
    fn test_audit_record_serialization() {
        let json = serde_json::to_value(sample("q1")).unwrap();
        assert_eq!(json["backend"], "mock");
        assert_eq!(json["result_count"], 3);
    }
}
