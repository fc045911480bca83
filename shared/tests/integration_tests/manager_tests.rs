//! Integration tests for the query manager.
//!
//! Tests cover:
//! - Backend selection and discovery
//! - Response envelopes and query ids
//! - Audit records, including a failing audit sink
//! - Loading the mock dataset from configuration

use shared::audit::{AuditError, AuditRecord, AuditSink};
use shared::config::EngineConfig;
use shared::manager::{BackendSelector, QueryManager};
use shared::providers::Backend;
use shared::query::{Condition, QueryAst, TimeRange};
use std::sync::Arc;

use super::common::{mock_provider, test_manager, uids};

struct FailingSink;

impl AuditSink for FailingSink {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit store offline".to_string()))
    }
}

fn scenario() -> QueryAst {
    QueryAst::for_tenant("t1")
        .with_where(Condition::equals("severity", "high"))
        .with_time_range(TimeRange::last("1h"))
        .with_limit(10)
}

#[test]
fn test_execute_text_through_manager() {
    let (manager, sink) = test_manager();
    let response = manager.execute_text("severity = \"high\"", Some("t1"), Some("analyst"), None);

    assert!(response.success);
    assert_eq!(response.backend, Backend::Mock);
    assert_eq!(response.total, 3);

    let records = sink.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query_id, response.query_id);
    assert_eq!(records[0].tenant_id.as_deref(), Some("t1"));
    assert_eq!(records[0].user_id.as_deref(), Some("analyst"));
    assert!(records[0].success);
}

#[test]
fn test_each_execution_gets_a_new_query_id() {
    let (manager, sink) = test_manager();
    let first = manager.execute(&scenario(), None, None);
    let second = manager.execute(&scenario(), None, None);

    assert_ne!(first.query_id, second.query_id);
    assert_eq!(uids(&first.data), uids(&second.data));
    assert_eq!(sink.records().unwrap().len(), 2);
}

#[test]
fn test_failing_audit_sink_leaves_envelope_unchanged() {
    let (manager, _sink) = test_manager();
    let failing = manager.clone().with_audit_sink(Arc::new(FailingSink));

    let ast = scenario().with_query_id("fixed");
    let expected = manager.execute(&ast, None, None);
    let actual = failing.execute(&ast, None, None);

    assert!(actual.success);
    assert_eq!(actual.query_id, "fixed");
    assert_eq!(actual.total, expected.total);
    assert_eq!(actual.data, expected.data);
    assert_eq!(actual.error, None);
}

#[test]
fn test_unconfigured_backend_yields_error_envelope() {
    let (manager, sink) = test_manager();
    let response = manager.execute(&scenario(), Some("analyst"), Some(Backend::Sql));

    assert!(!response.success);
    assert!(response.data.is_empty());
    assert_eq!(
        response.error.as_deref(),
        Some("backend 'sql' is not configured")
    );
    assert!(!sink.records().unwrap()[0].success);

    let forced = manager.with_default_backend(BackendSelector::Sql);
    assert!(!forced.execute(&scenario(), None, None).success);
}

#[test]
fn test_invalid_query_yields_error_envelope() {
    let (manager, _sink) = test_manager();
    let response = manager.execute(&QueryAst::for_tenant(""), None, None);

    assert!(!response.success);
    assert!(response
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("invalid query:")));
}

#[test]
fn test_backend_discovery() {
    let (manager, _sink) = test_manager();
    let backends = manager.list_backends();

    assert_eq!(backends.len(), 1);
    assert_eq!(backends[0].backend, Backend::Mock);
    assert!(backends[0].available);
    assert!(backends[0].is_default);
    assert!(backends[0].description.contains("7 events"));
    assert!(manager.describe_backend(Backend::Sql).is_none());
}

#[test]
fn test_manager_from_config_with_mock_file() {
    let path = std::env::temp_dir().join(format!("vigil-fixture-{}.json", uuid::Uuid::new_v4()));
    let records: Vec<_> = super::common::fixture_records();
    std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

    let config = EngineConfig {
        mock_data: Some(path.clone()),
        database: Some(shared::config::DatabaseConfig::default()),
        backend: BackendSelector::Mock,
        ..EngineConfig::default()
    };
    let manager = QueryManager::from_config(&config).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(manager.list_backends().len(), 2);
    assert_eq!(manager.resolve_backend(None), Backend::Mock);

    let response = manager.execute(&scenario(), None, None);
    assert!(response.success);
    assert_eq!(response.total, 3);
}

#[test]
fn test_manager_validate_uses_selected_backend() {
    let (manager, _sink) = test_manager();
    let report = manager.validate(&scenario(), None);
    assert!(report.valid);
    assert!(report.errors.is_empty());

    let report = manager.validate(&scenario(), Some(Backend::Sql));
    assert!(!report.valid);
    assert_eq!(report.errors, vec!["backend 'sql' is not configured"]);

    assert_eq!(mock_provider().len(), 7);
}
