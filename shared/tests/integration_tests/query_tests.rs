//! Integration tests for query execution on the in-memory backend.
//!
//! Tests cover:
//! - Tenant scoping and time ranges
//! - Parsing text queries and executing the result
//! - Pagination boundaries
//! - Multi-key ordering
//! - NOT with more than one child

use shared::providers::QueryProvider;
use shared::query::{
    parse, ComparisonOperator, Condition, Expression, Literal, LogicalExpression,
    LogicalOperator, QueryAst, SortDirection, TimeRange,
};

use super::common::{mock_provider, uids};

fn high_in_t1() -> QueryAst {
    QueryAst::for_tenant("t1")
        .with_where(Condition::equals("severity", "high"))
        .with_time_range(TimeRange::last("1h"))
        .with_limit(10)
}

#[test]
fn test_tenant_severity_scenario() {
    let result = mock_provider().execute_ast(&high_in_t1());

    assert!(result.success);
    assert_eq!(result.total, 3);
    assert_eq!(result.data.len(), 3);
    let mut ids = uids(&result.data);
    ids.sort();
    assert_eq!(ids, vec!["e1", "e2", "e3"]);
}

#[test]
fn test_parsed_query_matches_case_insensitively() {
    let provider = mock_provider();
    let ast = parse("severity = \"high\"", Some("t1"));
    let result = provider.execute_ast(&ast);

    assert!(result.success);
    let mut ids = uids(&result.data);
    ids.sort();
    assert_eq!(ids, vec!["e1", "e2", "e3"]);
    assert!(result.data.iter().all(|r| r["severity"]
        .as_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("high"))));
}

#[test]
fn test_parsed_fragments_are_combined_with_and() {
    let ast = parse("severity = high OR user.name = alice", Some("t1"));
    let result = mock_provider().execute_ast(&ast);

    assert!(result.success);
    assert_eq!(uids(&result.data), vec!["e1"]);
}

#[test]
fn test_execution_is_idempotent() {
    let provider = mock_provider();
    let ast = QueryAst::for_tenant("t1").with_order_by("time", SortDirection::Desc);

    let first = provider.execute_ast(&ast);
    let second = provider.execute_ast(&ast);
    assert_eq!(first.total, second.total);
    assert_eq!(first.data, second.data);
}

#[test]
fn test_tenant_isolation() {
    let provider = mock_provider();
    let queries = [
        QueryAst::for_tenant("t1"),
        QueryAst::for_tenant("t1").with_where(Condition::equals("process.name", "sshd")),
        parse("severity_id >= 1", Some("t1")),
    ];

    for ast in &queries {
        let result = provider.execute_ast(ast);
        assert!(result.success);
        assert!(!result.data.is_empty());
        assert!(result.data.iter().all(|r| r["tenant_id"] == "t1"));
    }

    let result = provider.execute_ast(&QueryAst::for_tenant("T1"));
    assert_eq!(result.total, 0);
}

#[test]
fn test_offset_past_total_is_empty() {
    let provider = mock_provider();
    for limit in [None, Some(1), Some(100)] {
        let mut ast = QueryAst::for_tenant("t1").with_offset(5);
        ast.limit = limit;

        let result = provider.execute_ast(&ast);
        assert!(result.success);
        assert_eq!(result.total, 5);
        assert!(result.data.is_empty());
        assert_eq!(result.error, None);
    }
}

#[test]
fn test_multi_key_order_by() {
    let ast = QueryAst::for_tenant("t1")
        .with_order_by("severity_id", SortDirection::Asc)
        .with_order_by("user.name", SortDirection::Desc);
    let result = mock_provider().execute_ast(&ast);

    assert_eq!(uids(&result.data), vec!["e5", "e4", "e3", "e2", "e1"]);
}

#[test]
fn test_in_subnet_on_mock() {
    let ast = QueryAst::for_tenant("t1").with_where(Condition::new(
        "src_endpoint.ip",
        ComparisonOperator::InSubnet,
        Literal::from("192.168.0.0/16"),
    ));
    let mut ids = uids(&mock_provider().execute_ast(&ast).data);
    ids.sort();
    assert_eq!(ids, vec!["e1", "e3"]);
}

#[test]
fn test_not_with_extra_children_uses_first() {
    let provider = mock_provider();
    let ast = QueryAst::for_tenant("t1").with_where(Expression::Logical(LogicalExpression {
        operator: LogicalOperator::Not,
        conditions: vec![
            Condition::equals("severity", "low").into(),
            Condition::equals("user.name", "alice").into(),
        ],
    }));

    let report = provider.validate_ast(&ast);
    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("only the first")));

    let mut ids = uids(&provider.execute_ast(&ast).data);
    ids.sort();
    assert_eq!(ids, vec!["e1", "e2", "e3"]);
}

#[test]
fn test_validation_report_flags_unscoped_queries() {
    let report = mock_provider().validate_ast(&QueryAst::new());
    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("tenant")));
    assert!(report.warnings.iter().any(|w| w.contains("time range")));
}
