//! Integration tests for the `ClickHouse` backend.
//!
//! Tests cover:
//! - SQL generation for tenant scoping, subnets and hostile literals
//! - Runtime requirements of the synchronous bridge
//! - Result parity with the in-memory backend (requires `ClickHouse`)

use chrono::Utc;
use shared::config::DatabaseConfig;
use shared::providers::{QueryProvider, SqlCompiler, SqlProvider};
use shared::query::{
    parse, ComparisonOperator, Condition, Expression, Literal, QueryAst, SortDirection, TimeRange,
};

use super::common::{clickhouse_config, load_clickhouse_fixture, mock_provider, uids};

fn subnet_query() -> QueryAst {
    QueryAst::for_tenant("t1").with_where(Condition::new(
        "src_endpoint.ip",
        ComparisonOperator::InSubnet,
        Literal::from("192.168.0.0/16"),
    ))
}

/// Queries without GROUP BY that must return the same rows on every backend.
fn parity_queries() -> Vec<QueryAst> {
    vec![
        parse("severity = \"HIGH\"", Some("t1")),
        subnet_query(),
        QueryAst::for_tenant("t1").with_where(Condition::new(
            "user.name",
            ComparisonOperator::In,
            vec![Literal::from("alice"), Literal::from("BOB")],
        )),
        parse("severity_id >= 3", Some("t1")),
        parse("process.name CONTAINS sh", Some("t1")),
        parse("src_endpoint.ip IS NULL", Some("t1")),
        QueryAst::for_tenant("t1")
            .with_where(Expression::not(Condition::equals("severity", "low").into())),
        QueryAst::for_tenant("t2").with_time_range(TimeRange::last("15m")),
    ]
}

#[test]
fn test_hostile_literal_is_only_present_escaped() {
    let hostile = "'; DROP TABLE --";
    let ast = QueryAst::for_tenant("t1").with_where(Condition::new(
        "message",
        ComparisonOperator::Contains,
        Literal::from(hostile),
    ));
    let compiled = SqlCompiler::default().compile(&ast, Utc::now()).unwrap();

    for sql in [&compiled.sql, &compiled.count_sql] {
        assert!(sql.contains("''; DROP TABLE --"));
        assert!(!sql.replace("''; DROP TABLE --", "").contains(hostile));
    }
}

#[test]
fn test_subnet_compiles_to_range_check() {
    let compiled = SqlCompiler::default()
        .compile(&subnet_query(), Utc::now())
        .unwrap();
    assert!(compiled
        .sql
        .contains("isIPAddressInRange(toString(security_events.src_endpoint_ip), '192.168.0.0/16')"));
    assert!(compiled.sql.contains("security_events.tenant_id = 't1'"));
}

#[test]
fn test_sql_validation_reports_compile_errors() {
    let provider = SqlProvider::new(DatabaseConfig::default());
    let ast = QueryAst::for_tenant("t1").with_where(Condition::new(
        "src_endpoint.ip",
        ComparisonOperator::InSubnet,
        Literal::from("not-a-cidr"),
    ));

    let report = provider.validate_ast(&ast);
    assert!(!report.valid);
    assert!(!report.errors.is_empty());
}

#[test]
fn test_current_thread_runtime_is_rejected() {
    let provider = SqlProvider::new(DatabaseConfig::default());
    let result = tokio_test::block_on(async { provider.execute_ast(&subnet_query()) });

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.contains("multi-threaded")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires running ClickHouse instance"]
async fn test_in_subnet_on_clickhouse() {
    let config = clickhouse_config();
    load_clickhouse_fixture(&config).await;
    let provider = SqlProvider::new(config);

    let result = provider.execute_ast(&subnet_query());
    assert!(result.success, "{:?}", result.error);
    let mut ids = uids(&result.data);
    ids.sort();
    assert_eq!(ids, vec!["e1", "e3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires running ClickHouse instance"]
async fn test_backends_return_the_same_rows() {
    let config = clickhouse_config();
    load_clickhouse_fixture(&config).await;
    let sql = SqlProvider::new(config);
    let mock = mock_provider();

    for ast in parity_queries() {
        let expected = mock.execute_ast(&ast);
        let actual = sql.execute_ast(&ast);
        assert!(actual.success, "{ast}: {:?}", actual.error);
        assert_eq!(actual.total, expected.total, "{ast}");

        let mut expected_ids = uids(&expected.data);
        let mut actual_ids = uids(&actual.data);
        expected_ids.sort();
        actual_ids.sort();
        assert_eq!(actual_ids, expected_ids, "{ast}");
        let tenant = ast.tenant_id.as_deref().unwrap_or_default();
        assert!(actual.data.iter().all(|r| r["tenant_id"] == tenant));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires running ClickHouse instance"]
async fn test_backends_sort_and_page_the_same() {
    let config = clickhouse_config();
    load_clickhouse_fixture(&config).await;
    let sql = SqlProvider::new(config);
    let mock = mock_provider();

    let ast = QueryAst::for_tenant("t1")
        .with_order_by("severity_id", SortDirection::Asc)
        .with_order_by("user.name", SortDirection::Desc)
        .with_offset(1)
        .with_limit(3);

    let expected = mock.execute_ast(&ast);
    let actual = sql.execute_ast(&ast);
    assert!(actual.success, "{:?}", actual.error);
    assert_eq!(actual.total, 5);
    assert_eq!(uids(&actual.data), uids(&expected.data));
    assert_eq!(uids(&actual.data), vec!["e4", "e3", "e2"]);

    assert!(sql.ping().is_ok());
}
