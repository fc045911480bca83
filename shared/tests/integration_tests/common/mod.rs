//! Common test utilities and helpers for integration tests.
//!
//! Every test works against the same small event fixture so results can be
//! compared across backends.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use shared::audit::InMemoryAuditSink;
use shared::config::DatabaseConfig;
use shared::manager::QueryManager;
use shared::providers::{MockProvider, Record};
use shared::query::fields::{column_for, insert_dotted};
use std::sync::Arc;

/// Table used by the `ClickHouse` tests.
pub const TEST_TABLE: &str = "vigil_test_events";

/// One fixture event: uid, tenant, severity, severity id, user, source IP,
/// process and age in minutes.
type FixtureEvent = (
    &'static str,
    &'static str,
    &'static str,
    i64,
    &'static str,
    Option<&'static str>,
    &'static str,
    i64,
);

/// Five events for `t1` (three high, two low) and two for `t2`.
const FIXTURE: &[FixtureEvent] = &[
    ("e1", "t1", "high", 4, "alice", Some("192.168.1.5"), "sshd", 5),
    ("e2", "t1", "high", 4, "bob", Some("10.0.0.1"), "powershell.exe", 10),
    ("e3", "t1", "HIGH", 4, "carol", Some("192.168.20.7"), "chrome.exe", 20),
    ("e4", "t1", "low", 2, "alice", Some("10.0.0.2"), "explorer.exe", 30),
    ("e5", "t1", "low", 2, "dave", None, "svchost.exe", 40),
    ("e6", "t2", "high", 4, "mallory", Some("192.168.1.9"), "sshd", 5),
    ("e7", "t2", "low", 2, "trent", Some("10.0.0.3"), "bash", 50),
];

/// Fixture events keyed by logical dotted field names.
pub fn fixture_rows() -> Vec<Vec<(&'static str, Value)>> {
    let now = Utc::now();
    FIXTURE
        .iter()
        .map(|(uid, tenant, severity, severity_id, user, ip, process, age)| {
            let mut row = vec![
                ("metadata.uid", Value::from(*uid)),
                ("tenant_id", Value::from(*tenant)),
                ("severity", Value::from(*severity)),
                ("severity_id", Value::from(*severity_id)),
                ("user.name", Value::from(*user)),
                ("process.name", Value::from(*process)),
                (
                    "time",
                    Value::from((now - Duration::minutes(*age)).to_rfc3339()),
                ),
            ];
            if let Some(ip) = ip {
                row.push(("src_endpoint.ip", Value::from(*ip)));
            }
            row
        })
        .collect()
}

/// Fixture events as nested records.
pub fn fixture_records() -> Vec<Record> {
    fixture_rows()
        .into_iter()
        .map(|row| {
            let mut record = Map::new();
            for (field, value) in row {
                insert_dotted(&mut record, field, value);
            }
            record
        })
        .collect()
}

/// Creates a mock provider over the fixture.
pub fn mock_provider() -> MockProvider {
    MockProvider::new(fixture_records())
}

/// Creates a manager serving the fixture, with an inspectable audit sink.
pub fn test_manager() -> (QueryManager, InMemoryAuditSink) {
    let sink = InMemoryAuditSink::new();
    let manager = QueryManager::new()
        .with_provider(Arc::new(mock_provider()))
        .with_audit_sink(Arc::new(sink.clone()));
    (manager, sink)
}

/// Returns the `metadata.uid` of every record, in order.
pub fn uids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("metadata")?.get("uid")?.as_str().map(str::to_string))
        .collect()
}

/// Database settings for the `ClickHouse` tests.
///
/// Uses `VIGIL_DB_*` when set, otherwise a local default instance.
pub fn clickhouse_config() -> DatabaseConfig {
    let mut config = DatabaseConfig::from_env()
        .ok()
        .flatten()
        .unwrap_or_default();
    config.table = TEST_TABLE.to_string();
    config
}

/// Creates the test table and loads the fixture into it.
pub async fn load_clickhouse_fixture(config: &DatabaseConfig) {
    let client = clickhouse::Client::default()
        .with_url(&config.url)
        .with_user(&config.user)
        .with_password(&config.password)
        .with_option("date_time_input_format", "best_effort");

    client
        .query(&format!("CREATE DATABASE IF NOT EXISTS {}", config.database))
        .execute()
        .await
        .unwrap();

    let client = client.with_database(&config.database);
    client
        .query(&format!("DROP TABLE IF EXISTS {TEST_TABLE}"))
        .execute()
        .await
        .unwrap();
    client
        .query(&format!(
            "CREATE TABLE {TEST_TABLE} (
                time DateTime64(3, 'UTC'),
                tenant_id String,
                metadata_uid String,
                severity String,
                severity_id Int32,
                actor_user_name Nullable(String),
                src_endpoint_ip Nullable(String),
                process_name Nullable(String)
            ) ENGINE = MergeTree ORDER BY (tenant_id, time)"
        ))
        .execute()
        .await
        .unwrap();

    let rows: Vec<String> = fixture_rows()
        .into_iter()
        .map(|row| {
            let columns: Map<String, Value> = row
                .into_iter()
                .map(|(field, value)| (column_for(field).to_string(), value))
                .collect();
            Value::Object(columns).to_string()
        })
        .collect();
    client
        .query(&format!(
            "INSERT INTO {TEST_TABLE} FORMAT JSONEachRow {}",
            rows.join("\n")
        ))
        .execute()
        .await
        .unwrap();
}
