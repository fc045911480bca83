//! Integration tests for the Vigil query engine.
//!
//! These tests drive queries end to end through the public API: text
//! parsing, validation, the in-memory and `ClickHouse` backends and the query
//! manager.
//!
//! Tests marked `#[ignore]` need a running `ClickHouse` instance.
//! Run with: `cargo test -- --ignored`

mod common;
mod manager_tests;
mod query_tests;
mod sql_tests;
