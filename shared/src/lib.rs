//! Vigil Shared Library
//!
//! Tenant-scoped queries over security events. A query is expressed as a
//! [`query::QueryAst`], built directly or parsed from the text mini-language,
//! and executed by a [`providers::QueryProvider`] through the
//! [`manager::QueryManager`].
//!
//! # Modules
//!
//! - [`query`] - Query AST, text parser, validation and shared semantics
//! - [`providers`] - In-memory and `ClickHouse` query backends
//! - [`manager`] - Backend selection, response envelopes and auditing
//! - [`audit`] - Audit records and sinks
//! - [`config`] - Configuration loaded from the environment
//!
//! # Example
//!
//! ```
//! use shared::manager::QueryManager;
//! use shared::providers::MockProvider;
//! use std::sync::Arc;
//!
//! let manager = QueryManager::new().with_provider(Arc::new(MockProvider::with_sample_data()));
//! let response = manager.execute_text(
//!     "severity = \"critical\" AND class_name = \"Process Activity\"",
//!     Some("tenant-alpha"),
//!     Some("analyst"),
//!     None,
//! );
//!
//! assert!(response.success);
//! assert_eq!(response.total, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod config;
pub mod manager;
pub mod providers;
pub mod query;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
