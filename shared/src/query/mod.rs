//! Query model and language for tenant-scoped security events.
//!
//! This module holds everything that does not depend on a storage backend:
//! the AST, the text parser, the logical field table, operator semantics and
//! structural validation.
//!
//! # Supported Syntax
//!
//! ```text
//! severity = "high" AND user.name IN (alice, bob)
//! message CONTAINS 'denied' AND severity_id >= 4
//! src_endpoint.ip IN_SUBNET 10.0.0.0/8 AND file.hash IS NOT NULL
//! ```
//!
//! # Example
//!
//! ```
//! use shared::query::{parse, validate_ast, ValidationLimits};
//!
//! let ast = parse("severity = high AND user.name = alice", Some("t1"));
//! assert_eq!(ast.tenant_id.as_deref(), Some("t1"));
//!
//! let report = validate_ast(&ast, &ValidationLimits::default());
//! assert!(report.valid);
//! ```

mod ast;
pub mod fields;
mod parser;
pub mod semantics;
mod validate;

pub use ast::*;
pub use parser::{parse, parse_with_diagnostics, ParseError, ParseOutcome, SkippedFragment};
pub use validate::{validate_ast, ValidationLimits, ValidationReport, DEFAULT_LARGE_LIMIT};
