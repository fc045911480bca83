//! Operator semantics shared by every backend.
//!
//! The in-memory executor evaluates these directly and the SQL compiler
//! lowers to expressions with the same meaning:
//!
//! - string comparisons ignore case
//! - ordering operators compare as `f64` (or as instants for timestamps) and
//!   fail closed when a side cannot be coerced
//! - regular expressions are case-insensitive
//! - `IN_SUBNET` tests CIDR membership

use super::ast::Literal;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Compiles a case-insensitive regular expression.
///
/// # Errors
///
/// Returns the regex error if the pattern is invalid.
pub fn compile_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Error parsing a CIDR block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid CIDR block '{0}'")]
pub struct CidrError(pub String);

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Returns true if `ip` lies inside the block.
    ///
    /// Addresses of the other family never match.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    /// Parses `addr/prefix`; a bare address is a single-host block.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CidrError(s.to_string());
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let network: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Self { network, prefix })
    }
}

/// Coerces a record value to `f64`.
///
/// Numbers convert directly, numeric strings are parsed, booleans are 1/0.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Coerces a literal to `f64` with the same rules as [`value_as_f64`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn literal_as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Integer(i) => Some(*i as f64),
        Literal::Float(f) => Some(*f),
        Literal::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Literal::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Literal::Timestamp(_) | Literal::IpAddress(_) => None,
    }
}

/// Text form of a scalar record value; `None` for null, arrays and objects.
///
/// Integral floats print without a fractional part, the way `ClickHouse`
/// renders them with `toString`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lower-cased key used for case-insensitive equality and set membership.
#[must_use]
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Interprets a record value as a timestamp.
///
/// Accepts RFC 3339 strings and epoch milliseconds.
#[must_use]
pub fn value_as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Interprets a record value as an IP address.
#[must_use]
pub fn value_as_ip(value: &Value) -> Option<IpAddr> {
    value.as_str().and_then(|s| s.trim().parse().ok())
}
