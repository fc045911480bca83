//! In-memory query provider.
//!
//! Evaluates a [`QueryAst`] directly over an immutable set of records. It is
//! the reference implementation of the query semantics: the SQL compiler is
//! tested against the rows this provider returns.
//!
//! Conditions use three-valued logic. A comparison against a missing field,
//! or one whose value cannot be coerced to the operand type, is unknown
//! rather than false, and unknown rows are dropped even under `NOT`. This is
//! how the database treats `NULL`.

use super::{
    ensure_valid, paginate, Backend, ExecutionError, ExecutionResult, QueryProvider, Record,
    ResultPage,
};
use crate::query::fields::insert_dotted;
use crate::query::semantics::{
    compile_regex, fold_case, literal_as_f64, value_as_f64, value_as_ip, value_as_text,
    value_as_timestamp, Cidr,
};
use crate::query::{
    validate_ast, AggregateFunction, ComparisonOperator, Condition, ConditionValue, Expression,
    Field, Function, Literal, LogicalOperator, Operand, OrderBy, QueryAst, SortDirection,
    ValidationLimits, ValidationReport,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors loading a mock dataset.
#[derive(Debug, Error)]
pub enum MockDataError {
    /// The file could not be read.
    #[error("Failed to read mock data from {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON array of objects.
    #[error("Mock data is not a JSON array of objects: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Query provider backed by an in-memory dataset.
///
/// The dataset is shared read-only, so clones are cheap and the provider can
/// serve concurrent queries without locking.
///
/// # Example
///
/// ```
/// use shared::providers::{MockProvider, QueryProvider};
/// use shared::query::{Condition, QueryAst};
/// use shared::serde_json::json;
///
/// let records = vec![
///     json!({"tenant_id": "t1", "severity": "high"}),
///     json!({"tenant_id": "t1", "severity": "low"}),
///     json!({"tenant_id": "t2", "severity": "high"}),
/// ];
/// let provider = MockProvider::from_values(records);
///
/// let ast = QueryAst::for_tenant("t1").with_where(Condition::equals("severity", "HIGH"));
/// let result = provider.execute_ast(&ast);
/// assert!(result.success);
/// assert_eq!(result.total, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    records: Arc<[Record]>,
    limits: ValidationLimits,
    source: String,
}

impl MockProvider {
    /// Creates a provider over the given records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
            limits: ValidationLimits::default(),
            source: "supplied records".to_string(),
        }
    }

    /// Creates a provider from JSON values; values that are not objects are ignored.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(
            values
                .into_iter()
                .filter_map(|value| match value {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Creates a provider over a generated set of security events.
    ///
    /// Event times are relative to the current time so relative time ranges
    /// always find data.
    #[must_use]
    pub fn with_sample_data() -> Self {
        let mut provider = Self::new(sample_records(Utc::now()));
        provider.source = "built-in sample events".to_string();
        provider
    }

    /// Loads records from a file holding a JSON array of objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MockDataError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MockDataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<Record> = serde_json::from_str(&content)?;
        let mut provider = Self::new(records);
        provider.source = path.display().to_string();
        Ok(provider)
    }

    /// Sets the validation thresholds.
    #[must_use]
    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of records in the dataset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Executes a query with relative time ranges resolved against `now`.
    #[must_use]
    pub fn execute_at(&self, ast: &QueryAst, now: DateTime<Utc>) -> ExecutionResult {
        let result = ExecutionResult::timed(|| self.run(ast, now));
        tracing::debug!(
            backend = %Backend::Mock,
            tenant_id = ?ast.tenant_id,
            success = result.success,
            total = result.total,
            returned = result.data.len(),
            "Executed query"
        );
        result
    }

    fn run(&self, ast: &QueryAst, now: DateTime<Utc>) -> Result<ResultPage, ExecutionError> {
        ensure_valid(&validate_ast(ast, &self.limits))?;

        let bounds = ast
            .time_range
            .as_ref()
            .map(|range| range.bounds(now))
            .transpose()?;

        let matched: Vec<&Record> = self
            .records
            .iter()
            .filter(|record| tenant_matches(record, ast.tenant_id.as_deref()))
            .filter(|record| {
                ast.where_clause
                    .as_ref()
                    .is_none_or(|expr| evaluate(expr, &RecordScope(record)) == Some(true))
            })
            .filter(|record| {
                bounds.is_none_or(|(start, end)| within_time_range(record, start, end))
            })
            .collect();

        let rows = if ast.group_by.is_some() || ast.has_aggregates() {
            let mut rows = aggregate_groups(ast, &matched);
            rows.sort_by(|a, b| compare_rows(a, b, &ast.order_by, lookup));
            rows
        } else {
            let aliases: HashMap<&str, &str> = ast
                .select
                .iter()
                .filter_map(|item| match (&item.alias, &item.field) {
                    (Some(alias), Operand::Field(field)) => Some((alias.as_str(), field.name())),
                    _ => None,
                })
                .collect();
            let mut sorted = matched;
            sorted.sort_by(|a, b| {
                compare_rows(a, b, &ast.order_by, |record, name| {
                    lookup(record, aliases.get(name).copied().unwrap_or(name))
                })
            });
            sorted.into_iter().map(|record| project(ast, record)).collect()
        };

        Ok(paginate(rows, ast.offset, ast.limit))
    }
}

impl QueryProvider for MockProvider {
    fn backend(&self) -> Backend {
        Backend::Mock
    }

    fn description(&self) -> String {
        format!(
            "In-memory query evaluation over {} events ({})",
            self.records.len(),
            self.source
        )
    }

    fn is_available(&self) -> bool {
        true
    }

    fn validate_ast(&self, ast: &QueryAst) -> ValidationReport {
        validate_ast(ast, &self.limits)
    }

    fn execute_ast(&self, ast: &QueryAst) -> ExecutionResult {
        self.execute_at(ast, Utc::now())
    }
}

// ============================================================================
// Field access
// ============================================================================

/// Looks up a dotted field, trying a flat key first and then nested objects.
///
/// `null` is treated as missing.
fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let value = match record.get(path) {
        Some(value) => value,
        None => {
            let mut segments = path.split('.');
            let mut current = record.get(segments.next()?)?;
            for segment in segments {
                current = current.as_object()?.get(segment)?;
            }
            current
        }
    };
    (!value.is_null()).then_some(value)
}

fn tenant_matches(record: &Record, tenant_id: Option<&str>) -> bool {
    match tenant_id {
        Some(tenant) => lookup(record, "tenant_id").and_then(Value::as_str) == Some(tenant),
        None => true,
    }
}

fn within_time_range(record: &Record, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
    let Some(time) = lookup(record, "time").and_then(value_as_timestamp) else {
        return false;
    };
    time >= start && end.is_none_or(|end| time <= end)
}

/// Resolves operands while evaluating an expression.
trait Scope {
    fn field(&self, field: &Field) -> Option<Cow<'_, Value>>;

    fn function(&self, func: &Function) -> Option<Cow<'_, Value>>;

    fn operand(&self, operand: &Operand) -> Option<Cow<'_, Value>> {
        match operand {
            Operand::Field(field) => self.field(field),
            Operand::Function(func) => self.function(func),
        }
    }
}

/// A single source record (WHERE).
struct RecordScope<'a>(&'a Record);

impl Scope for RecordScope<'_> {
    fn field(&self, field: &Field) -> Option<Cow<'_, Value>> {
        lookup(self.0, field.name()).map(Cow::Borrowed)
    }

    fn function(&self, _func: &Function) -> Option<Cow<'_, Value>> {
        None
    }
}

/// An output group row and its member records (HAVING).
struct GroupScope<'a> {
    row: &'a Record,
    members: &'a [&'a Record],
}

impl Scope for GroupScope<'_> {
    fn field(&self, field: &Field) -> Option<Cow<'_, Value>> {
        lookup(self.row, field.name()).map(Cow::Borrowed)
    }

    fn function(&self, func: &Function) -> Option<Cow<'_, Value>> {
        let value = compute_aggregate(func, self.members);
        (!value.is_null()).then_some(Cow::Owned(value))
    }
}

// ============================================================================
// Condition evaluation
// ============================================================================

/// Evaluates an expression; `None` means unknown.
fn evaluate(expr: &Expression, scope: &impl Scope) -> Option<bool> {
    match expr {
        Expression::Condition(condition) => evaluate_condition(condition, scope),
        Expression::Logical(logical) => match logical.operator {
            LogicalOperator::And => {
                let mut result = Some(true);
                for child in &logical.conditions {
                    match evaluate(child, scope) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            LogicalOperator::Or => {
                let mut result = Some(false);
                for child in &logical.conditions {
                    match evaluate(child, scope) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            // Extra children are ignored (validation warns about them).
            LogicalOperator::Not => logical
                .conditions
                .first()
                .and_then(|inner| evaluate(inner, scope))
                .map(|b| !b),
        },
    }
}

fn evaluate_condition(condition: &Condition, scope: &impl Scope) -> Option<bool> {
    let op = condition.operator;
    let left = scope.operand(&condition.left);

    if op.is_unary() {
        let present = left.is_some();
        return Some(if op == ComparisonOperator::IsNull {
            !present
        } else {
            present
        });
    }

    let left = left?;
    let right = condition.right.as_ref()?;

    match op {
        ComparisonOperator::Equals => equals(&left, right, scope),
        ComparisonOperator::NotEquals => equals(&left, right, scope).map(|eq| !eq),
        ComparisonOperator::Gt => ordering(&left, right, scope).map(Ordering::is_gt),
        ComparisonOperator::Gte => ordering(&left, right, scope).map(Ordering::is_ge),
        ComparisonOperator::Lt => ordering(&left, right, scope).map(Ordering::is_lt),
        ComparisonOperator::Lte => ordering(&left, right, scope).map(Ordering::is_le),
        ComparisonOperator::Contains
        | ComparisonOperator::StartsWith
        | ComparisonOperator::EndsWith => {
            let haystack = fold_case(&value_as_text(&left)?);
            let needle = fold_case(&literal_text(right)?);
            Some(match op {
                ComparisonOperator::Contains => haystack.contains(&needle),
                ComparisonOperator::StartsWith => haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            })
        }
        ComparisonOperator::Regex => {
            let text = value_as_text(&left)?;
            let re = compile_regex(&literal_text(right)?).ok()?;
            Some(re.is_match(&text))
        }
        ComparisonOperator::In | ComparisonOperator::NotIn => {
            let ConditionValue::List(items) = right else {
                return None;
            };
            let text = fold_case(&value_as_text(&left)?);
            let found = items.iter().any(|item| fold_case(&item.raw()) == text);
            Some(if op == ComparisonOperator::In { found } else { !found })
        }
        ComparisonOperator::InSubnet => {
            let ip = value_as_ip(&left)?;
            let cidr: Cidr = literal_text(right)?.parse().ok()?;
            Some(cidr.contains(ip))
        }
        ComparisonOperator::IsNull | ComparisonOperator::IsNotNull => None,
    }
}

fn literal_text(right: &ConditionValue) -> Option<String> {
    match right {
        ConditionValue::Literal(literal) => Some(literal.raw()),
        _ => None,
    }
}

fn equals(left: &Value, right: &ConditionValue, scope: &impl Scope) -> Option<bool> {
    match right {
        ConditionValue::Literal(literal) => literal_equals(left, literal),
        ConditionValue::Field(field) => {
            let other = scope.field(field)?;
            Some(fold_case(&value_as_text(left)?) == fold_case(&value_as_text(&other)?))
        }
        ConditionValue::List(_) => None,
    }
}

#[allow(clippy::float_cmp)]
fn literal_equals(value: &Value, literal: &Literal) -> Option<bool> {
    match literal {
        Literal::String(s) => Some(fold_case(&value_as_text(value)?) == fold_case(s)),
        Literal::Integer(_) | Literal::Float(_) => {
            Some(value_as_f64(value)? == literal_as_f64(literal)?)
        }
        Literal::Boolean(b) => match value {
            Value::Bool(v) => Some(v == b),
            Value::Number(_) => value_as_f64(value).map(|f| f == if *b { 1.0 } else { 0.0 }),
            _ => None,
        },
        Literal::Timestamp(ts) => Some(value_as_timestamp(value)? == *ts),
        Literal::IpAddress(ip) => Some(value_as_ip(value)? == *ip),
    }
}

fn ordering(left: &Value, right: &ConditionValue, scope: &impl Scope) -> Option<Ordering> {
    match right {
        ConditionValue::Literal(Literal::Timestamp(ts)) => Some(value_as_timestamp(left)?.cmp(ts)),
        ConditionValue::Literal(literal) => value_as_f64(left)?.partial_cmp(&literal_as_f64(literal)?),
        ConditionValue::Field(field) => {
            let other = scope.field(field)?;
            value_as_f64(left)?.partial_cmp(&value_as_f64(&other)?)
        }
        ConditionValue::List(_) => None,
    }
}

// ============================================================================
// Grouping and aggregation
// ============================================================================

fn aggregate_groups(ast: &QueryAst, matched: &[&Record]) -> Vec<Record> {
    let group_fields: &[Field] = ast.group_by.as_ref().map_or(&[], |g| g.fields.as_slice());

    // Groups keep first-seen order.
    let mut groups: Vec<(Vec<Value>, Vec<&Record>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for &record in matched {
        let key: Vec<Value> = group_fields
            .iter()
            .map(|field| lookup(record, field.name()).cloned().unwrap_or(Value::Null))
            .collect();
        let key_text = Value::Array(key.clone()).to_string();
        let slot = *index.entry(key_text).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(record);
    }

    // Aggregates without grouping fields always produce one row.
    if group_fields.is_empty() && groups.is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }

    let having = ast.group_by.as_ref().and_then(|g| g.having.as_ref());

    groups
        .into_iter()
        .filter_map(|(key, members)| {
            let row = group_row(ast, group_fields, &key, &members);
            let keep = having.is_none_or(|expr| {
                evaluate(expr, &GroupScope { row: &row, members: &members }) == Some(true)
            });
            keep.then_some(row)
        })
        .collect()
}

fn group_row(ast: &QueryAst, group_fields: &[Field], key: &[Value], members: &[&Record]) -> Record {
    let mut row = Record::new();

    if ast.select.is_empty() {
        for (field, value) in group_fields.iter().zip(key) {
            insert_dotted(&mut row, field.name(), value.clone());
        }
        row.insert("count".to_string(), Value::from(members.len()));
        return row;
    }

    for item in &ast.select {
        let value = match &item.field {
            Operand::Field(field) => group_fields
                .iter()
                .position(|f| f == field)
                .and_then(|i| key.get(i).cloned())
                .unwrap_or(Value::Null),
            Operand::Function(func) => compute_aggregate(func, members),
        };
        insert_dotted(&mut row, &item.output_name(), value);
    }
    row
}

fn compute_aggregate(func: &Function, members: &[&Record]) -> Value {
    let Some(field) = func.field_arg() else {
        return match func.name {
            AggregateFunction::Count => Value::from(members.len()),
            _ => Value::Null,
        };
    };
    let values: Vec<&Value> = members
        .iter()
        .filter_map(|record| lookup(record, field.name()))
        .collect();

    match func.name {
        AggregateFunction::Count => Value::from(values.len()),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| value_as_f64(v)).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                #[allow(clippy::cast_precision_loss)]
                let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                Value::from(avg)
            }
        }
        AggregateFunction::Min => values
            .iter()
            .min_by(|a, b| compare_values(a, b))
            .map_or(Value::Null, |v| (*v).clone()),
        AggregateFunction::Max => values
            .iter()
            .max_by(|a, b| compare_values(a, b))
            .map_or(Value::Null, |v| (*v).clone()),
        AggregateFunction::CountDistinct => {
            let distinct: HashSet<String> = values.iter().map(ToString::to_string).collect();
            Value::from(distinct.len())
        }
        AggregateFunction::First => values.first().map_or(Value::Null, |v| (*v).clone()),
        AggregateFunction::Last => values.last().map_or(Value::Null, |v| (*v).clone()),
    }
}

/// Integer sum when every value is an integer, float sum otherwise.
fn sum(values: &[&Value]) -> Value {
    let integers: Option<Vec<i64>> = values.iter().map(|v| v.as_i64()).collect();
    match integers {
        Some(integers) => integers
            .into_iter()
            .try_fold(0_i64, i64::checked_add)
            .map_or(Value::Null, Value::from),
        None => Value::from(values.iter().filter_map(|v| value_as_f64(v)).sum::<f64>()),
    }
}

// ============================================================================
// Projection and sorting
// ============================================================================

fn project(ast: &QueryAst, record: &Record) -> Record {
    if ast.select.is_empty() {
        return record.clone();
    }

    let mut row = Record::new();
    for item in &ast.select {
        if let Operand::Field(field) = &item.field {
            let value = lookup(record, field.name()).cloned().unwrap_or(Value::Null);
            insert_dotted(&mut row, &item.output_name(), value);
        }
    }
    row
}

/// Total order over JSON scalars: numbers, then strings, then booleans.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Bool(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// Compares rows key by key; missing values sort last in both directions.
fn compare_rows<'a>(
    a: &'a Record,
    b: &'a Record,
    keys: &[OrderBy],
    resolve: impl Fn(&'a Record, &str) -> Option<&'a Value>,
) -> Ordering {
    for key in keys {
        let ordering = match (resolve(a, key.field.name()), resolve(b, key.field.name())) {
            (Some(x), Some(y)) => match key.direction {
                SortDirection::Asc => compare_values(x, y),
                SortDirection::Desc => compare_values(y, x),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// ============================================================================
// Sample data
// ============================================================================

struct SampleEvent {
    minutes_ago: i64,
    class_name: &'static str,
    severity: &'static str,
    severity_id: i64,
    message: &'static str,
    user: &'static str,
    src_ip: &'static str,
    dst_port: i64,
    process: &'static str,
    status: &'static str,
}

const SAMPLE_EVENTS: &[SampleEvent] = &[
    SampleEvent { minutes_ago: 2, class_name: "Authentication", severity: "high", severity_id: 4, message: "Multiple failed logins followed by success", user: "alice", src_ip: "203.0.113.17", dst_port: 22, process: "sshd", status: "failure" },
    SampleEvent { minutes_ago: 7, class_name: "Process Activity", severity: "critical", severity_id: 5, message: "Encoded PowerShell command executed", user: "bob", src_ip: "10.1.4.22", dst_port: 0, process: "powershell.exe", status: "success" },
    SampleEvent { minutes_ago: 15, class_name: "Network Activity", severity: "medium", severity_id: 3, message: "Outbound connection to rare domain", user: "carol", src_ip: "10.1.7.5", dst_port: 443, process: "chrome.exe", status: "success" },
    SampleEvent { minutes_ago: 31, class_name: "Authentication", severity: "low", severity_id: 2, message: "User logged in", user: "alice", src_ip: "10.1.4.10", dst_port: 443, process: "sso-gateway", status: "success" },
    SampleEvent { minutes_ago: 48, class_name: "File System Activity", severity: "high", severity_id: 4, message: "Known malware hash written to disk", user: "dave", src_ip: "10.2.0.8", dst_port: 0, process: "explorer.exe", status: "success" },
    SampleEvent { minutes_ago: 75, class_name: "Network Activity", severity: "low", severity_id: 2, message: "DNS query denied by policy", user: "erin", src_ip: "192.168.10.44", dst_port: 53, process: "svchost.exe", status: "failure" },
    SampleEvent { minutes_ago: 130, class_name: "Authentication", severity: "medium", severity_id: 3, message: "Password spray detected", user: "root", src_ip: "198.51.100.9", dst_port: 3389, process: "lsass.exe", status: "failure" },
    SampleEvent { minutes_ago: 240, class_name: "Process Activity", severity: "informational", severity_id: 1, message: "Scheduled backup started", user: "svc_backup", src_ip: "10.2.0.3", dst_port: 0, process: "backup-agent", status: "success" },
    SampleEvent { minutes_ago: 600, class_name: "Network Activity", severity: "high", severity_id: 4, message: "Large data transfer to external host", user: "bob", src_ip: "10.1.4.22", dst_port: 443, process: "rclone", status: "success" },
    SampleEvent { minutes_ago: 1500, class_name: "Detection Finding", severity: "critical", severity_id: 5, message: "Ransomware behaviour blocked", user: "dave", src_ip: "10.2.0.8", dst_port: 445, process: "locker.exe", status: "failure" },
];

const SAMPLE_TENANTS: &[&str] = &["tenant-alpha", "tenant-beta"];

const MALWARE_HASH: &str = "44d88612fea8a8f36de82e1278abb02f2f5f2a1a6c4e0e9e3b1d6f5b8e3a9c10";

/// Builds the sample events; every event is emitted once per tenant.
fn sample_records(now: DateTime<Utc>) -> Vec<Record> {
    let mut records = Vec::with_capacity(SAMPLE_EVENTS.len() * SAMPLE_TENANTS.len());
    for (t, tenant) in SAMPLE_TENANTS.iter().enumerate() {
        for (i, event) in SAMPLE_EVENTS.iter().enumerate() {
            let time = now - Duration::minutes(event.minutes_ago);
            let mut value = json!({
                "time": time.to_rfc3339(),
                "tenant_id": tenant,
                "class_name": event.class_name,
                "severity": event.severity,
                "severity_id": event.severity_id,
                "status": event.status,
                "message": event.message,
                "metadata": {"uid": format!("evt-{t}-{i:03}"), "product": {"name": "Vigil Sensor"}},
                "user": {"name": event.user},
                "src_endpoint": {"ip": event.src_ip},
                "dst_endpoint": {"port": event.dst_port},
                "process": {"name": event.process},
            });
            if event.class_name == "File System Activity" || event.class_name == "Detection Finding" {
                value["file"] = json!({"hash": MALWARE_HASH});
            }
            if let Value::Object(record) = value {
                records.push(record);
            }
        }
    }
    records
}
