//! Abstract Syntax Tree definitions for security event queries.
//!
//! A [`QueryAst`] is built once per request (by the text parser or directly by
//! a caller), handed by reference through validation and execution, and
//! dropped once the response envelope exists. It owns no external resources.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

/// A dotted logical field name (e.g. `user.name`, `src_endpoint.ip`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Field(pub String);

impl Field {
    /// Creates a field from its logical name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns true if the name is a safe dotted identifier.
    ///
    /// Field names are interpolated into generated SQL, so anything outside
    /// `[A-Za-z_][A-Za-z0-9_.]*` is rejected.
    #[must_use]
    pub fn is_valid_identifier(&self) -> bool {
        is_identifier(&self.0)
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks a dotted identifier (`[A-Za-z_][A-Za-z0-9_.]*`, no empty segments).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.ends_with('.')
        && !name.contains("..")
}

/// A typed literal value.
///
/// The type tag is kept alongside the value because every backend serializes
/// the variants differently (booleans become `1`/`0` in SQL, addresses are
/// wrapped in a constructor, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    /// String value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Point in time (UTC).
    Timestamp(DateTime<Utc>),
    /// IPv4 or IPv6 address.
    IpAddress(IpAddr),
}

impl Literal {
    /// Returns the lowercase name of the literal's type tag.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
            Self::IpAddress(_) => "ip_address",
        }
    }

    /// Returns the string payload for string literals.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the raw value without quoting.
    #[must_use]
    pub fn raw(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(fl) => fl.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Timestamp(ts) => ts.to_rfc3339(),
            Self::IpAddress(ip) => ip.to_string(),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<IpAddr> for Literal {
    fn from(value: IpAddr) -> Self {
        Self::IpAddress(value)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{s}'"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Timestamp(ts) => write!(f, "'{}'", ts.to_rfc3339()),
            Self::IpAddress(ip) => write!(f, "{ip}"),
        }
    }
}

/// Aggregate functions usable in SELECT and HAVING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Number of rows (or non-null values of the argument).
    Count,
    /// Sum of a numeric field.
    Sum,
    /// Average of a numeric field.
    Avg,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Number of distinct values.
    CountDistinct,
    /// First value seen in the group.
    First,
    /// Last value seen in the group.
    Last,
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::CountDistinct => "count_distinct",
            Self::First => "first",
            Self::Last => "last",
        };
        write!(f, "{name}")
    }
}

/// An argument of an aggregate function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionArg {
    /// A field reference.
    Field(Field),
    /// A constant.
    Literal(Literal),
    /// A nested function call.
    Function(Function),
}

impl std::fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{field}"),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Function(func) => write!(f, "{func}"),
        }
    }
}

/// An aggregate function call (e.g. `count()`, `sum(traffic.bytes)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// The aggregate operation.
    pub name: AggregateFunction,
    /// Arguments, possibly empty.
    #[serde(default)]
    pub args: Vec<FunctionArg>,
}

impl Function {
    /// Creates a call with no arguments.
    #[must_use]
    pub fn new(name: AggregateFunction) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    /// Shorthand for `count()`.
    #[must_use]
    pub fn count() -> Self {
        Self::new(AggregateFunction::Count)
    }

    /// Creates a call over a single field.
    #[must_use]
    pub fn of(name: AggregateFunction, field: impl Into<Field>) -> Self {
        Self::new(name).with_arg(FunctionArg::Field(field.into()))
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: FunctionArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Returns the first field argument, if any.
    #[must_use]
    pub fn field_arg(&self) -> Option<&Field> {
        self.args.iter().find_map(|arg| match arg {
            FunctionArg::Field(field) => Some(field),
            _ => None,
        })
    }

    /// Output column name used when the call carries no alias.
    ///
    /// `count()` is `count`; calls over a field are `<name>_<field>` with dots
    /// replaced by underscores.
    #[must_use]
    pub fn default_alias(&self) -> String {
        match self.field_arg() {
            Some(field) => format!("{}_{}", self.name, field.name().replace('.', "_")),
            None => self.name.to_string(),
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// Left-hand side of a condition or a SELECT item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A field reference.
    Field(Field),
    /// An aggregate call.
    Function(Function),
}

impl Operand {
    /// Column name this operand produces in an output row.
    #[must_use]
    pub fn output_name(&self) -> String {
        match self {
            Self::Field(field) => field.name().to_string(),
            Self::Function(func) => func.default_alias(),
        }
    }
}

impl From<Field> for Operand {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Self::Field(Field::from(name))
    }
}

impl From<Function> for Operand {
    fn from(func: Function) -> Self {
        Self::Function(func)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(field) => write!(f, "{field}"),
            Self::Function(func) => write!(f, "{func}"),
        }
    }
}

/// Comparison operators for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
    /// Equal (=), case-insensitive for strings.
    Equals,
    /// Not equal (!=).
    NotEquals,
    /// Greater than (>).
    Gt,
    /// Greater than or equal (>=).
    Gte,
    /// Less than (<).
    Lt,
    /// Less than or equal (<=).
    Lte,
    /// Case-insensitive substring match.
    Contains,
    /// Case-insensitive prefix match.
    StartsWith,
    /// Case-insensitive suffix match.
    EndsWith,
    /// Case-insensitive regular expression match.
    Regex,
    /// Membership in a list.
    In,
    /// Non-membership in a list.
    NotIn,
    /// Field is missing or null.
    IsNull,
    /// Field is present and not null.
    IsNotNull,
    /// Address lies inside a CIDR block.
    InSubnet,
}

impl ComparisonOperator {
    /// Every operator, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::Equals,
        Self::NotEquals,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Regex,
        Self::In,
        Self::NotIn,
        Self::IsNull,
        Self::IsNotNull,
        Self::InSubnet,
    ];

    /// Operators that take no right-hand side.
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// Operators whose right-hand side is a list.
    #[must_use]
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Numeric ordering operators.
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Contains => "CONTAINS",
            Self::StartsWith => "STARTS_WITH",
            Self::EndsWith => "ENDS_WITH",
            Self::Regex => "REGEX",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::InSubnet => "IN_SUBNET",
        };
        write!(f, "{op}")
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// A single constant.
    Literal(Literal),
    /// A list of constants (IN / NOT IN).
    List(Vec<Literal>),
    /// Another field of the same record.
    Field(Field),
}

impl From<Literal> for ConditionValue {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

impl From<Vec<Literal>> for ConditionValue {
    fn from(list: Vec<Literal>) -> Self {
        Self::List(list)
    }
}

impl From<Field> for ConditionValue {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl std::fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::List(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", items.join(", "))
            }
            Self::Field(field) => write!(f, "{field}"),
        }
    }
}

/// A single comparison (e.g. `severity = 'high'`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field or aggregate being compared.
    pub left: Operand,
    /// The comparison operator.
    pub operator: ComparisonOperator,
    /// Value to compare against; absent for IS NULL / IS NOT NULL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<ConditionValue>,
}

impl Condition {
    /// Creates a binary condition.
    #[must_use]
    pub fn new(
        left: impl Into<Operand>,
        operator: ComparisonOperator,
        right: impl Into<ConditionValue>,
    ) -> Self {
        Self {
            left: left.into(),
            operator,
            right: Some(right.into()),
        }
    }

    /// Creates a condition without a right-hand side.
    #[must_use]
    pub fn unary(left: impl Into<Operand>, operator: ComparisonOperator) -> Self {
        Self {
            left: left.into(),
            operator,
            right: None,
        }
    }

    /// Shorthand for `field = value`.
    #[must_use]
    pub fn equals(field: &str, value: impl Into<Literal>) -> Self {
        Self::new(field, ComparisonOperator::Equals, value.into())
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.right {
            Some(right) => write!(f, "{} {} {}", self.left, self.operator, right),
            None => write!(f, "{} {}", self.left, self.operator),
        }
    }
}

/// Logical operators for combining expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
    /// Negates its single child.
    Not,
}

impl std::fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
        }
    }
}

/// A logical combination of expressions.
///
/// NOT must have exactly one child; AND/OR need at least one. A NOT node with
/// extra children only evaluates the first one (validation reports a warning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpression {
    /// How the children are combined.
    pub operator: LogicalOperator,
    /// Child expressions.
    pub conditions: Vec<Expression>,
}

/// A filter expression used in WHERE and HAVING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expression {
    /// A single comparison.
    Condition(Condition),
    /// A logical combination.
    Logical(LogicalExpression),
}

impl Expression {
    /// Combines expressions with AND.
    #[must_use]
    pub fn and(conditions: Vec<Expression>) -> Self {
        Self::Logical(LogicalExpression {
            operator: LogicalOperator::And,
            conditions,
        })
    }

    /// Combines expressions with OR.
    #[must_use]
    pub fn or(conditions: Vec<Expression>) -> Self {
        Self::Logical(LogicalExpression {
            operator: LogicalOperator::Or,
            conditions,
        })
    }

    /// Negates an expression.
    #[must_use]
    pub fn not(inner: Expression) -> Self {
        Self::Logical(LogicalExpression {
            operator: LogicalOperator::Not,
            conditions: vec![inner],
        })
    }

    /// Visits every condition in the tree, depth first.
    pub fn for_each_condition<'a>(&'a self, visit: &mut impl FnMut(&'a Condition)) {
        match self {
            Self::Condition(condition) => visit(condition),
            Self::Logical(logical) => {
                for child in &logical.conditions {
                    child.for_each_condition(visit);
                }
            }
        }
    }
}

impl From<Condition> for Expression {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Condition(c) => write!(f, "{c}"),
            Self::Logical(logical) => {
                if logical.operator == LogicalOperator::Not {
                    return match logical.conditions.first() {
                        Some(inner) => write!(f, "NOT ({inner})"),
                        None => write!(f, "NOT ()"),
                    };
                }
                let parts: Vec<String> = logical.conditions.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(&format!(" {} ", logical.operator)))
            }
        }
    }
}

/// A SELECT item with an optional alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectField {
    /// Field or aggregate to project.
    pub field: Operand,
    /// Output name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl SelectField {
    /// Name of the column in the output row.
    #[must_use]
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.field.output_name())
    }
}

impl std::fmt::Display for SelectField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {alias}", self.field),
            None => write!(f, "{}", self.field),
        }
    }
}

/// GROUP BY clause with optional HAVING filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    /// Fields forming the group key.
    pub fields: Vec<Field>,
    /// Filter applied to each group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Expression>,
}

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order (newest first for timestamps).
    #[default]
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

/// One ORDER BY key. The first key in a list is the primary sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// The field to sort by.
    pub field: Field,
    /// The sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl std::fmt::Display for OrderBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.direction)
    }
}

/// Errors resolving a time range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    /// The relative duration is not `<N><m|h|d>`.
    #[error("Invalid relative duration '{0}': expected a number followed by m, h or d")]
    InvalidDuration(String),

    /// The absolute range starts after it ends.
    #[error("Time range start is after its end")]
    Inverted,

    /// The relative duration reaches before the earliest representable time.
    #[error("Relative duration '{0}' reaches outside the supported time range")]
    OutOfRange(String),
}

/// Time window applied to the event timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeRange {
    /// Explicit bounds, both inclusive.
    Absolute {
        /// Earliest event time.
        start: DateTime<Utc>,
        /// Latest event time.
        end: DateTime<Utc>,
    },
    /// Everything newer than `now - last`.
    Relative {
        /// Duration string such as `15m`, `1h` or `7d`.
        last: String,
    },
}

impl TimeRange {
    /// Creates a relative range.
    #[must_use]
    pub fn last(duration: impl Into<String>) -> Self {
        Self::Relative {
            last: duration.into(),
        }
    }

    /// Resolves the range into a lower bound and an optional upper bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative duration cannot be parsed or the
    /// absolute range is inverted.
    pub fn bounds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>), TimeRangeError> {
        match self {
            Self::Absolute { start, end } => {
                if start > end {
                    return Err(TimeRangeError::Inverted);
                }
                Ok((*start, Some(*end)))
            }
            Self::Relative { last } => {
                let start = now
                    .checked_sub_signed(parse_relative_duration(last)?)
                    .ok_or_else(|| TimeRangeError::OutOfRange(last.clone()))?;
                Ok((start, None))
            }
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute { start, end } => {
                write!(f, "{} .. {}", start.to_rfc3339(), end.to_rfc3339())
            }
            Self::Relative { last } => write!(f, "last {last}"),
        }
    }
}

/// Parses `<N><m|h|d>` (case-insensitive unit) into a duration.
///
/// # Errors
///
/// Returns [`TimeRangeError::InvalidDuration`] for anything else.
pub fn parse_relative_duration(input: &str) -> Result<Duration, TimeRangeError> {
    let invalid = || TimeRangeError::InvalidDuration(input.to_string());
    let trimmed = input.trim();
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let amount: i64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    if amount < 0 {
        return Err(invalid());
    }

    match unit.to_ascii_lowercase() {
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        _ => None,
    }
    .ok_or_else(invalid)
}

/// A complete query against the security event store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryAst {
    /// Identifier assigned by the query manager when absent.
    #[serde(default)]
    pub query_id: Option<String>,
    /// Tenant every result is scoped to.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Projection; empty means all fields.
    #[serde(default)]
    pub select: Vec<SelectField>,
    /// Row filter.
    #[serde(default, rename = "where")]
    pub where_clause: Option<Expression>,
    /// Grouping and group filter.
    #[serde(default)]
    pub group_by: Option<GroupBy>,
    /// Sort keys, primary first.
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    /// Maximum rows returned.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Rows skipped before the limit applies.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Time window on the event timestamp.
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Text the AST was parsed from, if any.
    #[serde(default)]
    pub source_text: Option<String>,
}

impl QueryAst {
    /// Creates an unscoped query selecting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query scoped to a tenant.
    #[must_use]
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    /// Sets the query id.
    #[must_use]
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    /// Adds a SELECT item.
    #[must_use]
    pub fn with_select(mut self, field: impl Into<Operand>, alias: Option<&str>) -> Self {
        self.select.push(SelectField {
            field: field.into(),
            alias: alias.map(str::to_string),
        });
        self
    }

    /// Sets the WHERE expression.
    #[must_use]
    pub fn with_where(mut self, expression: impl Into<Expression>) -> Self {
        self.where_clause = Some(expression.into());
        self
    }

    /// Sets the GROUP BY fields.
    #[must_use]
    pub fn with_group_by(mut self, fields: &[&str]) -> Self {
        self.group_by = Some(GroupBy {
            fields: fields.iter().map(|f| Field::from(*f)).collect(),
            having: None,
        });
        self
    }

    /// Sets the HAVING filter, creating an empty GROUP BY if needed.
    #[must_use]
    pub fn with_having(mut self, having: impl Into<Expression>) -> Self {
        let group_by = self.group_by.get_or_insert_with(|| GroupBy {
            fields: Vec::new(),
            having: None,
        });
        group_by.having = Some(having.into());
        self
    }

    /// Appends an ORDER BY key.
    #[must_use]
    pub fn with_order_by(mut self, field: impl Into<Field>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sets the LIMIT.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the OFFSET.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the time range.
    #[must_use]
    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    /// Returns true if any SELECT item is an aggregate.
    #[must_use]
    pub fn has_aggregates(&self) -> bool {
        self.select
            .iter()
            .any(|s| matches!(s.field, Operand::Function(_)))
    }
}

impl std::fmt::Display for QueryAst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.select.is_empty() {
            write!(f, "SELECT *")?;
        } else {
            let items: Vec<String> = self.select.iter().map(ToString::to_string).collect();
            write!(f, "SELECT {}", items.join(", "))?;
        }

        if let Some(ref where_clause) = self.where_clause {
            write!(f, " WHERE {where_clause}")?;
        }

        if let Some(ref group_by) = self.group_by {
            let fields: Vec<&str> = group_by.fields.iter().map(Field::name).collect();
            write!(f, " GROUP BY {}", fields.join(", "))?;
            if let Some(ref having) = group_by.having {
                write!(f, " HAVING {having}")?;
            }
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }

        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }

        if let Some(ref time_range) = self.time_range {
            write!(f, " [{time_range}]")?;
        }

        Ok(())
    }
}
