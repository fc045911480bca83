//! Translates a [`QueryAst`] into `ClickHouse` SQL.
//!
//! Every value from the AST ends up in the statement as a literal, so the
//! compiler is the only line of defence against injection:
//!
//! - field names must be dotted identifiers and go through
//!   [`column_for`](crate::query::fields::column_for)
//! - aliases must be identifiers and are backtick-quoted
//! - string literals have `\` and `'` doubled
//!
//! Comparisons are lowered so the database agrees with the in-memory
//! provider: strings compare case-insensitively, ordering operators coerce
//! through `toFloat64OrNull` (a failed coercion is `NULL`, so the row is
//! dropped) and missing columns are `NULL`.

use crate::query::fields::column_for;
use crate::query::semantics::{literal_as_f64, Cidr};
use crate::query::{
    is_identifier, AggregateFunction, ComparisonOperator, Condition, ConditionValue, Expression,
    Field, Function, FunctionArg, Literal, LogicalOperator, Operand, QueryAst, SortDirection,
    TimeRangeError,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;

/// Table queried when none is configured.
pub const DEFAULT_TABLE: &str = "security_events";

/// Errors compiling a query to SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A field name is not a safe identifier.
    #[error("Invalid field name '{0}'")]
    InvalidField(String),

    /// An alias is not a safe identifier.
    #[error("Invalid alias '{0}'")]
    InvalidAlias(String),

    /// The operator needs a right-hand side.
    #[error("'{0}' requires a value")]
    MissingValue(String),

    /// The right-hand side does not fit the operator.
    #[error("Unsupported value in '{0}'")]
    UnsupportedValue(String),

    /// IN / NOT IN with an empty list.
    #[error("Empty list in '{0}'")]
    EmptyList(String),

    /// A function call that has no SQL translation.
    #[error("Unsupported function call '{0}'")]
    UnsupportedFunction(String),

    /// A logical node without children.
    #[error("{0} without conditions")]
    EmptyLogical(LogicalOperator),

    /// The CIDR block of IN_SUBNET is invalid.
    #[error("Invalid CIDR block '{0}'")]
    InvalidCidr(String),

    /// The time range could not be resolved.
    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),
}

/// SQL generated for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// The statement returning the requested page.
    pub sql: String,
    /// Statement counting every matching row, ignoring LIMIT and OFFSET.
    pub count_sql: String,
    /// True when rows come back keyed by physical column (`SELECT *`).
    pub physical_columns: bool,
}

/// Compiles query ASTs into `ClickHouse` SQL against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCompiler {
    table: String,
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl SqlCompiler {
    /// Creates a compiler targeting `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Returns the target table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Compiles a query, resolving relative time ranges against `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the query cannot be expressed safely.
    pub fn compile(
        &self,
        ast: &QueryAst,
        now: DateTime<Utc>,
    ) -> Result<CompiledQuery, CompileError> {
        if !is_identifier(&self.table) {
            return Err(CompileError::InvalidField(self.table.clone()));
        }

        let grouped = ast.group_by.is_some() || ast.has_aggregates();
        let outputs = output_names(ast);
        let scope = Scope {
            outputs: &outputs,
            in_having: false,
            table: Some(self.table.as_str()),
        };

        let mut sql = format!("SELECT {} FROM {}", select_list(ast)?, self.table);

        let mut filters = Vec::new();
        if let Some(ref tenant) = ast.tenant_id {
            filters.push(format!(
                "{}.{} = {}",
                self.table,
                column_for("tenant_id"),
                quote(tenant)
            ));
        }
        if let Some(ref range) = ast.time_range {
            let (start, end) = range.bounds(now)?;
            let time = format!("{}.{}", self.table, column_for("time"));
            filters.push(format!("{time} >= {}", timestamp_sql(&start)));
            if let Some(end) = end {
                filters.push(format!("{time} <= {}", timestamp_sql(&end)));
            }
        }
        if let Some(ref where_clause) = ast.where_clause {
            let compiled = expression(where_clause, &scope)?;
            filters.push(if filters.is_empty() {
                compiled
            } else {
                format!("({compiled})")
            });
        }
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }

        if let Some(ref group_by) = ast.group_by {
            if !group_by.fields.is_empty() {
                let columns = group_by
                    .fields
                    .iter()
                    .map(column)
                    .collect::<Result<Vec<_>, _>>()?;
                sql.push_str(" GROUP BY ");
                sql.push_str(&columns.join(", "));
            }
            if let Some(ref having) = group_by.having {
                let having_scope = Scope {
                    outputs: &outputs,
                    in_having: true,
                    table: None,
                };
                sql.push_str(" HAVING ");
                sql.push_str(&expression(having, &having_scope)?);
            }
        }

        if !ast.order_by.is_empty() {
            let keys = ast
                .order_by
                .iter()
                .map(|key| {
                    let target = if outputs.contains(key.field.name()) {
                        backtick(key.field.name())
                    } else {
                        column(&key.field)?
                    };
                    let direction = match key.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    Ok(format!("{target} {direction} NULLS LAST"))
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        let count_sql = format!("SELECT count() AS total FROM ({sql})");

        match (ast.limit, ast.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" OFFSET {offset} ROWS")),
            (None, None) => {}
        }

        Ok(CompiledQuery {
            sql,
            count_sql,
            physical_columns: ast.select.is_empty() && !grouped,
        })
    }
}

/// Names a statement can refer to by alias (select outputs and group keys).
fn output_names(ast: &QueryAst) -> HashSet<String> {
    let mut outputs: HashSet<String> = ast.select.iter().map(|item| item.output_name()).collect();
    if let Some(ref group_by) = ast.group_by {
        if ast.select.is_empty() {
            outputs.extend(group_by.fields.iter().map(|f| f.name().to_string()));
            outputs.insert("count".to_string());
        }
    }
    outputs
}

fn select_list(ast: &QueryAst) -> Result<String, CompileError> {
    if ast.select.is_empty() {
        let Some(ref group_by) = ast.group_by else {
            return Ok("*".to_string());
        };
        let mut items = group_by
            .fields
            .iter()
            .map(|field| Ok(format!("{} AS {}", column(field)?, backtick(field.name()))))
            .collect::<Result<Vec<_>, CompileError>>()?;
        items.push(format!("count() AS {}", backtick("count")));
        return Ok(items.join(", "));
    }

    let items = ast
        .select
        .iter()
        .map(|item| {
            if let Some(ref alias) = item.alias {
                if !is_identifier(alias) {
                    return Err(CompileError::InvalidAlias(alias.clone()));
                }
            }
            let expr = match &item.field {
                Operand::Field(field) => column(field)?,
                Operand::Function(func) => function(func)?,
            };
            Ok(format!("{expr} AS {}", backtick(&item.output_name())))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(items.join(", "))
}

/// Where names in a filter resolve to.
///
/// WHERE columns carry the table name so a SELECT alias can never stand in
/// for a physical column.
struct Scope<'a> {
    outputs: &'a HashSet<String>,
    in_having: bool,
    table: Option<&'a str>,
}

impl Scope<'_> {
    fn field(&self, field: &Field) -> Result<String, CompileError> {
        if self.in_having && self.outputs.contains(field.name()) {
            return Ok(backtick(field.name()));
        }
        let name = column(field)?;
        Ok(match self.table {
            Some(table) => format!("{table}.{name}"),
            None => name,
        })
    }

    fn operand(&self, operand: &Operand) -> Result<String, CompileError> {
        match operand {
            Operand::Field(field) => self.field(field),
            Operand::Function(func) => function(func),
        }
    }
}

fn column(field: &Field) -> Result<String, CompileError> {
    if field.is_valid_identifier() {
        Ok(column_for(field.name()).to_string())
    } else {
        Err(CompileError::InvalidField(field.name().to_string()))
    }
}

fn function(func: &Function) -> Result<String, CompileError> {
    let arg = match (func.name, func.args.as_slice()) {
        (AggregateFunction::Count, [] | [FunctionArg::Literal(_)]) => {
            return Ok("count()".to_string());
        }
        (_, [FunctionArg::Field(field)]) => column(field)?,
        _ => return Err(CompileError::UnsupportedFunction(func.to_string())),
    };

    let name = match func.name {
        AggregateFunction::Count => "count",
        AggregateFunction::Sum => "sum",
        AggregateFunction::Avg => "avg",
        AggregateFunction::Min => "min",
        AggregateFunction::Max => "max",
        AggregateFunction::CountDistinct => "uniqExact",
        AggregateFunction::First => "any",
        AggregateFunction::Last => "anyLast",
    };
    Ok(format!("{name}({arg})"))
}

fn expression(expr: &Expression, scope: &Scope<'_>) -> Result<String, CompileError> {
    match expr {
        Expression::Condition(c) => condition(c, scope),
        Expression::Logical(logical) => {
            if logical.operator == LogicalOperator::Not {
                // Only the first child is negated; validation warns about the rest.
                let inner = logical
                    .conditions
                    .first()
                    .ok_or(CompileError::EmptyLogical(LogicalOperator::Not))?;
                return Ok(format!("NOT ({})", expression(inner, scope)?));
            }
            if logical.conditions.is_empty() {
                return Err(CompileError::EmptyLogical(logical.operator));
            }
            let parts = logical
                .conditions
                .iter()
                .map(|child| expression(child, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(&format!(" {} ", logical.operator))))
        }
    }
}

fn condition(c: &Condition, scope: &Scope<'_>) -> Result<String, CompileError> {
    let left = scope.operand(&c.left)?;
    let op = c.operator;

    if op.is_unary() {
        if c.right.is_some() {
            return Err(CompileError::UnsupportedValue(c.to_string()));
        }
        return Ok(format!("{left} {op}"));
    }

    let right = c
        .right
        .as_ref()
        .ok_or_else(|| CompileError::MissingValue(c.to_string()))?;
    let unsupported = || CompileError::UnsupportedValue(c.to_string());

    match op {
        ComparisonOperator::Equals | ComparisonOperator::NotEquals => {
            let sql_op = if op == ComparisonOperator::Equals { "=" } else { "!=" };
            match right {
                ConditionValue::Literal(literal) => Ok(equality(&left, sql_op, literal)),
                ConditionValue::Field(field) => Ok(format!(
                    "{} {sql_op} {}",
                    folded(&left),
                    folded(&scope.field(field)?)
                )),
                ConditionValue::List(_) => Err(unsupported()),
            }
        }
        ComparisonOperator::Gt
        | ComparisonOperator::Gte
        | ComparisonOperator::Lt
        | ComparisonOperator::Lte => match right {
            ConditionValue::Literal(Literal::Timestamp(ts)) => Ok(format!(
                "{} {op} {}",
                as_timestamp(&left),
                timestamp_sql(ts)
            )),
            ConditionValue::Literal(literal) => {
                let number = literal_as_f64(literal).ok_or_else(unsupported)?;
                Ok(format!("{} {op} {number}", as_number(&left)))
            }
            ConditionValue::Field(field) => Ok(format!(
                "{} {op} {}",
                as_number(&left),
                as_number(&scope.field(field)?)
            )),
            ConditionValue::List(_) => Err(unsupported()),
        },
        ComparisonOperator::Contains
        | ComparisonOperator::StartsWith
        | ComparisonOperator::EndsWith => {
            let ConditionValue::Literal(literal) = right else {
                return Err(unsupported());
            };
            let escaped = like_escape(&literal.raw());
            let pattern = match op {
                ComparisonOperator::Contains => format!("%{escaped}%"),
                ComparisonOperator::StartsWith => format!("{escaped}%"),
                _ => format!("%{escaped}"),
            };
            Ok(format!("toString({left}) ILIKE {}", quote(&pattern)))
        }
        ComparisonOperator::Regex => {
            let ConditionValue::Literal(Literal::String(pattern)) = right else {
                return Err(unsupported());
            };
            Ok(format!(
                "match(toString({left}), {})",
                quote(&format!("(?i){pattern}"))
            ))
        }
        ComparisonOperator::In | ComparisonOperator::NotIn => {
            let ConditionValue::List(items) = right else {
                return Err(unsupported());
            };
            if items.is_empty() {
                return Err(CompileError::EmptyList(c.to_string()));
            }
            let items: Vec<String> = items
                .iter()
                .map(|item| quote(&item.raw().to_lowercase()))
                .collect();
            Ok(format!("{} {op} ({})", folded(&left), items.join(", ")))
        }
        ComparisonOperator::InSubnet => {
            let ConditionValue::Literal(Literal::String(block)) = right else {
                return Err(unsupported());
            };
            let cidr: Cidr = block
                .parse()
                .map_err(|_| CompileError::InvalidCidr(block.clone()))?;
            Ok(format!(
                "isIPAddressInRange(toString({left}), {})",
                quote(&cidr.to_string())
            ))
        }
        ComparisonOperator::IsNull | ComparisonOperator::IsNotNull => Err(unsupported()),
    }
}

fn equality(left: &str, sql_op: &str, literal: &Literal) -> String {
    match literal {
        Literal::String(s) => format!("{} {sql_op} {}", folded(left), quote(&s.to_lowercase())),
        Literal::Integer(i) => format!("{} {sql_op} {i}", as_number(left)),
        Literal::Float(f) => format!("{} {sql_op} {f}", as_number(left)),
        Literal::Boolean(b) => format!("{left} {sql_op} {}", u8::from(*b)),
        Literal::Timestamp(ts) => format!("{} {sql_op} {}", as_timestamp(left), timestamp_sql(ts)),
        Literal::IpAddress(IpAddr::V4(ip)) => format!(
            "toIPv4OrNull(toString({left})) {sql_op} toIPv4({})",
            quote(&ip.to_string())
        ),
        Literal::IpAddress(IpAddr::V6(ip)) => format!(
            "toIPv6OrNull(toString({left})) {sql_op} toIPv6({})",
            quote(&ip.to_string())
        ),
    }
}

fn folded(expr: &str) -> String {
    format!("lowerUTF8(toString({expr}))")
}

fn as_number(expr: &str) -> String {
    format!("toFloat64OrNull(toString({expr}))")
}

fn as_timestamp(expr: &str) -> String {
    format!("parseDateTime64BestEffortOrNull(toString({expr}), 3, 'UTC')")
}

fn timestamp_sql(ts: &DateTime<Utc>) -> String {
    format!(
        "toDateTime64('{}', 3, 'UTC')",
        ts.format("%Y-%m-%d %H:%M:%S%.3f")
    )
}

/// Quotes a string literal, doubling `\` and `'`.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Escapes LIKE wildcards so the value matches literally.
fn like_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn backtick(name: &str) -> String {
    format!("`{name}`")
}
