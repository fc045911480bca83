//! Backend-independent query validation.
//!
//! Structural problems become errors; things that are legal but expensive or
//! surprising become warnings. Validation never fails by itself, every
//! finding ends up in the returned [`ValidationReport`].

use super::ast::{
    is_identifier, AggregateFunction, ComparisonOperator, Condition, ConditionValue, Expression,
    Field, Function, FunctionArg, Literal, LogicalOperator, Operand, QueryAst,
};
use super::fields::{column_for, FIELD_MAPPINGS};
use super::semantics::{compile_regex, literal_as_f64, Cidr};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default row count above which a LIMIT triggers a warning.
pub const DEFAULT_LARGE_LIMIT: usize = 10_000;

/// Outcome of validating a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when there are no errors.
    pub valid: bool,
    /// Problems that prevent execution.
    pub errors: Vec<String>,
    /// Performance or behaviour concerns.
    pub warnings: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationReport {
    /// Creates an empty, valid report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error and marks the report invalid.
    pub fn error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    /// Records a warning.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Joins all errors into one message.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Thresholds used by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// LIMIT values above this produce a warning.
    pub large_limit: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            large_limit: DEFAULT_LARGE_LIMIT,
        }
    }
}

/// Validates a query against the rules every backend shares.
#[must_use]
pub fn validate_ast(ast: &QueryAst, limits: &ValidationLimits) -> ValidationReport {
    let mut report = ValidationReport::new();

    match ast.tenant_id.as_deref() {
        Some(tenant) if tenant.trim().is_empty() => {
            report.error("tenant_id must not be empty");
        }
        Some(_) => {}
        None => report.warning("Query is not scoped to a tenant"),
    }

    validate_select(ast, &mut report);

    if let Some(ref where_clause) = ast.where_clause {
        validate_expression(where_clause, false, &mut report);
    }

    if let Some(ref group_by) = ast.group_by {
        for field in &group_by.fields {
            check_field(field, &mut report);
        }
        if let Some(ref having) = group_by.having {
            validate_expression(having, true, &mut report);
        }
    }

    validate_order_by(ast, &mut report);

    match ast.time_range {
        Some(ref time_range) => {
            if let Err(e) = time_range.bounds(Utc::now()) {
                report.error(e.to_string());
            }
        }
        None => report.warning("No time range: the query scans the full event history"),
    }

    match ast.limit {
        Some(limit) if limit > limits.large_limit => report.warning(format!(
            "LIMIT {limit} exceeds {}; consider paginating",
            limits.large_limit
        )),
        Some(_) => {}
        None => {
            report.warning("No LIMIT: result size is unbounded");
            if ast.offset.is_some() {
                report.warning("OFFSET without LIMIT");
            }
        }
    }

    report
}

fn check_field(field: &Field, report: &mut ValidationReport) {
    if !field.is_valid_identifier() {
        report.error(format!("Invalid field name '{field}'"));
    }
}

fn validate_select(ast: &QueryAst, report: &mut ValidationReport) {
    let group_fields: Option<HashSet<&str>> = ast
        .group_by
        .as_ref()
        .map(|g| g.fields.iter().map(Field::name).collect());

    let referenced = referenced_names(ast);

    for item in &ast.select {
        if let Some(ref alias) = item.alias {
            if !is_identifier(alias) {
                report.error(format!("Invalid alias '{alias}'"));
            } else if shadows_field(alias, &item.field, &referenced) {
                report.error(format!("Alias '{alias}' shadows a field name"));
            }
        }

        match &item.field {
            Operand::Field(field) => {
                check_field(field, report);
                match group_fields {
                    Some(ref fields) if !fields.contains(field.name()) => report.error(format!(
                        "Field '{field}' must appear in GROUP BY or inside an aggregate"
                    )),
                    None if ast.has_aggregates() => report.error(format!(
                        "Field '{field}' cannot be mixed with aggregates without GROUP BY"
                    )),
                    _ => {}
                }
            }
            Operand::Function(func) => validate_function(func, report),
        }
    }
}

/// An alias may repeat its own field but no other column name, since SQL
/// resolves WHERE identifiers against SELECT aliases first.
fn shadows_field(alias: &str, item: &Operand, referenced: &HashSet<&str>) -> bool {
    if let Operand::Field(field) = item {
        if alias == field.name() || alias == column_for(field.name()) {
            return false;
        }
    }
    referenced.contains(alias)
        || FIELD_MAPPINGS
            .iter()
            .any(|(logical, column)| alias == *logical || alias == *column)
}

/// Logical and physical names of every field the query reads.
fn referenced_names(ast: &QueryAst) -> HashSet<&str> {
    let mut names = HashSet::new();
    for item in &ast.select {
        add_operand(&item.field, &mut names);
    }
    if let Some(ref where_clause) = ast.where_clause {
        add_expression(where_clause, &mut names);
    }
    if let Some(ref group_by) = ast.group_by {
        for field in &group_by.fields {
            add_field(field, &mut names);
        }
    }
    names
}

fn add_field<'a>(field: &'a Field, names: &mut HashSet<&'a str>) {
    names.insert(field.name());
    names.insert(column_for(field.name()));
}

fn add_operand<'a>(operand: &'a Operand, names: &mut HashSet<&'a str>) {
    match operand {
        Operand::Field(field) => add_field(field, names),
        Operand::Function(func) => {
            if let Some(field) = func.field_arg() {
                add_field(field, names);
            }
        }
    }
}

fn add_expression<'a>(expr: &'a Expression, names: &mut HashSet<&'a str>) {
    match expr {
        Expression::Condition(condition) => {
            add_operand(&condition.left, names);
            if let Some(ConditionValue::Field(field)) = &condition.right {
                add_field(field, names);
            }
        }
        Expression::Logical(logical) => {
            for child in &logical.conditions {
                add_expression(child, names);
            }
        }
    }
}

fn validate_function(func: &Function, report: &mut ValidationReport) {
    for arg in &func.args {
        match arg {
            FunctionArg::Field(field) => check_field(field, report),
            FunctionArg::Function(inner) => report.error(format!(
                "Nested aggregate '{inner}' inside '{}' is not supported",
                func.name
            )),
            FunctionArg::Literal(_) => {
                if func.name != AggregateFunction::Count {
                    report.error(format!("'{}' needs a field argument", func.name));
                }
            }
        }
    }

    match func.name {
        AggregateFunction::Count => {
            if func.args.len() > 1 {
                report.error("count takes at most one argument");
            }
        }
        _ => {
            if func.args.len() != 1 || func.field_arg().is_none() {
                report.error(format!("'{}' takes exactly one field argument", func.name));
            }
        }
    }
}

fn validate_expression(expr: &Expression, in_having: bool, report: &mut ValidationReport) {
    match expr {
        Expression::Condition(condition) => validate_condition(condition, in_having, report),
        Expression::Logical(logical) => {
            match (logical.operator, logical.conditions.len()) {
                (LogicalOperator::Not, 0) => report.error("NOT requires exactly one condition"),
                (LogicalOperator::Not, n) if n > 1 => report.warning(format!(
                    "NOT has {n} conditions; only the first one is evaluated"
                )),
                (LogicalOperator::And | LogicalOperator::Or, 0) => {
                    report.error(format!("{} requires at least one condition", logical.operator));
                }
                _ => {}
            }
            for child in &logical.conditions {
                validate_expression(child, in_having, report);
            }
        }
    }
}

fn validate_condition(condition: &Condition, in_having: bool, report: &mut ValidationReport) {
    match &condition.left {
        Operand::Field(field) => check_field(field, report),
        Operand::Function(func) => {
            if !in_having {
                report.error(format!(
                    "Aggregate '{func}' is only allowed in HAVING, not WHERE"
                ));
            }
            validate_function(func, report);
        }
    }

    let op = condition.operator;
    let right = match (&condition.right, op.is_unary()) {
        (Some(_), true) => {
            report.error(format!("'{condition}': {op} takes no value"));
            return;
        }
        (None, true) => return,
        (None, false) => {
            report.error(format!("'{}' {op} requires a value", condition.left));
            return;
        }
        (Some(right), false) => right,
    };

    match (op.takes_list(), right) {
        (true, ConditionValue::List(items)) if items.is_empty() => {
            report.error(format!("'{condition}': {op} list must not be empty"));
        }
        (true, ConditionValue::List(_)) => {}
        (true, _) => report.error(format!("'{condition}': {op} requires a list of values")),
        (false, ConditionValue::List(_)) => {
            report.error(format!("'{condition}': {op} does not accept a list"));
        }
        (false, ConditionValue::Field(field)) => {
            check_field(field, report);
            if matches!(
                op,
                ComparisonOperator::Contains
                    | ComparisonOperator::StartsWith
                    | ComparisonOperator::EndsWith
                    | ComparisonOperator::Regex
                    | ComparisonOperator::InSubnet
            ) {
                report.error(format!("'{condition}': {op} requires a literal value"));
            }
        }
        (false, ConditionValue::Literal(literal)) => {
            validate_literal_for(op, literal, condition, report);
        }
    }
}

fn validate_literal_for(
    op: ComparisonOperator,
    literal: &Literal,
    condition: &Condition,
    report: &mut ValidationReport,
) {
    match op {
        ComparisonOperator::Regex => match literal.as_str() {
            Some(pattern) => {
                if let Err(e) = compile_regex(pattern) {
                    report.error(format!("Invalid regular expression '{pattern}': {e}"));
                }
            }
            None => report.error(format!("'{condition}': REGEX requires a string pattern")),
        },
        ComparisonOperator::InSubnet => match literal.as_str() {
            Some(block) => {
                if let Err(e) = block.parse::<Cidr>() {
                    report.error(e.to_string());
                }
            }
            None => report.error(format!("'{condition}': IN_SUBNET requires a CIDR string")),
        },
        op if op.is_ordering() => {
            let comparable =
                matches!(literal, Literal::Timestamp(_)) || literal_as_f64(literal).is_some();
            if !comparable {
                report.error(format!(
                    "'{condition}': {op} needs a numeric or timestamp value"
                ));
            }
        }
        _ => {}
    }
}

fn validate_order_by(ast: &QueryAst, report: &mut ValidationReport) {
    for key in &ast.order_by {
        check_field(&key.field, report);
    }

    let grouped = ast.group_by.is_some() || ast.has_aggregates();
    if !grouped {
        return;
    }

    let mut outputs: HashSet<String> = ast.select.iter().map(|s| s.output_name()).collect();
    if let Some(ref group_by) = ast.group_by {
        outputs.extend(group_by.fields.iter().map(|f| f.name().to_string()));
        if ast.select.is_empty() {
            outputs.insert("count".to_string());
        }
    }

    for key in &ast.order_by {
        if !outputs.contains(key.field.name()) {
            report.error(format!(
                "ORDER BY '{}' must refer to a grouped field or selected aggregate",
                key.field
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{SortDirection, TimeRange};

    fn scoped() -> QueryAst {
        QueryAst::for_tenant("t1")
            .with_time_range(TimeRange::last("1h"))
            .with_limit(100)
    }

    #[test]
    fn test_clean_query_has_no_findings() {
        let report = validate_ast(
            &scoped().with_where(Condition::equals("severity", "high")),
            &ValidationLimits::default(),
        );
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_performance_warnings() {
        let report = validate_ast(&QueryAst::for_tenant("t1"), &ValidationLimits::default());
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("No time range")));
        assert!(report.warnings.iter().any(|w| w.contains("No LIMIT")));

        let report = validate_ast(
            &scoped().with_limit(50_000),
            &ValidationLimits { large_limit: 1_000 },
        );
        assert!(report.warnings.iter().any(|w| w.contains("LIMIT 50000")));
    }

    #[test]
    fn test_not_with_extra_children_warns() {
        let expr = Expression::Logical(crate::query::ast::LogicalExpression {
            operator: LogicalOperator::Not,
            conditions: vec![
                Condition::equals("severity", "low").into(),
                Condition::equals("status", "closed").into(),
            ],
        });
        let report = validate_ast(&scoped().with_where(expr), &ValidationLimits::default());
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("only the first")));
    }

    #[test]
    fn test_empty_logical_nodes_are_errors() {
        let report = validate_ast(
            &scoped().with_where(Expression::and(Vec::new())),
            &ValidationLimits::default(),
        );
        assert!(!report.valid);

        let empty_not = Expression::Logical(crate::query::ast::LogicalExpression {
            operator: LogicalOperator::Not,
            conditions: Vec::new(),
        });
        let report = validate_ast(&scoped().with_where(empty_not), &ValidationLimits::default());
        assert!(!report.valid);
    }

    #[test]
    fn test_operator_value_mismatches() {
        let cases = vec![
            Condition::new("user.name", ComparisonOperator::In, Literal::from("alice")),
            Condition::new("user.name", ComparisonOperator::Equals, vec![Literal::from("a")]),
            Condition::new("user.name", ComparisonOperator::In, Vec::<Literal>::new()),
            Condition::new("process.name", ComparisonOperator::Regex, Literal::from("(")),
            Condition::new("src_endpoint.ip", ComparisonOperator::InSubnet, Literal::from("10/99")),
            Condition::new("severity_id", ComparisonOperator::Gt, Literal::from("high")),
            Condition::unary("file.hash", ComparisonOperator::Equals),
            Condition {
                left: Operand::from("file.hash"),
                operator: ComparisonOperator::IsNull,
                right: Some(ConditionValue::Literal(Literal::from("x"))),
            },
            Condition::new("bad field", ComparisonOperator::Equals, Literal::from("x")),
        ];

        for condition in cases {
            let text = condition.to_string();
            let report = validate_ast(&scoped().with_where(condition), &ValidationLimits::default());
            assert!(!report.valid, "expected error for {text}");
        }
    }

    #[test]
    fn test_aggregate_rules() {
        let in_where = scoped().with_where(Condition::new(
            Function::count(),
            ComparisonOperator::Gt,
            Literal::Integer(1),
        ));
        assert!(!validate_ast(&in_where, &ValidationLimits::default()).valid);

        let in_having = scoped()
            .with_group_by(&["user.name"])
            .with_having(Condition::new(
                Function::count(),
                ComparisonOperator::Gt,
                Literal::Integer(1),
            ));
        assert!(validate_ast(&in_having, &ValidationLimits::default()).valid);

        let ungrouped_field = scoped()
            .with_select("severity", None)
            .with_select(Function::count(), None);
        assert!(!validate_ast(&ungrouped_field, &ValidationLimits::default()).valid);

        let sum_without_field = scoped().with_select(Function::new(AggregateFunction::Sum), None);
        assert!(!validate_ast(&sum_without_field, &ValidationLimits::default()).valid);
    }

    #[test]
    fn test_alias_must_not_shadow_columns() {
        let limits = ValidationLimits::default();

        let tenant = scoped().with_select("user.name", Some("tenant_id"));
        let report = validate_ast(&tenant, &limits);
        assert!(!report.valid);
        assert!(report.errors[0].contains("shadows"));

        let time = scoped().with_select("severity", Some("time"));
        assert!(!validate_ast(&time, &limits).valid);

        let physical = scoped()
            .with_group_by(&["severity"])
            .with_select("severity", None)
            .with_select(Function::count(), Some("actor_user_name"));
        assert!(!validate_ast(&physical, &limits).valid);

        let unmapped = scoped()
            .with_where(Condition::equals("custom_tag", "x"))
            .with_select("severity", Some("custom_tag"));
        assert!(!validate_ast(&unmapped, &limits).valid);

        let own_field = scoped()
            .with_select("severity", Some("severity"))
            .with_select("user.name", Some("actor_user_name"))
            .with_select("message", Some("summary"));
        assert!(validate_ast(&own_field, &limits).valid);
    }

    #[test]
    fn test_order_by_must_match_group_output() {
        let ok = scoped()
            .with_group_by(&["user.name"])
            .with_order_by("count", SortDirection::Desc);
        assert!(validate_ast(&ok, &ValidationLimits::default()).valid);

        let bad = scoped()
            .with_group_by(&["user.name"])
            .with_order_by("severity", SortDirection::Desc);
        assert!(!validate_ast(&bad, &ValidationLimits::default()).valid);
    }

    #[test]
    fn test_invalid_time_range_is_error() {
        let ast = QueryAst::for_tenant("t1")
            .with_time_range(TimeRange::last("3 weeks"))
            .with_limit(10);
        let report = validate_ast(&ast, &ValidationLimits::default());
        assert!(!report.valid);
    }

    #[test]
    fn test_time_range_before_earliest_date_is_error() {
        let ast = scoped().with_time_range(TimeRange::last("100000000d"));
        let report = validate_ast(&ast, &ValidationLimits::default());
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("100000000d")));
    }
}
