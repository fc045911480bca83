//! Text query parser.
//!
//! Parses the small filter language used by analysts and saved searches:
//!
//! ```text
//! severity = "high" AND user.name IN (alice, bob)
//! src_endpoint.ip IN_SUBNET 10.0.0.0/8 AND message CONTAINS 'denied'
//! ```
//!
//! The parser is best effort. A fragment that cannot be understood is left out
//! of the WHERE clause instead of failing the whole query.
//!
//! `AND` and `OR` have the same precedence and there is no grouping: every
//! fragment is combined under a single top-level AND, whichever connector
//! separated it. Saved queries depend on this, so it is kept as-is and
//! reported as a note whenever `OR` appears.

use super::ast::{
    is_identifier, ComparisonOperator, Condition, ConditionValue, Expression, Field, Literal,
    QueryAst,
};
use chrono::{DateTime, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till, take_till1, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, value},
    multi::separated_list0,
    sequence::delimited,
    IResult, Parser,
};
use std::net::IpAddr;
use thiserror::Error;

/// Reasons a fragment was left out of the parsed query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The fragment is empty.
    #[error("Empty condition")]
    EmptyFragment,

    /// No field name at the start of the fragment.
    #[error("Invalid field name in '{0}'")]
    InvalidField(String),

    /// No known operator after the field name.
    #[error("Unknown operator in '{0}'")]
    UnknownOperator(String),

    /// The operator needs a value but none was given.
    #[error("Missing value in '{0}'")]
    MissingValue(String),

    /// Content left over after the condition.
    #[error("Unexpected trailing content: '{0}'")]
    TrailingContent(String),
}

/// A fragment that was dropped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFragment {
    /// The raw fragment text.
    pub fragment: String,
    /// Why it was dropped.
    pub reason: ParseError,
}

/// A parsed query together with what the parser had to drop or flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// The best AST the parser could build.
    pub ast: QueryAst,
    /// Fragments left out of the WHERE clause.
    pub skipped: Vec<SkippedFragment>,
    /// Behaviour the caller should be told about.
    pub notes: Vec<String>,
}

/// Parses a text query into a [`QueryAst`] scoped to `tenant_id`.
///
/// Never fails; see [`parse_with_diagnostics`] for what was dropped.
///
/// # Examples
///
/// ```
/// use shared::query::{parse, Expression};
///
/// let ast = parse("severity = \"high\"", Some("t1"));
/// assert_eq!(ast.tenant_id.as_deref(), Some("t1"));
/// assert!(matches!(ast.where_clause, Some(Expression::Condition(_))));
/// ```
#[must_use]
pub fn parse(text: &str, tenant_id: Option<&str>) -> QueryAst {
    parse_with_diagnostics(text, tenant_id).ast
}

/// Parses a text query and reports skipped fragments and notes.
#[must_use]
pub fn parse_with_diagnostics(text: &str, tenant_id: Option<&str>) -> ParseOutcome {
    let mut skipped = Vec::new();
    let mut notes = Vec::new();

    let (fragments, saw_or) = split_fragments(text);
    if saw_or {
        notes.push(
            "OR is evaluated like AND: fragments are combined left to right without precedence"
                .to_string(),
        );
        tracing::warn!(query = %text, "Text query uses OR, which is treated as AND");
    }

    let mut conditions: Vec<Expression> = Vec::new();
    for fragment in fragments {
        match parse_fragment(fragment) {
            Ok(condition) => conditions.push(condition.into()),
            Err(reason) => {
                tracing::debug!(fragment, error = %reason, "Skipping unparseable fragment");
                skipped.push(SkippedFragment {
                    fragment: fragment.to_string(),
                    reason,
                });
            }
        }
    }

    let where_clause = match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(Expression::and(conditions)),
    };

    let trimmed = text.trim();
    let ast = QueryAst {
        tenant_id: tenant_id.map(str::to_string),
        where_clause,
        source_text: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        ..QueryAst::default()
    };

    ParseOutcome {
        ast,
        skipped,
        notes,
    }
}

// ============================================================================
// Fragment splitting
// ============================================================================

/// Splits on `AND`/`OR` words outside quotes and `IN (...)` lists.
///
/// Returns the fragments and whether any `OR` connector was seen.
fn split_fragments(text: &str) -> (Vec<&str>, bool) {
    let mut fragments = Vec::new();
    let mut saw_or = false;
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut skip_until = 0usize;

    for (i, c) in text.char_indices() {
        if i < skip_until {
            continue;
        }
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') if depth > 0 || opens_list(&text[start..i]) => depth += 1,
            (None, ')') if depth > 0 => depth -= 1,
            (None, _) if c.is_whitespace() && depth == 0 => {
                if let Some(len) = connector_at(text, i + c.len_utf8()) {
                    let word_start = i + c.len_utf8();
                    if text[word_start..word_start + len].eq_ignore_ascii_case("or") {
                        saw_or = true;
                    }
                    fragments.push(&text[start..i]);
                    start = word_start + len;
                    skip_until = start;
                }
            }
            _ => {}
        }
    }
    fragments.push(&text[start..]);

    let fragments = fragments
        .into_iter()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    (fragments, saw_or)
}

/// True when `prefix` ends with the `IN` keyword, so a `(` opens a value list.
fn opens_list(prefix: &str) -> bool {
    let prefix = prefix.trim_end();
    let Some(cut) = prefix.len().checked_sub(2) else {
        return false;
    };
    prefix.get(cut..).is_some_and(|word| word.eq_ignore_ascii_case("in"))
        && prefix[..cut].ends_with(char::is_whitespace)
}

/// Returns the length of an `AND`/`OR` word starting at `pos` if it is
/// followed by whitespace.
fn connector_at(text: &str, pos: usize) -> Option<usize> {
    ["and", "or"].into_iter().find_map(|word| {
        let end = pos + word.len();
        let candidate = text.get(pos..end)?;
        let followed_by_space = text[end..].starts_with(char::is_whitespace);
        (candidate.eq_ignore_ascii_case(word) && followed_by_space).then_some(word.len())
    })
}

// ============================================================================
// Condition parser
// ============================================================================

fn parse_fragment(fragment: &str) -> Result<Condition, ParseError> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return Err(ParseError::EmptyFragment);
    }

    let (rest, field) =
        field_name(fragment).map_err(|_| ParseError::InvalidField(fragment.to_string()))?;
    if !is_identifier(field) {
        return Err(ParseError::InvalidField(fragment.to_string()));
    }

    let (rest, operator) = delimited(multispace0, comparison_operator, multispace0)
        .parse(rest)
        .map_err(|_| ParseError::UnknownOperator(fragment.to_string()))?;

    let field = Field::from(field);

    if operator.is_unary() {
        return if rest.trim().is_empty() {
            Ok(Condition::unary(field, operator))
        } else {
            Err(ParseError::TrailingContent(rest.trim().to_string()))
        };
    }

    if operator.takes_list() {
        let (remaining, items) =
            literal_list(rest).map_err(|_| ParseError::MissingValue(fragment.to_string()))?;
        if !remaining.trim().is_empty() {
            return Err(ParseError::TrailingContent(remaining.trim().to_string()));
        }
        return Ok(Condition::new(field, operator, ConditionValue::List(items)));
    }

    let raw = rest.trim();
    if raw.is_empty() {
        return Err(ParseError::MissingValue(fragment.to_string()));
    }

    let literal = match operator {
        ComparisonOperator::Contains
        | ComparisonOperator::StartsWith
        | ComparisonOperator::EndsWith
        | ComparisonOperator::Regex
        | ComparisonOperator::InSubnet => Literal::String(strip_quotes(raw).to_string()),
        _ => scalar_literal(raw),
    };

    Ok(Condition::new(field, operator, literal))
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.').parse(input)
}

fn comparison_operator(input: &str) -> IResult<&str, ComparisonOperator> {
    alt((
        value(
            ComparisonOperator::IsNotNull,
            (
                tag_no_case("IS"),
                multispace1,
                tag_no_case("NOT"),
                multispace1,
                tag_no_case("NULL"),
            ),
        ),
        value(
            ComparisonOperator::IsNull,
            (tag_no_case("IS"), multispace1, tag_no_case("NULL")),
        ),
        value(ComparisonOperator::NotEquals, alt((tag("!="), tag("<>")))),
        value(ComparisonOperator::Gte, tag(">=")),
        value(ComparisonOperator::Lte, tag("<=")),
        value(ComparisonOperator::Equals, alt((tag("=="), tag("=")))),
        value(ComparisonOperator::Gt, tag(">")),
        value(ComparisonOperator::Lt, tag("<")),
        value(ComparisonOperator::Contains, tag_no_case("CONTAINS")),
        value(ComparisonOperator::StartsWith, tag_no_case("STARTS_WITH")),
        value(ComparisonOperator::EndsWith, tag_no_case("ENDS_WITH")),
        value(
            ComparisonOperator::NotIn,
            (tag_no_case("NOT"), multispace1, tag_no_case("IN")),
        ),
        value(ComparisonOperator::InSubnet, tag_no_case("IN_SUBNET")),
        value(ComparisonOperator::In, tag_no_case("IN")),
        value(ComparisonOperator::Regex, tag_no_case("REGEX")),
    ))
    .parse(input)
}

fn literal_list(input: &str) -> IResult<&str, Vec<Literal>> {
    delimited(
        char('('),
        separated_list0(char(','), delimited(multispace0, list_item, multispace0)),
        char(')'),
    )
    .parse(input)
}

fn list_item(input: &str) -> IResult<&str, Literal> {
    alt((
        map(
            delimited(char('\''), take_till(|c: char| c == '\''), char('\'')),
            |s: &str| Literal::String(s.to_string()),
        ),
        map(
            delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
            |s: &str| Literal::String(s.to_string()),
        ),
        map(take_till1(|c: char| c == ',' || c == ')'), |s: &str| {
            scalar_literal(s.trim())
        }),
    ))
    .parse(input)
}

// ============================================================================
// Value parsers
// ============================================================================

/// Removes one pair of matching surrounding quotes.
fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Infers a literal from an unquoted token; quoted tokens are always strings.
fn scalar_literal(raw: &str) -> Literal {
    let unquoted = strip_quotes(raw);
    if unquoted.len() != raw.len() {
        return Literal::String(unquoted.to_string());
    }

    if raw.eq_ignore_ascii_case("true") {
        return Literal::Boolean(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Literal::Boolean(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Literal::Integer(i);
    }
    if raw.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(fl) = raw.parse::<f64>() {
            if fl.is_finite() {
                return Literal::Float(fl);
            }
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Literal::Timestamp(ts.with_timezone(&Utc));
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Literal::IpAddress(ip);
    }
    Literal::String(raw.to_string())
}

// ============================================================================
// Tests
// ============================================================================
