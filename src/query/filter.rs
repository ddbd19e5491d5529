//! Filter predicate compilation from query parameters
//!
//! Each parameter name resolves to a comparison operator by suffix
//! (`age_gt=30`, `status_in=a,b`, `email_exists=true`); unsuffixed
//! names are exact matches. Field names are validated against the
//! identifier grammar before use and operand values are carried as
//! typed data inside the predicate, never spliced into query text.

use regex_lite::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::error::{DbError, Result};
use crate::store::is_identifier;

/// Pagination controls, excluded from predicate compilation
pub const RESERVED_PARAMS: [&str; 2] = ["limit", "page"];

/// Comparison operator resolved from a parameter-name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Exact text match (no suffix)
    Eq,
    /// `_ne` - text inequality
    Ne,
    /// `_gt` - numeric greater-than
    Gt,
    /// `_lt` - numeric less-than
    Lt,
    /// `_gte` - numeric greater-or-equal
    Gte,
    /// `_lte` - numeric less-or-equal
    Lte,
    /// `_in` - membership over comma-separated tokens
    In,
    /// `_regex` - case-insensitive pattern match
    Regex,
    /// `_exists` - field key presence
    Exists,
}

/// Typed operand, parsed once at compile time
#[derive(Debug, Clone)]
enum Operand {
    Text(String),
    Number(f64),
    Set(Vec<String>),
    Pattern(Regex),
    Presence(bool),
}

/// One compiled predicate: field, operator, typed operand.
/// Constructed and consumed within a single request.
#[derive(Debug, Clone)]
pub struct Filter {
    field: String,
    op: FilterOp,
    operand: Operand,
}

/// Suffixes checked longest-first so the most specific one wins
const SUFFIXES: [(&str, FilterOp); 8] = [
    ("_exists", FilterOp::Exists),
    ("_regex", FilterOp::Regex),
    ("_gte", FilterOp::Gte),
    ("_lte", FilterOp::Lte),
    ("_gt", FilterOp::Gt),
    ("_lt", FilterOp::Lt),
    ("_ne", FilterOp::Ne),
    ("_in", FilterOp::In),
];

fn split_operator(name: &str) -> (&str, FilterOp) {
    for (suffix, op) in SUFFIXES {
        if let Some(field) = name.strip_suffix(suffix) {
            return (field, op);
        }
    }
    (name, FilterOp::Eq)
}

impl Filter {
    /// Compile one `name=value` parameter into a predicate
    pub fn compile(name: &str, raw: &str) -> Result<Filter> {
        let (field, op) = split_operator(name);
        if !is_identifier(field) {
            return Err(DbError::validation(format!(
                "Invalid field name '{}'",
                field
            )));
        }

        let operand = match op {
            FilterOp::Gt | FilterOp::Lt | FilterOp::Gte | FilterOp::Lte => {
                let number = raw.trim().parse::<f64>().map_err(|_| {
                    DbError::validation(format!(
                        "Parameter '{}' requires a numeric value",
                        name
                    ))
                })?;
                Operand::Number(number)
            }
            FilterOp::In => Operand::Set(raw.split(',').map(str::to_string).collect()),
            FilterOp::Regex => {
                let pattern = RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        DbError::validation(format!("Invalid pattern for '{}': {}", name, e))
                    })?;
                Operand::Pattern(pattern)
            }
            FilterOp::Exists => Operand::Presence(raw == "true" || raw == "1"),
            FilterOp::Eq | FilterOp::Ne => Operand::Text(raw.to_string()),
        };

        Ok(Filter {
            field: field.to_string(),
            op,
            operand,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Evaluate this predicate against a document payload.
    ///
    /// Absent fields and `null` values have no text or numeric
    /// representation, so every comparison except `_exists` is false
    /// for them - including `_ne`.
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        match &self.operand {
            Operand::Presence(wanted) => data.contains_key(&self.field) == *wanted,
            Operand::Number(bound) => {
                let number = match data.get(&self.field).and_then(numeric_repr) {
                    Some(number) => number,
                    None => return false,
                };
                match self.op {
                    FilterOp::Gt => number > *bound,
                    FilterOp::Lt => number < *bound,
                    FilterOp::Gte => number >= *bound,
                    FilterOp::Lte => number <= *bound,
                    _ => false,
                }
            }
            Operand::Text(expected) => {
                let text = match data.get(&self.field).and_then(text_repr) {
                    Some(text) => text,
                    None => return false,
                };
                if self.op == FilterOp::Ne {
                    text != *expected
                } else {
                    text == *expected
                }
            }
            Operand::Set(tokens) => match data.get(&self.field).and_then(text_repr) {
                Some(text) => tokens.iter().any(|token| *token == text),
                None => false,
            },
            Operand::Pattern(pattern) => match data.get(&self.field).and_then(text_repr) {
                Some(text) => pattern.is_match(&text),
                None => false,
            },
        }
    }
}

/// Compile all non-reserved parameters; filters combine with logical AND
pub fn compile_filters<'a, I>(params: I) -> Result<Vec<Filter>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut filters = Vec::new();
    for (name, value) in params {
        if RESERVED_PARAMS.contains(&name) {
            continue;
        }
        filters.push(Filter::compile(name, value)?);
    }
    Ok(filters)
}

/// True when every predicate accepts the payload
pub fn matches_all(filters: &[Filter], data: &Map<String, Value>) -> bool {
    filters.iter().all(|filter| filter.matches(data))
}

/// Text representation of a field value, mirroring JSON-to-text
/// extraction: `null` has none, scalars use their literal form,
/// containers serialize compactly.
fn text_repr(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

/// Numeric cast of a field value: numbers as-is, numeric strings
/// parsed, everything else has no numeric representation.
fn numeric_repr(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
