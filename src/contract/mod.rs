// src/contract/mod.rs
//! Declarative row contracts: which columns an import expects, how each is
//! coerced, and what happens when a value is missing.

pub mod coerce;
pub mod date_parser;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use crate::source::{Cell, RawRow};

/// A canonical scalar after coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl Value {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Null => None,
            Value::Number(_) => Some(FieldKind::Number),
            Value::Text(_) => Some(FieldKind::Text),
            Value::Date(_) => Some(FieldKind::Date),
        }
    }

    /// Text rendering used by derived fields; `Null` renders empty.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => coerce::format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(d) => coerce::format_date(d),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Date,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Number => f.write_str("number"),
            FieldKind::Date => f.write_str("date"),
        }
    }
}

/// Contract for one source column.
///
/// Resolution order for a cell:
/// 1. blank or absent → `default`, else `Null` when optional, else a `Missing` issue
/// 2. coerce to `kind`
/// 3. coercion impossible → `default`, else `Null` when optional, else an `Incoercible` issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub column: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldRule {
    pub fn new(column: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            column: column.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn text(column: impl Into<String>) -> Self {
        Self::new(column, FieldKind::Text)
    }

    pub fn number(column: impl Into<String>) -> Self {
        Self::new(column, FieldKind::Number)
    }

    pub fn date(column: impl Into<String>) -> Self {
        Self::new(column, FieldKind::Date)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn or_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn resolve(&self, cell: Option<&Cell>) -> Result<Value, FieldIssue> {
        if coerce::is_blank(cell) {
            return self.fallback(|| FieldIssue::Missing {
                column: self.column.clone(),
            });
        }

        let coerced = match self.kind {
            FieldKind::Text => coerce::coerce_text(cell).map(Value::Text),
            FieldKind::Number => coerce::coerce_number(cell).map(Value::Number),
            FieldKind::Date => coerce::coerce_date(cell).map(Value::Date),
        };

        match coerced {
            Some(value) => Ok(value),
            None => self.fallback(|| FieldIssue::Incoercible {
                column: self.column.clone(),
                expected: self.kind,
                raw: cell.map(describe_cell).unwrap_or_default(),
            }),
        }
    }

    fn fallback(&self, issue: impl FnOnce() -> FieldIssue) -> Result<Value, FieldIssue> {
        match (&self.default, self.required) {
            (Some(value), _) => Ok(value.clone()),
            (None, false) => Ok(Value::Null),
            (None, true) => Err(issue()),
        }
    }
}

fn describe_cell(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Text(s) => s.clone(),
        Cell::Number(n) => coerce::format_number(*n),
        Cell::Bool(b) => b.to_string(),
        Cell::Date(d) => coerce::format_date(d),
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldIssue {
    #[error("{column}: required value is missing")]
    Missing { column: String },

    #[error("{column}: expected {expected}, got {raw:?}")]
    Incoercible {
        column: String,
        expected: FieldKind,
        raw: String,
    },
}

/// Every issue found in one row; a row with any issue is rejected whole.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A row after every declared field was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    line: usize,
    values: BTreeMap<String, Value>,
}

impl ValidatedRow {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Ordered list of field rules, shared read-only by every row of a run.
/// Columns not named here are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowContract {
    fields: Vec<FieldRule>,
}

impl RowContract {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn field(&self, column: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn validate(&self, row: &RawRow) -> Result<ValidatedRow, ValidationError> {
        let mut values = BTreeMap::new();
        let mut issues = Vec::new();

        for rule in &self.fields {
            match rule.resolve(row.get(&rule.column)) {
                Ok(value) => {
                    values.insert(rule.column.clone(), value);
                }
                Err(issue) => issues.push(issue),
            }
        }

        if issues.is_empty() {
            Ok(ValidatedRow {
                line: row.line(),
                values,
            })
        } else {
            Err(ValidationError { issues })
        }
    }
}
