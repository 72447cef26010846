// src/transform/mod.rs
//! Remaps validated rows onto target-store field names and computes derived
//! fields. Pure: no I/O and no shared state.

use serde::{
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};

use crate::contract::{ValidatedRow, Value};

/// How a target field is computed from its source column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// Take the validated value as is.
    #[default]
    Copy,
    /// Segment before the first delimiter, or the whole value when absent.
    SplitFirst { delimiter: String },
    /// Segment after the first delimiter, or `""` when absent.
    SplitSecond { delimiter: String },
}

impl Derivation {
    pub fn delimiter(&self) -> Option<&str> {
        match self {
            Derivation::Copy => None,
            Derivation::SplitFirst { delimiter } | Derivation::SplitSecond { delimiter } => {
                Some(delimiter)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub target: String,
    pub from: String,
    #[serde(default)]
    pub derive: Derivation,
}

impl FieldMapping {
    pub fn copy(target: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            from: from.into(),
            derive: Derivation::Copy,
        }
    }

    pub fn split_first(
        target: impl Into<String>,
        from: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            from: from.into(),
            derive: Derivation::SplitFirst {
                delimiter: delimiter.into(),
            },
        }
    }

    pub fn split_second(
        target: impl Into<String>,
        from: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            from: from.into(),
            derive: Derivation::SplitSecond {
                delimiter: delimiter.into(),
            },
        }
    }
}

/// Split a composite code such as `"AX100 | SN99887"` on its first
/// `delimiter`. Both segments are trimmed; anything after a second
/// delimiter is dropped.
pub fn split_composite(value: &str, delimiter: &str) -> (String, String) {
    if delimiter.is_empty() {
        return (value.trim().to_string(), String::new());
    }
    let mut parts = value.split(delimiter);
    let first = parts.next().unwrap_or_default().trim().to_string();
    let second = parts.next().unwrap_or_default().trim().to_string();
    (first, second)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("field {target}: source column {from:?} is not in the validated row")]
    UnknownField { target: String, from: String },
}

/// A validated row under destination field names, in mapping order.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRecord {
    line: usize,
    fields: Vec<(String, Value)>,
}

impl DomainRecord {
    pub fn new(line: usize, fields: Vec<(String, Value)>) -> Self {
        Self { line, fields }
    }

    /// Source line the record came from.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

impl Serialize for DomainRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transformer {
    mappings: Vec<FieldMapping>,
}

impl Transformer {
    pub fn new(mappings: Vec<FieldMapping>) -> Self {
        Self { mappings }
    }

    pub fn apply(&self, row: &ValidatedRow) -> Result<DomainRecord, TransformError> {
        let fields = self
            .mappings
            .iter()
            .map(|m| {
                let source = row.get(&m.from).ok_or_else(|| TransformError::UnknownField {
                    target: m.target.clone(),
                    from: m.from.clone(),
                })?;
                Ok((m.target.clone(), derive(source, &m.derive)))
            })
            .collect::<Result<Vec<_>, TransformError>>()?;

        Ok(DomainRecord::new(row.line(), fields))
    }
}

fn derive(source: &Value, derivation: &Derivation) -> Value {
    match derivation {
        Derivation::Copy => source.clone(),
        Derivation::SplitFirst { delimiter } => {
            Value::Text(split_composite(&source.render(), delimiter).0)
        }
        Derivation::SplitSecond { delimiter } => {
            Value::Text(split_composite(&source.render(), delimiter).1)
        }
    }
}
