// src/profile.rs
//! Import profiles: everything that distinguishes one import job from another
//! (contract, field mapping, write mode, target table) expressed as data.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    contract::{FieldKind, RowContract},
    store::{ColumnSpec, TableSpec},
    transform::{Derivation, FieldMapping, Transformer},
};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

const BUILTINS: &[(&str, &str)] = &[
    ("assets", include_str!("../profiles/assets.yaml")),
    ("asset-repair", include_str!("../profiles/asset_repair.yaml")),
    ("pegging", include_str!("../profiles/pegging.yaml")),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Clear the table, then insert every record.
    #[default]
    Replace,
    /// Insert, or update the row with the same natural key.
    Upsert,
}

fn default_batch_size() -> usize {
    50
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProfile {
    pub name: String,
    /// Target table.
    pub table: String,
    /// Default source file name, resolved against the data directory.
    pub source: String,
    /// Error artifact file name, resolved against the data directory.
    pub error_log: String,
    #[serde(default)]
    pub mode: WriteMode,
    #[serde(default)]
    pub natural_key: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Surface date-formatted spreadsheet cells as dates.
    #[serde(default = "default_true")]
    pub cell_dates: bool,
    pub fields: RowContract,
    pub mappings: Vec<FieldMapping>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid profile YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to read profile {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown profile {0:?} (built-in profiles: {1})")]
    UnknownBuiltin(String, String),

    #[error("{0:?} is not a valid table or column name")]
    UnsafeIdentifier(String),

    #[error("mapping {target:?} reads column {from:?}, which has no field rule")]
    UnknownColumn { target: String, from: String },

    #[error("mapping {0:?} splits on an empty delimiter")]
    EmptyDelimiter(String),

    #[error("target field {0:?} is mapped more than once")]
    DuplicateTarget(String),

    #[error("column {0:?} has more than one field rule")]
    DuplicateColumn(String),

    #[error("upsert profile {0:?} declares no natural key")]
    MissingNaturalKey(String),

    #[error("natural key {0:?} is not a mapped target field")]
    UnknownKey(String),

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("default for column {column:?} does not match its kind {kind}")]
    DefaultKindMismatch { column: String, kind: FieldKind },
}

impl ImportProfile {
    /// Names of the profiles compiled into the binary.
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTINS.iter().map(|(name, _)| *name)
    }

    pub fn builtin(name: &str) -> Result<Self, ProfileError> {
        let (_, yaml) = BUILTINS
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| {
                ProfileError::UnknownBuiltin(
                    name.to_string(),
                    Self::builtin_names().collect::<Vec<_>>().join(", "),
                )
            })?;
        Self::from_yaml(yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ProfileError> {
        let profile: ImportProfile = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let yaml = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Consistency checks run before any I/O against the store.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.batch_size == 0 {
            return Err(ProfileError::ZeroBatchSize);
        }
        check_identifier(&self.table)?;

        let mut columns = HashSet::new();
        for rule in self.fields.fields() {
            if !columns.insert(rule.column.as_str()) {
                return Err(ProfileError::DuplicateColumn(rule.column.clone()));
            }
            if let Some(kind) = rule.default.as_ref().and_then(|d| d.kind()) {
                if kind != rule.kind {
                    return Err(ProfileError::DefaultKindMismatch {
                        column: rule.column.clone(),
                        kind: rule.kind,
                    });
                }
            }
        }

        let mut targets = HashSet::new();
        for m in &self.mappings {
            check_identifier(&m.target)?;
            if !targets.insert(m.target.as_str()) {
                return Err(ProfileError::DuplicateTarget(m.target.clone()));
            }
            if !columns.contains(m.from.as_str()) {
                return Err(ProfileError::UnknownColumn {
                    target: m.target.clone(),
                    from: m.from.clone(),
                });
            }
            if m.derive.delimiter().is_some_and(str::is_empty) {
                return Err(ProfileError::EmptyDelimiter(m.target.clone()));
            }
        }

        if self.mode == WriteMode::Upsert && self.natural_key.is_empty() {
            return Err(ProfileError::MissingNaturalKey(self.name.clone()));
        }
        for key in &self.natural_key {
            if !targets.contains(key.as_str()) {
                return Err(ProfileError::UnknownKey(key.clone()));
            }
        }
        Ok(())
    }

    pub fn transformer(&self) -> Transformer {
        Transformer::new(self.mappings.clone())
    }

    /// Target table layout: copied fields keep their contract kind, split
    /// fields are always text.
    pub fn table_spec(&self) -> TableSpec {
        let columns = self
            .mappings
            .iter()
            .map(|m| {
                let kind = match m.derive {
                    Derivation::Copy => self
                        .fields
                        .field(&m.from)
                        .map(|rule| rule.kind)
                        .unwrap_or_default(),
                    Derivation::SplitFirst { .. } | Derivation::SplitSecond { .. } => {
                        FieldKind::Text
                    }
                };
                ColumnSpec {
                    name: m.target.clone(),
                    kind,
                }
            })
            .collect();

        TableSpec {
            name: self.table.clone(),
            columns,
            natural_key: self.natural_key.clone(),
        }
    }
}

fn check_identifier(name: &str) -> Result<(), ProfileError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ProfileError::UnsafeIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
name: parts
table: parts
source: parts.csv
error_log: parts_errors.json
mode: upsert
natural_key: [part_no]
fields:
  - { column: Part, required: true }
  - { column: Qty, kind: number }
mappings:
  - { target: part_no, from: Part }
  - { target: qty, from: Qty }
"#;

    #[test]
    fn builtin_profiles_parse_and_validate() {
        for name in ImportProfile::builtin_names() {
            let profile = ImportProfile::builtin(name)
                .unwrap_or_else(|e| panic!("built-in profile {name} is invalid: {e}"));
            assert_eq!(profile.name, name);
        }
    }

    #[test]
    fn assets_profile_upserts_on_code_and_serial() {
        let p = ImportProfile::builtin("assets").unwrap();
        assert_eq!(p.table, "asset_information");
        assert_eq!(p.source, "asset_extract.csv");
        assert_eq!(p.mode, WriteMode::Upsert);
        assert_eq!(p.natural_key, ["asset_code_level4", "asset_serial_number"]);
        assert_eq!(p.batch_size, 100);
        assert!(p.fields.field("Assettype").unwrap().required);
        assert_eq!(
            p.fields.field("RPF_TOOL_GROUP").unwrap().default,
            Some(Value::from(""))
        );
        // validated but never stored
        assert!(p.fields.field("LOCATION").is_some());
        assert!(p.mappings.iter().all(|m| m.from != "LOCATION"));
    }

    #[test]
    fn asset_repair_profile_splits_assetnum() {
        let p = ImportProfile::builtin("asset-repair").unwrap();
        assert_eq!(p.mode, WriteMode::Replace);
        assert_eq!(p.batch_size, 50);
        assert!(p.cell_dates);
        assert_eq!(
            p.fields.field("GBV").unwrap().default,
            Some(Value::from("0"))
        );
        assert!(p
            .mappings
            .contains(&FieldMapping::split_second("asset_serial_number", "Assetnum", "|")));

        let spec = p.table_spec();
        let kind_of = |name: &str| spec.columns.iter().find(|c| c.name == name).unwrap().kind;
        assert_eq!(kind_of("estimated_repair_date"), FieldKind::Date);
        assert_eq!(kind_of("asset_code_level4"), FieldKind::Text);
    }

    #[test]
    fn pegging_profile_keeps_serial_dates() {
        let p = ImportProfile::builtin("pegging").unwrap();
        assert!(!p.cell_dates);
        assert_eq!(p.fields.fields().len(), 29);
        assert_eq!(p.mappings.len(), 30);
        assert!(p
            .mappings
            .contains(&FieldMapping::split_first("reservation", "Reservation -Line", "-")));
        assert_eq!(
            p.fields.field("Open Qty - Reservation").unwrap().kind,
            FieldKind::Number
        );
    }

    #[test]
    fn unknown_builtin_lists_the_known_ones() {
        let err = ImportProfile::builtin("inventory").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown profile \"inventory\" (built-in profiles: assets, asset-repair, pegging)"
        );
    }

    #[test]
    fn loads_profile_from_file() -> anyhow::Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(MINIMAL.as_bytes())?;
        let p = ImportProfile::from_file(tmp.path())?;
        assert_eq!(p.batch_size, 50);
        assert!(p.cell_dates);
        assert_eq!(p.table_spec().natural_key, ["part_no"]);
        Ok(())
    }

    fn rejection(from: &str, to: &str) -> ProfileError {
        let yaml = MINIMAL.replacen(from, to, 1);
        ImportProfile::from_yaml(&yaml).expect_err("profile should be rejected")
    }

    #[test]
    fn rejects_inconsistent_profiles() {
        assert!(matches!(
            rejection("table: parts", "table: \"parts; drop\""),
            ProfileError::UnsafeIdentifier(_)
        ));
        assert!(matches!(
            rejection("from: Qty", "from: Quantity"),
            ProfileError::UnknownColumn { .. }
        ));
        assert!(matches!(
            rejection("natural_key: [part_no]", "natural_key: []"),
            ProfileError::MissingNaturalKey(_)
        ));
        assert!(matches!(
            rejection("natural_key: [part_no]", "natural_key: [sku]"),
            ProfileError::UnknownKey(_)
        ));
        assert!(matches!(
            rejection("target: qty", "target: part_no"),
            ProfileError::DuplicateTarget(_)
        ));
        assert!(matches!(
            rejection("mode: upsert", "mode: upsert\nbatch_size: 0"),
            ProfileError::ZeroBatchSize
        ));
        assert!(matches!(
            rejection("kind: number }", "kind: number, default: \"n/a\" }"),
            ProfileError::DefaultKindMismatch { .. }
        ));
        assert!(matches!(
            rejection("column: Qty", "column: Part"),
            ProfileError::DuplicateColumn(_)
        ));
        assert!(matches!(
            rejection(
                "{ target: qty, from: Qty }",
                "{ target: qty, from: Qty, derive: { op: split_first, delimiter: \"\" } }"
            ),
            ProfileError::EmptyDelimiter(_)
        ));
    }
}
