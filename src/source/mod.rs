// src/source/mod.rs
//! Row sources: decode a CSV or spreadsheet extract into an ordered stream of
//! untyped [`RawRow`]s keyed by the header row.

mod delimited;
mod sheet;

use chrono::NaiveDateTime;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// One untyped cell as produced by the decoder.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    /// Empty cells and whitespace-only text count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// One decoded record, with its 1-based line number in the source file
/// (the header is line 1).
#[derive(Debug, Clone)]
pub struct RawRow {
    line: usize,
    headers: Arc<[String]>,
    cells: Vec<Cell>,
}

impl RawRow {
    pub fn new(line: usize, headers: Arc<[String]>, cells: Vec<Cell>) -> Self {
        Self {
            line,
            headers,
            cells,
        }
    }

    /// Convenience constructor used by tests and tooling.
    pub fn from_pairs(line: usize, pairs: &[(&str, Cell)]) -> Self {
        let headers: Arc<[String]> = pairs.iter().map(|(h, _)| h.to_string()).collect();
        let cells = pairs.iter().map(|(_, c)| c.clone()).collect();
        Self::new(line, headers, cells)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Cell under `column`; `None` when the column is absent or the row is short.
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.cells.get(i))
    }

    /// Columns present in this row, in header order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter())
            .filter(|(_, cell)| !matches!(cell, Cell::Empty))
    }

    pub fn column_names(&self) -> &[String] {
        &self.headers
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (column, cell) in self.columns() {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported source format: {} (expected .csv, .xlsx, .xlsm, .xlsb, .xls or .ods)", .0.display())]
    Unsupported(PathBuf),

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV decode error in {}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("workbook error in {}: {message}", .path.display())]
    Workbook { path: PathBuf, message: String },

    #[error("{} has no header row", .0.display())]
    NoHeader(PathBuf),
}

/// Lazy, ordered sequence of decoded rows. A decode failure surfaces as an
/// `Err` item and is fatal to the run.
pub type Rows = Box<dyn Iterator<Item = Result<RawRow, SourceError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(SourceFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(SourceFormat::Spreadsheet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    /// Surface date-formatted spreadsheet cells as dates instead of serial numbers.
    pub cell_dates: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self { cell_dates: true }
    }
}

/// A tabular extract on disk. Only the first sheet of a workbook is read.
#[derive(Debug, Clone)]
pub struct RowSource {
    path: PathBuf,
    format: SourceFormat,
    options: SourceOptions,
}

impl RowSource {
    pub fn open(path: impl Into<PathBuf>, options: SourceOptions) -> Result<Self, SourceError> {
        let path = path.into();
        if !path.is_file() {
            return Err(SourceError::NotFound(path));
        }
        let format =
            SourceFormat::detect(&path).ok_or_else(|| SourceError::Unsupported(path.clone()))?;
        Ok(Self {
            path,
            format,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn rows(&self) -> Result<Rows, SourceError> {
        match self.format {
            SourceFormat::Csv => delimited::read_csv(&self.path),
            SourceFormat::Spreadsheet => sheet::read_sheet(&self.path, self.options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(
            SourceFormat::detect(Path::new("a/asset_extract.CSV")),
            Some(SourceFormat::Csv)
        );
        assert_eq!(
            SourceFormat::detect(Path::new("pegging_report.xlsx")),
            Some(SourceFormat::Spreadsheet)
        );
        assert_eq!(SourceFormat::detect(Path::new("notes.pdf")), None);
        assert_eq!(SourceFormat::detect(Path::new("no_extension")), None);
    }

    #[test]
    fn io_error_cause_is_reported_once() {
        let err = SourceError::Io {
            path: PathBuf::from("asset_extract.csv"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
        };
        assert_eq!(err.to_string(), "failed to read asset_extract.csv");
        assert_eq!(
            format!("{:#}", anyhow::Error::from(err)),
            "failed to read asset_extract.csv: disk gone"
        );
    }

    #[test]
    fn open_rejects_missing_and_unsupported_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing.csv");
        assert!(matches!(
            RowSource::open(&missing, SourceOptions::default()),
            Err(SourceError::NotFound(_))
        ));

        let pdf = dir.path().join("extract.pdf");
        fs::write(&pdf, b"%PDF")?;
        assert!(matches!(
            RowSource::open(&pdf, SourceOptions::default()),
            Err(SourceError::Unsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn raw_row_lookup_and_serialization() {
        let row = RawRow::from_pairs(
            7,
            &[
                ("Plant", Cell::Text("P100".into())),
                ("Material", Cell::Empty),
                ("Open Qty - Reservation", Cell::Number(4.0)),
            ],
        );
        assert_eq!(row.line(), 7);
        assert_eq!(row.get("Plant"), Some(&Cell::Text("P100".into())));
        assert_eq!(row.get("Material"), Some(&Cell::Empty));
        assert_eq!(row.get("Nope"), None);

        // empty cells are left out, like absent keys
        assert_eq!(
            row.to_json(),
            serde_json::json!({ "Plant": "P100", "Open Qty - Reservation": 4.0 })
        );
    }

    #[test]
    fn blank_cells() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::Text("   ".into()).is_blank());
        assert!(!Cell::Text("x".into()).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
    }
}
