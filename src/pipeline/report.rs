use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::{source::RawRow, transform::DomainRecord};

/// Where a failure happened: a source line, or the batch starting at a
/// 0-based offset into the staged records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRef {
    Line(usize),
    Batch { start: usize },
}

impl Serialize for RowRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowRef::Line(line) => serializer.serialize_u64(*line as u64),
            RowRef::Batch { start } => {
                serializer.collect_str(&format_args!("Batch starting at {start}"))
            }
        }
    }
}

/// One entry of the error artifact: `{ row, error, data }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub row: RowRef,
    pub error: String,
    pub data: serde_json::Value,
}

impl ErrorRecord {
    pub fn row(line: usize, reason: impl ToString, raw: &RawRow) -> Self {
        Self {
            row: RowRef::Line(line),
            error: reason.to_string(),
            data: raw.to_json(),
        }
    }

    pub fn batch(start: usize, reason: impl ToString, records: &[DomainRecord]) -> Self {
        Self {
            row: RowRef::Batch { start },
            error: reason.to_string(),
            data: serde_json::json!({ "start": start, "records": records }),
        }
    }
}

/// In-memory error collection for one run; written out once at the end.
#[derive(Debug, Default)]
pub struct ErrorSink {
    records: Vec<ErrorRecord>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Write every record as a pretty JSON array to `path`, replacing any
    /// previous artifact. Nothing is written when the sink is empty.
    pub fn write_json(&self, path: &Path) -> Result<Option<PathBuf>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        write_records(&self.records, path)?;
        Ok(Some(path.to_path_buf()))
    }

    /// Log the first `n` records in full.
    pub fn log_preview(&self, n: usize) {
        for (idx, record) in self.records.iter().take(n).enumerate() {
            let detail = serde_json::to_string_pretty(record).unwrap_or_default();
            warn!(error = idx + 1, "{}", detail);
        }
    }
}

/// Write to a sibling tmp file, then rename over `path`.
pub fn write_records(records: &[ErrorRecord], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "errors.json".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    serde_json::to_writer_pretty(&mut tmp, records).context("serializing error records")?;
    tmp.write_all(b"\n")?;
    tmp.sync_all()?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Rows yielded by the source.
    pub total_processed: usize,
    /// Records committed.
    pub total_succeeded: usize,
    /// Rejected rows plus records of failed batches.
    pub total_failed: usize,
}

impl ImportSummary {
    pub fn log(&self) {
        info!(
            processed = self.total_processed,
            succeeded = self.total_succeeded,
            failed = self.total_failed,
            "import summary"
        );
    }
}

/// Everything a run produced besides the rows it wrote.
#[derive(Debug)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub failed_batches: usize,
    pub errors: ErrorSink,
}
