// src/pipeline/mod.rs
//! The import run: decode → validate → transform → commit, with rejected rows
//! and failed batches collected as error records instead of aborting.

pub mod committer;
pub mod report;

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    contract::ValidationError,
    profile::{ImportProfile, WriteMode},
    source::{RawRow, RowSource, Rows, SourceError, SourceOptions},
    store::{SqliteStore, TableSpec},
    transform::{DomainRecord, TransformError, Transformer},
};
use committer::BatchCommitter;
use report::{ErrorRecord, ErrorSink, ImportOutcome, ImportSummary};

/// Rows logged in full at debug level at the start of a run.
const SAMPLE_ROWS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub batch_size: usize,
    pub progress_every: usize,
}

impl RunOptions {
    /// Settings override the profile's batch size when they carry one.
    pub fn resolve(profile: &ImportProfile, settings: &Settings) -> Self {
        Self {
            batch_size: settings.batch_size.unwrap_or(profile.batch_size).max(1),
            progress_every: settings.progress_every.max(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RowFailure {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Result of decoding, validating and transforming every source row.
#[derive(Debug, Default)]
pub struct Staged {
    pub processed: usize,
    pub rejected: usize,
    pub records: Vec<DomainRecord>,
}

pub struct ImportPipeline {
    profile: ImportProfile,
    transformer: Transformer,
    table: TableSpec,
    options: RunOptions,
}

impl ImportPipeline {
    pub fn new(profile: ImportProfile, options: RunOptions) -> Self {
        let transformer = profile.transformer();
        let table = profile.table_spec();
        Self {
            profile,
            transformer,
            table,
            options,
        }
    }

    fn process_row(&self, raw: &RawRow) -> Result<DomainRecord, RowFailure> {
        let valid = self.profile.fields.validate(raw)?;
        Ok(self.transformer.apply(&valid)?)
    }

    /// Run every source row through the contract and the transformer, in file
    /// order. Rejected rows go to `sink`; a decode error aborts staging.
    pub fn stage(&self, rows: Rows, sink: &mut ErrorSink) -> Result<Staged, SourceError> {
        let mut staged = Staged::default();
        let progress_every = self.options.progress_every.max(1);

        for item in rows {
            let raw = item?;
            staged.processed += 1;

            if staged.processed == 1 {
                debug!(columns = ?raw.column_names(), "source columns");
            }
            if staged.processed <= SAMPLE_ROWS {
                debug!(line = raw.line(), raw = %raw.to_json(), "sample row");
            }

            match self.process_row(&raw) {
                Ok(record) => {
                    if staged.processed <= SAMPLE_ROWS {
                        debug!(
                            line = record.line(),
                            record = %serde_json::to_string(&record).unwrap_or_default(),
                            "sample record"
                        );
                    }
                    staged.records.push(record);
                }
                Err(failure) => {
                    debug!(line = raw.line(), error = %failure, "row rejected");
                    staged.rejected += 1;
                    sink.push(ErrorRecord::row(raw.line(), &failure, &raw));
                }
            }

            if staged.processed % progress_every == 0 {
                info!(processed = staged.processed, "progress");
            }
        }
        Ok(staged)
    }

    /// One full run against `store`:
    /// 1. provision or verify the target table
    /// 2. stage every row
    /// 3. clear the table (replace mode)
    /// 4. commit staged records batch by batch
    #[tracing::instrument(level = "info", skip_all, fields(profile = %self.profile.name, table = %self.table.name))]
    pub async fn run(&self, rows: Rows, store: &SqliteStore) -> Result<ImportOutcome> {
        // 1) table
        store
            .ensure_table(&self.table)
            .await
            .with_context(|| format!("target table {} is not usable", self.table.name))?;

        // 2) stage
        let mut errors = ErrorSink::new();
        let staged = self.stage(rows, &mut errors).context("decoding source")?;
        info!(
            processed = staged.processed,
            valid = staged.records.len(),
            rejected = staged.rejected,
            "staged source rows"
        );

        // 3) clear
        if self.profile.mode == WriteMode::Replace {
            store
                .clear(&self.table.name)
                .await
                .with_context(|| format!("clearing {}", self.table.name))?;
        }

        // 4) commit
        let tally = BatchCommitter::new(
            store,
            &self.table,
            self.profile.mode,
            self.options.batch_size,
        )
        .commit(&staged.records, &mut errors)
        .await;

        Ok(ImportOutcome {
            summary: ImportSummary {
                total_processed: staged.processed,
                total_succeeded: tally.succeeded,
                total_failed: staged.rejected + tally.failed_records,
            },
            failed_batches: tally.failed_batches,
            errors,
        })
    }
}

/// Entry point used by the binary: resolve the source path, open the source
/// and the store, run the pipeline, then report. The store is closed whether
/// or not the run succeeded.
#[tracing::instrument(level = "info", skip_all, fields(profile = %profile.name))]
pub async fn run_import(
    profile: &ImportProfile,
    settings: &Settings,
    source: Option<&Path>,
) -> Result<ImportOutcome> {
    let path = source
        .map(Path::to_path_buf)
        .unwrap_or_else(|| settings.source_path(&profile.source));
    if !path.is_file() {
        bail!(
            "source file not found: {}\n\
             place the extract there, or pass its location: assetimport {} <PATH>",
            path.display(),
            profile.name
        );
    }
    info!(path = %path.display(), mode = ?profile.mode, "starting import");

    let source = RowSource::open(&path, SourceOptions { cell_dates: profile.cell_dates })
        .with_context(|| format!("opening {}", path.display()))?;
    let rows = source
        .rows()
        .with_context(|| format!("decoding {}", path.display()))?;

    let store = SqliteStore::connect(&settings.database_url)
        .await
        .context("connecting to the target store")?;

    let pipeline = ImportPipeline::new(profile.clone(), RunOptions::resolve(profile, settings));
    let result = pipeline.run(rows, &store).await;
    if result.is_ok() && profile.mode == WriteMode::Replace {
        match store.count(&profile.table).await {
            Ok(rows) => info!(table = %profile.table, rows, "table row count"),
            Err(e) => warn!(error = %e, "could not count rows"),
        }
    }
    store.close().await;
    let outcome = result?;

    outcome.summary.log();
    if outcome.failed_batches > 0 {
        warn!(failed_batches = outcome.failed_batches, "some batches were rolled back");
    }
    let log_path = settings.error_log_path(&profile.error_log);
    if let Some(written) = outcome
        .errors
        .write_json(&log_path)
        .with_context(|| format!("writing error log {}", log_path.display()))?
    {
        warn!(path = %written.display(), errors = outcome.errors.len(), "error records written");
        outcome.errors.log_preview(settings.error_preview);
    }
    Ok(outcome)
}
