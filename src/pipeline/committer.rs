use tracing::{info, warn};

use super::report::{ErrorRecord, ErrorSink};
use crate::{
    profile::WriteMode,
    store::{RecordWriter, SqliteStore, StoreError, TableSpec},
    transform::DomainRecord,
};

/// Counters from one commit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitTally {
    pub succeeded: usize,
    pub failed_batches: usize,
    pub failed_records: usize,
}

/// Writes records in fixed-size batches, one transaction per batch. A failed
/// batch is rolled back whole, recorded once, and the next batch still runs.
pub struct BatchCommitter<'a> {
    store: &'a SqliteStore,
    writer: RecordWriter,
    batch_size: usize,
}

impl<'a> BatchCommitter<'a> {
    pub fn new(store: &'a SqliteStore, table: &TableSpec, mode: WriteMode, batch_size: usize) -> Self {
        let writer = match mode {
            WriteMode::Replace => RecordWriter::insert(table),
            WriteMode::Upsert => RecordWriter::upsert(table),
        };
        Self {
            store,
            writer,
            batch_size: batch_size.max(1),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(records = records.len(), batch_size = self.batch_size))]
    pub async fn commit(&self, records: &[DomainRecord], sink: &mut ErrorSink) -> CommitTally {
        let mut tally = CommitTally::default();
        let total_batches = records.len().div_ceil(self.batch_size);

        for (idx, batch) in records.chunks(self.batch_size).enumerate() {
            let start = idx * self.batch_size;
            match self.commit_batch(batch).await {
                Ok(()) => {
                    tally.succeeded += batch.len();
                    info!(batch = idx + 1, total = total_batches, "committed batch");
                }
                Err(e) => {
                    warn!(start, records = batch.len(), error = %e, "batch failed, rolled back");
                    tally.failed_batches += 1;
                    tally.failed_records += batch.len();
                    sink.push(ErrorRecord::batch(start, &e, batch));
                }
            }
        }
        tally
    }

    async fn commit_batch(&self, batch: &[DomainRecord]) -> Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        for record in batch {
            if let Err(e) = tx.write(&self.writer, record).await {
                // a failed rollback still discards the transaction when `tx` drops
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                return Err(e);
            }
        }
        tx.commit().await
    }
}
