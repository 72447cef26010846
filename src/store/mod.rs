// src/store/mod.rs
//! Target store: a SQLite database reached through `sqlx`. The handle is
//! passed into each run explicitly and closed by its owner.

pub mod sql;

use sqlx::{
    query::Query,
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
        SqliteSynchronous,
    },
    Sqlite, Transaction,
};
use std::{path::PathBuf, str::FromStr, time::Duration};
use tracing::{debug, info};

use crate::{
    contract::{FieldKind, Value},
    transform::DomainRecord,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Layout of a target table, derived from an import profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub natural_key: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open database {url}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("cannot create database directory {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table {table} exists but lacks columns: {}", .missing.join(", "))]
    Incompatible { table: String, missing: Vec<String> },

    #[error("existing rows in {table} violate its natural key")]
    KeyIndex {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`, e.g. `sqlite://data/imports.db`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let connect_err = |source: sqlx::Error| StoreError::Connect {
            url: url.to_string(),
            source,
        };

        let options = SqliteConnectOptions::from_str(url)
            .map_err(connect_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        if let Some(dir) = options.get_filename().parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: dir.to_path_buf(),
                        source,
                    })?;
            }
        }

        // a single connection: table provisioning and every batch see one schema
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(connect_err)?;

        debug!(url, "connected to store");
        Ok(Self { pool })
    }

    /// Create the table and its natural-key index when missing, and verify that
    /// an existing table carries every target column. Never alters a table.
    #[tracing::instrument(level = "debug", skip(self, spec), fields(table = %spec.name))]
    pub async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        sqlx::query(&sql::create_table(spec))
            .execute(&self.pool)
            .await?;

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
                .bind(&spec.name)
                .fetch_all(&self.pool)
                .await?;
        let missing: Vec<String> = spec
            .columns
            .iter()
            .filter(|c| !existing.contains(&c.name))
            .map(|c| c.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::Incompatible {
                table: spec.name.clone(),
                missing,
            });
        }

        if let Some(index) = sql::create_key_index(spec) {
            sqlx::query(&index)
                .execute(&self.pool)
                .await
                .map_err(|source| StoreError::KeyIndex {
                    table: spec.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Delete every row of `table` in one statement. Returns the rows removed.
    pub async fn clear(&self, table: &str) -> Result<u64, StoreError> {
        let res = sqlx::query(&sql::delete_all(table))
            .execute(&self.pool)
            .await?;
        info!(table, removed = res.rows_affected(), "cleared target table");
        Ok(res.rows_affected())
    }

    pub async fn count(&self, table: &str) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar(&sql::count(table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Prepared statement text plus the column order its placeholders expect.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    sql: String,
    columns: Vec<String>,
}

impl RecordWriter {
    pub fn insert(spec: &TableSpec) -> Self {
        Self {
            sql: sql::insert(spec),
            columns: spec.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }

    pub fn upsert(spec: &TableSpec) -> Self {
        Self {
            sql: sql::upsert(spec),
            columns: spec.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// One open transaction. Dropping it without [`StoreTx::commit`] rolls back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn write(
        &mut self,
        writer: &RecordWriter,
        record: &DomainRecord,
    ) -> Result<(), StoreError> {
        let query = bind_record(sqlx::query(&writer.sql), &writer.columns, record);
        query.execute(&mut *self.tx).await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Bind record values in `columns` order; fields the record lacks bind NULL.
fn bind_record<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    columns: &[String],
    record: &'q DomainRecord,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    columns
        .iter()
        .fold(query, |q, column| match record.get(column) {
            None | Some(Value::Null) => q.bind(None::<String>),
            Some(Value::Number(n)) => q.bind(*n),
            Some(Value::Text(s)) => q.bind(s.as_str()),
            Some(Value::Date(d)) => q.bind(*d),
        })
}
