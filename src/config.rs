// src/config.rs
//! Run settings, resolved in layers: defaults, then an optional YAML file,
//! then the environment. CLI flags are applied last by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Settings file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "assetimport.yaml";

const DEFAULT_DATABASE_URL: &str = "sqlite://data/imports.db";
const DEFAULT_DATA_DIR: &str = "data/extracts";
const DEFAULT_PROGRESS_EVERY: usize = 1000;
const DEFAULT_ERROR_PREVIEW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    /// Directory holding source extracts and error artifacts.
    pub data_dir: PathBuf,
    /// Overrides the profile's batch size when set.
    pub batch_size: Option<usize>,
    pub progress_every: usize,
    /// How many error records to log after a run.
    pub error_preview: usize,
    /// Overrides the profile's error-log location when set.
    pub error_log: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            batch_size: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
            error_preview: DEFAULT_ERROR_PREVIEW,
            error_log: None,
        }
    }
}

impl Settings {
    /// Resolve settings from `config` (or `assetimport.yaml` when present) and
    /// the process environment.
    ///
    /// | Env Var                 | Field            |
    /// |-------------------------|------------------|
    /// | `DATABASE_URL`          | `database_url`   |
    /// | `IMPORT_DATA_DIR`       | `data_dir`       |
    /// | `IMPORT_BATCH_SIZE`     | `batch_size`     |
    /// | `IMPORT_PROGRESS_EVERY` | `progress_every` |
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let mut settings = match config {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_yaml::from_str(&yaml)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    /// Overlay environment values; `lookup` returns a variable's value if set.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(dir) = var("IMPORT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(n) = var("IMPORT_BATCH_SIZE") {
            self.batch_size = Some(parse_positive("IMPORT_BATCH_SIZE", &n)?);
        }
        if let Some(n) = var("IMPORT_PROGRESS_EVERY") {
            self.progress_every = parse_positive("IMPORT_PROGRESS_EVERY", &n)?;
        }
        Ok(())
    }

    /// Default location of a profile's source file.
    pub fn source_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Where a profile's error artifact goes.
    pub fn error_log_path(&self, file_name: &str) -> PathBuf {
        self.error_log
            .clone()
            .unwrap_or_else(|| self.data_dir.join(file_name))
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize> {
    let n: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {raw:?}"))?;
    anyhow::ensure!(n > 0, "{key} must be at least 1");
    Ok(n)
}
