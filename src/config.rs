//! Run configuration.
//!
//! Defaults reproduce the production layout (bucket `raw-data`, prefix
//! `eleicoes_2022/`, table `staging_eleicoes`). A YAML file may override any
//! field, and command-line flags override the file.

use std::{fs::File, num::NonZeroUsize, path::Path, path::PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cli::{CommitMode, FailurePolicy, IngestArgs, StoreArgs},
    format::DEFAULT_SAMPLE_BYTES,
    ingest::RunOptions,
    loader::{DEFAULT_CHUNK_SIZE, LoadOptions},
    sink::{DEFAULT_TABLE, validate_table_name},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub store_root: PathBuf,
    pub bucket: String,
    pub prefix: String,
    pub extension: String,
    pub database: PathBuf,
    pub table: String,
    pub chunk_size: NonZeroUsize,
    pub sample_bytes: usize,
    pub policy: FailurePolicy,
    pub commit: CommitMode,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("data"),
            bucket: "raw-data".to_string(),
            prefix: "eleicoes_2022/".to_string(),
            extension: ".csv".to_string(),
            database: PathBuf::from("staging.db"),
            table: DEFAULT_TABLE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            policy: FailurePolicy::default(),
            commit: CommitMode::default(),
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Parsing YAML config from {path:?}"))?;
        Ok(config)
    }

    /// Loads `store.config` when given, otherwise starts from the defaults.
    pub fn from_store_args(store: &StoreArgs) -> Result<Self> {
        let mut config = match &store.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_store_overrides(store);
        Ok(config)
    }

    pub fn from_ingest_args(args: &IngestArgs) -> Result<Self> {
        let mut config = Self::from_store_args(&args.store)?;
        if let Some(extension) = &args.extension {
            config.extension = extension.clone();
        }
        if let Some(database) = &args.database {
            config.database = database.clone();
        }
        if let Some(table) = &args.table {
            config.table = table.clone();
        }
        if let Some(chunk_size) = args.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(sample_bytes) = args.sample_bytes {
            config.sample_bytes = sample_bytes;
        }
        if let Some(policy) = args.policy {
            config.policy = policy;
        }
        if let Some(commit) = args.commit {
            config.commit = commit;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_store_overrides(&mut self, store: &StoreArgs) {
        if let Some(root) = &store.store_root {
            self.store_root = root.clone();
        }
        if let Some(bucket) = &store.bucket {
            self.bucket = bucket.clone();
        }
        if let Some(prefix) = &store.prefix {
            self.prefix = prefix.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_bytes > 0, "sample_bytes must be positive");
        ensure!(!self.extension.is_empty(), "extension must not be empty");
        validate_table_name(&self.table)?;
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            prefix: self.prefix.clone(),
            extension: self.extension.clone(),
            policy: self.policy,
            load: LoadOptions {
                chunk_size: self.chunk_size,
                sample_bytes: self.sample_bytes,
                commit: self.commit,
            },
        }
    }
}
