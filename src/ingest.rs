//! Run orchestration: table bootstrap, candidate discovery, and per-file loading.

use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::{
    cli::{FailurePolicy, IngestArgs},
    config::IngestConfig,
    error::{FileError, RunError},
    loader::{self, FileReport, LoadOptions},
    sink::{SqliteSink, StagingSink},
    store::{FsObjectStore, ObjectStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub prefix: String,
    pub extension: String,
    pub policy: FailurePolicy,
    pub load: LoadOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub key: String,
    pub rows_committed: usize,
    pub error: String,
}

impl From<&FileError> for FailedFile {
    fn from(err: &FileError) -> Self {
        Self {
            key: err.key.clone(),
            rows_committed: err.rows_committed,
            error: format!("{:#}", err.source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
    pub failures: Vec<FailedFile>,
    pub total_rows: usize,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
            failures: Vec::new(),
            total_rows: 0,
        }
    }
}

impl RunReport {
    pub fn rows_for(&self, key: &str) -> Option<usize> {
        self.files
            .iter()
            .find(|file| file.key == key)
            .map(|file| file.rows_loaded)
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Keys under `prefix` whose name ends with `extension`, in listing order.
pub fn list_candidates(store: &dyn ObjectStore, prefix: &str, extension: &str) -> Result<Vec<String>> {
    let extension = extension.to_ascii_lowercase();
    Ok(store
        .list(prefix)?
        .into_iter()
        .filter(|key| key.to_ascii_lowercase().ends_with(&extension))
        .collect())
}

pub fn run(
    store: &dyn ObjectStore,
    sink: &mut dyn StagingSink,
    options: &RunOptions,
) -> Result<RunReport, RunError> {
    sink.create_table_if_not_exists()
        .map_err(RunError::TableSetup)?;
    let keys = list_candidates(store, &options.prefix, &options.extension).map_err(|source| {
        RunError::Listing {
            prefix: options.prefix.clone(),
            source,
        }
    })?;
    info!(
        "Found {} {} file(s) under '{}'",
        keys.len(),
        options.extension,
        options.prefix
    );

    let mut report = RunReport::default();
    for key in keys {
        match loader::load_file(store, &key, &options.load, sink) {
            Ok(file) => {
                report.total_rows += file.rows_loaded;
                report.files.push(file);
            }
            Err(err) => {
                report.total_rows += err.rows_committed;
                match options.policy {
                    FailurePolicy::FailFast => {
                        report.finish();
                        return Err(RunError::File {
                            key: err.key.clone(),
                            rows_loaded: report.total_rows,
                            report: Box::new(report),
                            source: err,
                        });
                    }
                    FailurePolicy::BestEffort => {
                        warn!("Continuing after failure in {}", err.key);
                        report.failures.push(FailedFile::from(&err));
                    }
                }
            }
        }
    }
    report.finish();
    info!(
        "Load finished: {} row(s) from {} file(s), {} failure(s)",
        report.total_rows,
        report.files.len(),
        report.failures.len()
    );
    Ok(report)
}

pub fn execute(args: &IngestArgs) -> Result<()> {
    let config = IngestConfig::from_ingest_args(args)?;
    let store = FsObjectStore::open(&config.store_root, &config.bucket)?;
    let mut sink = SqliteSink::open(&config.database, &config.table)?;
    info!(
        "Loading '{}/{}' into {:?} table '{}'",
        config.bucket, config.prefix, config.database, config.table
    );

    match run(&store, &mut sink, &config.run_options()) {
        Ok(report) => {
            if let Some(path) = &args.report {
                write_report(&report, path)?;
            }
            if report.failures.is_empty() {
                Ok(())
            } else {
                let keys = report
                    .failures
                    .iter()
                    .map(|failure| failure.key.as_str())
                    .collect::<Vec<_>>();
                Err(anyhow!(
                    "{} file(s) failed ({} row(s) loaded): {}",
                    keys.len(),
                    report.total_rows,
                    keys.join(", ")
                ))
            }
        }
        Err(err) => {
            error!("Load process failed: {err:#}");
            if let (Some(path), Some(report)) = (&args.report, err.partial_report()) {
                write_report(report, path)?;
            }
            Err(err.into())
        }
    }
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Writing report to {path:?}"))?;
    info!("Run report written to {path:?}");
    Ok(())
}
