//! Typed failures at the file and run boundaries.
//!
//! Row and line problems never show up here; they are counted in the load
//! reports instead. Everything below aborts at least one file.

use thiserror::Error;

use crate::ingest::RunReport;

/// A file could not be loaded to completion.
#[derive(Debug, Error)]
#[error("failed to load '{key}' ({rows_committed} row(s) already committed)")]
pub struct FileError {
    pub key: String,
    /// Rows from this file that remain in the sink after the failure.
    pub rows_committed: usize,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to prepare the staging table")]
    TableSetup(#[source] anyhow::Error),
    #[error("failed to list objects under '{prefix}'")]
    Listing {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("ingestion aborted at '{key}' after {rows_loaded} row(s) loaded")]
    File {
        key: String,
        /// Rows in the sink for this run, including those committed by the failing file.
        rows_loaded: usize,
        report: Box<RunReport>,
        #[source]
        source: FileError,
    },
}

impl RunError {
    /// Progress made before the run was aborted, when any file was attempted.
    pub fn partial_report(&self) -> Option<&RunReport> {
        match self {
            RunError::File { report, .. } => Some(report),
            _ => None,
        }
    }
}
