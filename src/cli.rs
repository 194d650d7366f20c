use std::{num::NonZeroUsize, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load TSE election-result CSV files into a staging table", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load every raw CSV file under the configured prefix into the staging table
    Ingest(IngestArgs),
    /// Report the detected encoding, delimiter, and column bindings of a local file
    Detect(DetectArgs),
    /// Upload local CSV files into the object store under the configured prefix
    Stage(StageArgs),
}

/// What happens to the rest of the run when one file fails.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    BestEffort,
}

/// Granularity at which appended rows become durable.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CommitMode {
    /// Every chunk commits on its own; a failing file leaves earlier chunks behind
    #[default]
    Chunk,
    /// A file commits as a whole or not at all
    File,
}

/// Object store location shared by `ingest` and `stage`.
#[derive(Debug, Args, Default)]
pub struct StoreArgs {
    /// YAML configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Root directory of the object store
    #[arg(long = "store-root")]
    pub store_root: Option<PathBuf>,
    /// Bucket holding the raw files
    #[arg(long)]
    pub bucket: Option<String>,
    /// Key prefix of the raw files inside the bucket
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Args, Default)]
pub struct IngestArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Only keys ending with this extension are loaded
    #[arg(long)]
    pub extension: Option<String>,
    /// SQLite database holding the staging table
    #[arg(short, long)]
    pub database: Option<PathBuf>,
    /// Staging table name
    #[arg(long)]
    pub table: Option<String>,
    /// Rows per chunk
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<NonZeroUsize>,
    /// Bytes sampled from the start of each file for format detection
    #[arg(long = "sample-bytes")]
    pub sample_bytes: Option<usize>,
    /// Behaviour when a file fails
    #[arg(long, value_enum)]
    pub policy: Option<FailurePolicy>,
    /// Commit granularity
    #[arg(long, value_enum)]
    pub commit: Option<CommitMode>,
    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Local CSV file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Bytes sampled from the start of the file
    #[arg(long = "sample-bytes", default_value_t = crate::format::DEFAULT_SAMPLE_BYTES)]
    pub sample_bytes: usize,
}

#[derive(Debug, Args)]
pub struct StageArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// One or more local CSV files to upload
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_defaults_to_fail_fast_and_chunk_commits() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
        assert_eq!(CommitMode::default(), CommitMode::Chunk);

        let cli = Cli::try_parse_from(["tse-ingest", "ingest", "--policy", "best-effort", "--commit", "file"])
            .expect("parse ingest flags");
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.policy, Some(FailurePolicy::BestEffort));
                assert_eq!(args.commit, Some(CommitMode::File));
                assert_eq!(args.chunk_size, None);
            }
            other => panic!("expected ingest, got {other:?}"),
        }
    }
}
