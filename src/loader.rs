//! Streaming, chunked loading of one raw file into the staging sink.
//!
//! The object is read exactly once: a bounded prefix is sampled for format
//! detection and then stitched back in front of the remaining stream. Records
//! are buffered up to `chunk_size`, projected through the file's
//! [`SchemaBinding`], validated, and appended as a single batch. At most one
//! raw chunk and its validated derivative are resident at any time.
//!
//! Ragged lines (more fields than the header) are skipped and counted. Read,
//! tokenizer, and sink failures abort the file; the object handle is released
//! on every path because the reader owns it.

use std::{io::Read, num::NonZeroUsize};

use anyhow::{Context, Result};
use csv::StringRecord;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    cli::CommitMode,
    error::FileError,
    format::{self, DEFAULT_SAMPLE_BYTES, FormatProfile},
    io_utils,
    schema::SchemaBinding,
    sink::StagingSink,
    store::ObjectStore,
    validate::{DropCounts, validate},
};

pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(50_000).unwrap();

/// Upper bound on the up-front allocation for one chunk buffer.
const MAX_PREALLOCATED_ROWS: usize = 8_192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub chunk_size: NonZeroUsize,
    pub sample_bytes: usize,
    pub commit: CommitMode,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            commit: CommitMode::Chunk,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    /// 1-based position of the chunk within its file.
    pub index: usize,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub dropped: DropCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub key: String,
    pub profile: Option<FormatProfile>,
    pub header: Vec<String>,
    pub binding: SchemaBinding,
    pub chunks: Vec<ChunkReport>,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub malformed_lines: usize,
    pub dropped: DropCounts,
}

impl FileReport {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    fn record_chunk(&mut self, chunk: ChunkReport) {
        self.rows_read += chunk.rows_read;
        self.rows_loaded += chunk.rows_loaded;
        self.dropped += chunk.dropped;
        self.chunks.push(chunk);
    }
}

pub fn load_file(
    store: &dyn ObjectStore,
    key: &str,
    options: &LoadOptions,
    sink: &mut dyn StagingSink,
) -> Result<FileReport, FileError> {
    info!("Processing file: {key}");
    let mut report = FileReport::new(key);
    let outcome = match options.commit {
        CommitMode::Chunk => stream_file(store, key, options, sink, &mut report),
        CommitMode::File => load_atomically(store, key, options, sink, &mut report),
    };
    match outcome {
        Ok(()) => {
            info!(
                "File {key} processed: {} row(s) inserted, {} dropped, {} malformed line(s)",
                report.rows_loaded,
                report.dropped.total(),
                report.malformed_lines
            );
            Ok(report)
        }
        Err(source) => {
            let rows_committed = match options.commit {
                CommitMode::Chunk => report.rows_loaded,
                CommitMode::File => 0,
            };
            error!("Failed to process {key}: {source:#}");
            Err(FileError {
                key: key.to_string(),
                rows_committed,
                source,
            })
        }
    }
}

fn load_atomically(
    store: &dyn ObjectStore,
    key: &str,
    options: &LoadOptions,
    sink: &mut dyn StagingSink,
    report: &mut FileReport,
) -> Result<()> {
    sink.begin_file(key)?;
    let streamed = stream_file(store, key, options, sink, report)
        .and_then(|()| sink.commit_file());
    if streamed.is_err() {
        if let Err(rollback) = sink.rollback_file() {
            warn!("Rolling back {key} failed: {rollback:#}");
        }
    }
    streamed
}

fn stream_file(
    store: &dyn ObjectStore,
    key: &str,
    options: &LoadOptions,
    sink: &mut dyn StagingSink,
    report: &mut FileReport,
) -> Result<()> {
    let mut object = store
        .get(key)
        .with_context(|| format!("Opening object '{key}'"))?;
    debug!("Object {key} is {} byte(s)", object.len());
    let sample = io_utils::read_sample(&mut object, options.sample_bytes)
        .with_context(|| format!("Sampling object '{key}'"))?;
    let profile = format::detect(&sample);
    report.profile = Some(profile);
    info!(
        "Encoding detected: {} | delimiter: '{}'",
        profile.encoding.name(),
        io_utils::printable_delimiter(profile.delimiter)
    );

    let decoded = io_utils::decode_reader(io_utils::rejoin_sample(sample, object), profile);
    let mut reader = io_utils::open_csv_reader(decoded, profile.delimiter);
    let headers = reader
        .headers()
        .with_context(|| format!("Reading header of '{key}'"))?
        .clone();
    report.header = headers.iter().map(str::to_string).collect();
    info!("Original header of {key}: {:?}", report.header);

    let binding = SchemaBinding::resolve(headers.iter());
    if binding.is_empty() {
        info!("{key} has no recognised columns; nothing to load");
        return Ok(());
    }
    debug!(
        "Bound columns for {key}: {:?}",
        binding
            .columns()
            .iter()
            .map(|column| format!("{} <- {}", column.field.column_name(), column.source))
            .collect::<Vec<_>>()
    );
    report.binding = binding;

    let mut chunker = Chunker::new(headers.len(), options.chunk_size);
    let mut record = StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) if is_line_error(&err) => {
                debug!("Skipping malformed line in {key}: {err}");
                report.malformed_lines += 1;
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Reading records from '{key}'"));
            }
        }
        if !chunker.accepts(&record) {
            report.malformed_lines += 1;
            continue;
        }
        if chunker.push(&record) {
            flush_chunk(key, &mut chunker, sink, report)?;
        }
    }
    if !chunker.is_empty() {
        flush_chunk(key, &mut chunker, sink, report)?;
    }
    Ok(())
}

fn flush_chunk(
    key: &str,
    chunker: &mut Chunker,
    sink: &mut dyn StagingSink,
    report: &mut FileReport,
) -> Result<()> {
    let index = report.chunks.len() + 1;
    let rows_read = chunker.len();
    let normalized = report.binding.normalize(chunker.pending());
    chunker.clear();
    let validated = validate(normalized);

    let rows_loaded = if validated.is_empty() {
        0
    } else {
        sink.append_rows(&validated)
            .with_context(|| format!("Appending chunk {index} of '{key}'"))?
    };
    if rows_loaded > 0 {
        info!("Chunk {index}: {rows_loaded} row(s) inserted");
    } else {
        debug!("Chunk {index}: no valid rows");
    }
    report.record_chunk(ChunkReport {
        index,
        rows_read,
        rows_loaded,
        dropped: validated.dropped(),
    });
    Ok(())
}

fn is_line_error(err: &csv::Error) -> bool {
    matches!(
        err.kind(),
        csv::ErrorKind::UnequalLengths { .. } | csv::ErrorKind::Utf8 { .. }
    )
}

/// Bounded buffer of raw records for one chunk.
struct Chunker {
    width: usize,
    capacity: usize,
    pending: Vec<StringRecord>,
}

impl Chunker {
    fn new(width: usize, chunk_size: NonZeroUsize) -> Self {
        let capacity = chunk_size.get();
        Self {
            width,
            capacity,
            pending: Vec::with_capacity(capacity.min(MAX_PREALLOCATED_ROWS)),
        }
    }

    /// Records wider than the header cannot be attributed to columns.
    fn accepts(&self, record: &StringRecord) -> bool {
        record.len() <= self.width
    }

    /// Buffers `record`; returns `true` once the chunk is full.
    fn push(&mut self, record: &StringRecord) -> bool {
        self.pending.push(record.clone());
        self.pending.len() >= self.capacity
    }

    fn pending(&self) -> &[StringRecord] {
        &self.pending
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Reads a local file's sample and header without loading anything.
pub fn inspect<R: Read>(mut source: R, sample_bytes: usize) -> Result<(FormatProfile, SchemaBinding)> {
    let sample = io_utils::read_sample(&mut source, sample_bytes).context("Sampling input")?;
    let profile = format::detect(&sample);
    let decoded = io_utils::decode_reader(io_utils::rejoin_sample(sample, source), profile);
    let mut reader = io_utils::open_csv_reader(decoded, profile.delimiter);
    let headers = reader.headers().context("Reading header")?;
    Ok((profile, SchemaBinding::resolve(headers.iter())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sink::MemorySink, store::MemoryObjectStore, store::CSV_CONTENT_TYPE};

    fn options(chunk_size: usize) -> LoadOptions {
        LoadOptions {
            chunk_size: NonZeroUsize::new(chunk_size).expect("non-zero"),
            ..LoadOptions::default()
        }
    }

    fn load(body: &str, chunk_size: usize) -> (FileReport, MemorySink) {
        let store = MemoryObjectStore::new();
        store
            .put("eleicoes_2022/f.csv", body.as_bytes(), CSV_CONTENT_TYPE)
            .expect("put");
        let mut sink = MemorySink::new();
        sink.create_table_if_not_exists().expect("create");
        let report =
            load_file(&store, "eleicoes_2022/f.csv", &options(chunk_size), &mut sink).expect("load");
        (report, sink)
    }

    #[test]
    fn skips_lines_wider_than_header() {
        let (report, sink) = load("SG_UF;QT_VOTOS\nSP;1\nSP;2;extra\nRJ;3\n", 10);
        assert_eq!(report.malformed_lines, 1);
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(sink.row_count(), 2);
    }

    #[test]
    fn chunks_without_valid_rows_do_not_write() {
        let (report, sink) = load("SG_UF;QT_VOTOS\nSP;0\nSP;-1\nRJ;4\n", 2);
        assert_eq!(report.chunks.len(), 2);
        assert_eq!(report.chunks[0].rows_loaded, 0);
        assert_eq!(sink.batches.len(), 1);
        assert_eq!(report.dropped.non_positive_votes, 2);
    }

    #[test]
    fn header_only_file_loads_nothing() {
        let (report, sink) = load("SG_UF;QT_VOTOS\n", 10);
        assert!(report.chunks.is_empty());
        assert_eq!(sink.row_count(), 0);
    }

    #[test]
    fn inspect_reports_profile_and_binding() {
        let (profile, binding) =
            inspect("NR_CANDIDATO,QTDE_VOTOS\n13,5\n".as_bytes(), 1024).expect("inspect");
        assert_eq!(profile.delimiter, b',');
        assert_eq!(
            binding.source_for(crate::schema::CanonicalField::NrVotavel),
            Some("NR_CANDIDATO")
        );
    }
}
