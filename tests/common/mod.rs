#![allow(dead_code)]

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, bail};
use tempfile::{TempDir, tempdir};
use tse_ingest::{
    sink::{MemorySink, StagingSink},
    store::{CSV_CONTENT_TYPE, MemoryObjectStore, ObjectReader, ObjectStore},
    validate::ValidatedChunk,
};

/// Scratch directory holding an object store root and a staging database.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store_root(&self) -> PathBuf {
        self.path().join("store")
    }

    pub fn database(&self) -> PathBuf {
        self.path().join("staging.db")
    }

    /// Writes raw bytes into a local file under the workspace and returns the path.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}

/// Builds a delimited file body from a header and rows, one line each.
pub fn csv_body(delimiter: char, header: &[&str], rows: &[&[&str]]) -> String {
    let sep = delimiter.to_string();
    let mut body = header.join(&sep);
    body.push('\n');
    for row in rows {
        body.push_str(&row.join(&sep));
        body.push('\n');
    }
    body
}

pub fn store_with(files: &[(&str, &[u8])]) -> MemoryObjectStore {
    let store = MemoryObjectStore::new();
    for (key, bytes) in files {
        store.put(key, bytes, CSV_CONTENT_TYPE).expect("put object");
    }
    store
}

/// Memory sink whose `n`-th append (1-based) fails.
pub struct FailingSink {
    pub inner: MemorySink,
    fail_on_append: usize,
    appends: usize,
}

impl FailingSink {
    pub fn failing_on(fail_on_append: usize) -> Self {
        Self {
            inner: MemorySink::new(),
            fail_on_append,
            appends: 0,
        }
    }
}

impl StagingSink for FailingSink {
    fn create_table_if_not_exists(&mut self) -> Result<()> {
        self.inner.create_table_if_not_exists()
    }

    fn append_rows(&mut self, chunk: &ValidatedChunk) -> Result<usize> {
        self.appends += 1;
        if self.appends == self.fail_on_append {
            bail!("connection reset by peer");
        }
        self.inner.append_rows(chunk)
    }

    fn begin_file(&mut self, key: &str) -> Result<()> {
        self.inner.begin_file(key)
    }

    fn commit_file(&mut self) -> Result<()> {
        self.inner.commit_file()
    }

    fn rollback_file(&mut self) -> Result<()> {
        self.inner.rollback_file()
    }
}

/// Sink whose table creation always fails.
pub struct UnavailableSink;

impl StagingSink for UnavailableSink {
    fn create_table_if_not_exists(&mut self) -> Result<()> {
        bail!("database is unreachable")
    }

    fn append_rows(&mut self, _chunk: &ValidatedChunk) -> Result<usize> {
        bail!("database is unreachable")
    }
}

/// Memory store whose readers count the bytes handed to the loader.
pub struct CountingStore {
    inner: MemoryObjectStore,
    bytes_read: Arc<AtomicU64>,
}

impl CountingStore {
    pub fn new(inner: MemoryObjectStore) -> Self {
        Self {
            inner,
            bytes_read: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bytes_read(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_read)
    }
}

impl ObjectStore for CountingStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }

    fn get(&self, key: &str) -> Result<ObjectReader> {
        let object = self.inner.get(key)?;
        let length = object.len();
        Ok(ObjectReader::new(
            length,
            Box::new(CountingReader {
                inner: object,
                bytes_read: Arc::clone(&self.bytes_read),
            }),
        ))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.inner.put(key, bytes, content_type)
    }
}

struct CountingReader {
    inner: ObjectReader,
    bytes_read: Arc<AtomicU64>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// What the loader had consumed when one chunk reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendSnapshot {
    pub bytes_read: u64,
    pub rows: usize,
}

/// Memory sink that snapshots source progress at every append.
pub struct ProgressSink {
    pub inner: MemorySink,
    pub appends: Vec<AppendSnapshot>,
    bytes_read: Arc<AtomicU64>,
}

impl ProgressSink {
    pub fn tracking(bytes_read: Arc<AtomicU64>) -> Self {
        Self {
            inner: MemorySink::new(),
            appends: Vec::new(),
            bytes_read,
        }
    }
}

impl StagingSink for ProgressSink {
    fn create_table_if_not_exists(&mut self) -> Result<()> {
        self.inner.create_table_if_not_exists()
    }

    fn append_rows(&mut self, chunk: &ValidatedChunk) -> Result<usize> {
        self.appends.push(AppendSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            rows: chunk.len(),
        });
        self.inner.append_rows(chunk)
    }
}
