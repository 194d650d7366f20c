//! Object storage for raw election files.
//!
//! The loader only needs `list`, `get` and `put`. [`FsObjectStore`] maps a
//! bucket onto a directory (keys are `/`-separated paths below it);
//! [`MemoryObjectStore`] keeps objects in memory for tests and embedding.

use std::{
    collections::BTreeMap,
    fs,
    io::{Cursor, Read},
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use walkdir::WalkDir;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

pub trait ObjectStore {
    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
    fn get(&self, key: &str) -> Result<ObjectReader>;
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
}

/// Readable handle to one object. Dropping it releases the underlying resource.
pub struct ObjectReader {
    length: u64,
    inner: Box<dyn Read + Send>,
}

impl ObjectReader {
    pub fn new(length: u64, inner: Box<dyn Read + Send>) -> Self {
        Self { length, inner }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    bucket_dir: PathBuf,
}

impl FsObjectStore {
    /// Opens `bucket` under `root`, creating it when absent.
    pub fn open(root: &Path, bucket: &str) -> Result<Self> {
        validate_bucket_name(bucket)?;
        let bucket_dir = root.join(bucket);
        if bucket_dir.is_dir() {
            info!("Bucket '{bucket}' already exists");
        } else {
            fs::create_dir_all(&bucket_dir)
                .with_context(|| format!("Creating bucket directory {bucket_dir:?}"))?;
            info!("Bucket '{bucket}' created");
        }
        Ok(Self { bucket_dir })
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !well_formed {
            bail!("Invalid object key '{key}'");
        }
        Ok(self.bucket_dir.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.bucket_dir).follow_links(false) {
            let entry =
                entry.with_context(|| format!("Walking bucket directory {:?}", self.bucket_dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.bucket_dir)
                .with_context(|| format!("Resolving key for {:?}", entry.path()))?;
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<ObjectReader> {
        let path = self.object_path(key)?;
        let file = fs::File::open(&path).with_context(|| format!("Opening object {path:?}"))?;
        let length = file
            .metadata()
            .with_context(|| format!("Reading metadata for {path:?}"))?
            .len();
        Ok(ObjectReader::new(length, Box::new(file)))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
        }
        fs::write(&path, bytes).with_context(|| format!("Writing object {path:?}"))?;
        debug!("Stored '{key}' ({} byte(s), {content_type})", bytes.len());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(key).cloned()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("Object store lock poisoned"))?;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get(&self, key: &str) -> Result<ObjectReader> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("Object store lock poisoned"))?;
        let object = objects
            .get(key)
            .ok_or_else(|| anyhow!("Object '{key}' not found"))?;
        Ok(ObjectReader::new(
            object.bytes.len() as u64,
            Box::new(Cursor::new(object.bytes.clone())),
        ))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("Object store lock poisoned"))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

fn validate_bucket_name(bucket: &str) -> Result<()> {
    let valid = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && bucket != "."
        && bucket != "..";
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Invalid bucket name '{bucket}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fs_store_round_trips_and_lists_sorted_keys_under_prefix() {
        let dir = tempdir().expect("temp dir");
        let store = FsObjectStore::open(dir.path(), "raw-data").expect("open store");
        store
            .put("eleicoes_2022/b.csv", b"b", CSV_CONTENT_TYPE)
            .expect("put b");
        store
            .put("eleicoes_2022/a.csv", b"a", CSV_CONTENT_TYPE)
            .expect("put a");
        store.put("outros/c.csv", b"c", CSV_CONTENT_TYPE).expect("put c");

        let keys = store.list("eleicoes_2022/").expect("list");
        assert_eq!(keys, vec!["eleicoes_2022/a.csv", "eleicoes_2022/b.csv"]);

        let mut object = store.get("eleicoes_2022/b.csv").expect("get");
        assert_eq!(object.len(), 1);
        let mut body = String::new();
        object.read_to_string(&mut body).expect("read");
        assert_eq!(body, "b");
    }

    #[test]
    fn fs_store_open_is_idempotent() {
        let dir = tempdir().expect("temp dir");
        FsObjectStore::open(dir.path(), "raw-data").expect("first open");
        FsObjectStore::open(dir.path(), "raw-data").expect("second open");
        assert!(dir.path().join("raw-data").is_dir());
    }

    #[test]
    fn fs_store_rejects_keys_escaping_the_bucket() {
        let dir = tempdir().expect("temp dir");
        let store = FsObjectStore::open(dir.path(), "raw-data").expect("open store");
        assert!(store.put("../escape.csv", b"x", CSV_CONTENT_TYPE).is_err());
        assert!(store.get("/etc/passwd").is_err());
        assert!(FsObjectStore::open(dir.path(), "..").is_err());
    }

    #[test]
    fn memory_store_records_content_type() {
        let store = MemoryObjectStore::new();
        store.put("k.csv", b"x", CSV_CONTENT_TYPE).expect("put");
        assert_eq!(store.object("k.csv").expect("object").content_type, "text/csv");
        assert!(store.get("missing.csv").is_err());
    }
}
