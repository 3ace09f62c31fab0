use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::{
    error::{CoreError, Result},
    record::MinerRecord,
};

/// Durable home of the whole registry, read and written as one unit
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Raw records; an empty list if nothing was ever written
    async fn read(&self) -> Result<Vec<Value>>;

    /// Atomically replace the stored registry
    async fn write(&self, records: Vec<MinerRecord>) -> Result<()>;
}

/// JSON file store; writes go to a sibling temp file that is renamed into place.
///
/// A write that outlives its timeout keeps running in the blocking pool, so writes
/// are numbered and serialized, and one older than the file's content is dropped.
pub struct FileStore {
    path: PathBuf,
    io_timeout: Duration,
    next_generation: AtomicU64,
    /// Generation of the snapshot currently in the file
    written: Arc<Mutex<u64>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            io_timeout,
            next_generation: AtomicU64::new(1),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "miners.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match timeout(self.io_timeout, tokio::task::spawn_blocking(op)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(CoreError::Persistence(std::io::Error::new(ErrorKind::Other, join))),
            Err(_) => Err(CoreError::PersistenceTimeout),
        }
    }
}

#[async_trait]
impl RegistryStore for FileStore {
    async fn read(&self) -> Result<Vec<Value>> {
        let path = self.path.clone();

        self.bounded(move || {
            let contents = match std::fs::read(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!("No registry at {}, starting empty", path.display());
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            };

            if contents.iter().all(|b| b.is_ascii_whitespace()) {
                return Ok(Vec::new());
            }

            let records: Vec<Value> = serde_json::from_slice(&contents)?;
            debug!("Read {} records from {}", records.len(), path.display());
            Ok(records)
        })
        .await
    }

    async fn write(&self, records: Vec<MinerRecord>) -> Result<()> {
        let path = self.path.clone();
        let temp = self.temp_path();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let written = self.written.clone();

        self.bounded(move || replace_file(&written, generation, &path, &temp, &records).map(|_| ()))
            .await
    }
}

/// Write `records` as snapshot `generation`, unless a newer one is already in place.
/// True if the file was replaced.
fn replace_file(
    written: &Mutex<u64>,
    generation: u64,
    path: &Path,
    temp: &Path,
    records: &[MinerRecord],
) -> Result<bool> {
    let mut current = written.lock();
    if *current > generation {
        debug!("Dropping stale registry write #{} (file holds #{})", generation, *current);
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(records)?;
    std::fs::write(temp, json)?;
    std::fs::rename(temp, path)?;
    *current = generation;

    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(true)
}

/// In-memory store, for ephemeral registries and tests
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Value>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw values, malformed ones included
    pub fn with_values(values: Vec<Value>) -> Self {
        Self {
            records: Mutex::new(values),
            writes: Mutex::new(0),
        }
    }

    /// Number of completed writes
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn values(&self) -> Vec<Value> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn read(&self) -> Result<Vec<Value>> {
        Ok(self.records.lock().clone())
    }

    async fn write(&self, records: Vec<MinerRecord>) -> Result<()> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        *self.records.lock() = values;
        *self.writes.lock() += 1;
        Ok(())
    }
}
