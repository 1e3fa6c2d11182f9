//! Persistence layer: atomic units of work over a key-value store
//!
//! Every multi-record change (debit + wager + transaction, round + payout)
//! goes through a single `UnitOfWork`. Preconditions on the unit are checked
//! under the store's commit lock, so a stale writer is rejected by the store
//! itself rather than by assumptions in the caller.

use crate::config::StorageConfig;
use crate::errors::{CasinoResult, StorageError};
use parking_lot::{Mutex, RwLock};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Current envelope version for every persisted record.
pub const RECORD_VERSION: u16 = 1;

/// Condition a key must satisfy for a unit of work to commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Key must not exist
    Absent,
    /// Key must hold exactly these bytes
    Equals(Vec<u8>),
}

/// Write set applied atomically by `KeyValueStore::commit`
#[derive(Clone, Debug, Default)]
pub struct UnitOfWork {
    writes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    preconditions: Vec<(Vec<u8>, Precondition)>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.writes.push((key.into(), Some(value)));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.writes.push((key.into(), None));
    }

    /// Guard the commit on the current state of `key`
    pub fn expect(&mut self, key: impl Into<Vec<u8>>, condition: Precondition) {
        self.preconditions.push((key.into(), condition));
    }

    /// Guard on the bytes read earlier, or on absence when nothing was read
    pub fn expect_snapshot(&mut self, key: impl Into<Vec<u8>>, snapshot: Option<Vec<u8>>) {
        let condition = match snapshot {
            Some(bytes) => Precondition::Equals(bytes),
            None => Precondition::Absent,
        };
        self.expect(key, condition);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

/// Persistence collaborator consumed by the ledger and the game engines
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> CasinoResult<Option<Vec<u8>>>;

    /// Entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> CasinoResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every write in `unit` or none of them
    fn commit(&self, unit: UnitOfWork) -> CasinoResult<()>;
}

fn check_precondition(key: &[u8], condition: &Precondition, current: Option<&[u8]>) -> Result<(), StorageError> {
    let holds = match (condition, current) {
        (Precondition::Absent, None) => true,
        (Precondition::Equals(expected), Some(actual)) => expected.as_slice() == actual,
        _ => false,
    };

    if holds {
        Ok(())
    } else {
        Err(StorageError::PreconditionFailed {
            key: String::from_utf8_lossy(key).into_owned(),
        })
    }
}

/// RocksDB-backed store
#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::open(path, 64)
    }

    pub fn new_with_config(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.clear_on_start {
            tracing::warn!(path = %config.data_directory, "Clearing casino database on start");
            let _ = std::fs::remove_dir_all(&config.data_directory);
        }
        Self::open(&config.data_directory, config.write_buffer_size_mb)
    }

    fn open<P: AsRef<Path>>(path: P, write_buffer_mb: usize) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(write_buffer_mb * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path).map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }
}

impl KeyValueStore for OptimizedStorage {
    fn get(&self, key: &[u8]) -> CasinoResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> CasinoResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }

        Ok(rows)
    }

    fn commit(&self, unit: UnitOfWork) -> CasinoResult<()> {
        let _guard = self.commit_lock.lock();

        for (key, condition) in &unit.preconditions {
            let current = self.db.get(key).map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            check_precondition(key, condition, current.as_deref())?;
        }

        let mut batch = WriteBatch::default();
        for (key, value) in &unit.writes {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }
}

/// In-memory store with the same atomicity guarantees, for tests and demos
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &[u8]) -> CasinoResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> CasinoResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, unit: UnitOfWork) -> CasinoResult<()> {
        let mut data = self.data.write();

        for (key, condition) in &unit.preconditions {
            check_precondition(key, condition, data.get(key).map(|v| v.as_slice()))?;
        }

        for (key, value) in unit.writes {
            match value {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }

        Ok(())
    }
}

/// Versioned envelope around every stored record
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u16,
    data: T,
}

pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(&Envelope {
        version: RECORD_VERSION,
        data: record,
    })
    .map_err(|e| StorageError::WriteFailed(format!("Failed to encode record: {}", e)))
}

pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode record: {}", e)))?;

    if envelope.version != RECORD_VERSION {
        return Err(StorageError::CorruptedData(format!(
            "Unsupported record version {} (expected {})",
            envelope.version, RECORD_VERSION
        )));
    }

    Ok(envelope.data)
}

/// Load and decode a record, returning the raw bytes alongside for use as a precondition
pub fn load_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &[u8],
) -> CasinoResult<Option<(T, Vec<u8>)>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    let record = decode_record(&bytes)?;
    Ok(Some((record, bytes)))
}
