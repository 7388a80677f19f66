// src/jobs/queue.rs

//! The job queue: at most one pending entry per job name.
//!
//! The master is the only user of a store: the scan tick inserts, the
//! dispatch tick takes, and failed results re-insert. `take` is the only way
//! an entry leaves the queue for a worker, and it removes the entry in the
//! same operation that returns it, so one queued entry is handed out at most
//! once.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{AvianError, Result};
use crate::fs::FileSystem;
use crate::jobs::model::QueueEntry;
use crate::types::QueueStorageMode;

/// Future returned by [`JobQueueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Relative path (from the app home) of the file-backed queue.
pub const QUEUE_FILE_PATH: &str = ".avian/cron-queue.json";

/// Key prefix for Redis-backed queue entries.
pub const REDIS_KEY_PREFIX: &str = "avian:cron:queue:";

/// Abstract storage for queued jobs, keyed by job name.
pub trait JobQueueStore: Send {
    /// Insert `entry` unless an entry with the same name is already queued.
    /// Returns whether it was inserted.
    fn insert_if_absent(&mut self, entry: QueueEntry) -> StoreFuture<'_, bool>;

    /// Remove and return the entry for `name`.
    fn take(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>>;

    /// Read the entry for `name` without removing it.
    fn get(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>>;

    /// Names of all queued jobs, sorted.
    fn names(&mut self) -> StoreFuture<'_, Vec<String>>;
}

/// Stores the queue in memory only.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    entries: BTreeMap<String, QueueEntry>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl JobQueueStore for MemoryQueueStore {
    fn insert_if_absent(&mut self, entry: QueueEntry) -> StoreFuture<'_, bool> {
        let inserted = insert_into(&mut self.entries, entry);
        Box::pin(async move { Ok(inserted) })
    }

    fn take(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        let entry = self.entries.remove(&name);
        Box::pin(async move { Ok(entry) })
    }

    fn get(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        let entry = self.entries.get(&name).cloned();
        Box::pin(async move { Ok(entry) })
    }

    fn names(&mut self) -> StoreFuture<'_, Vec<String>> {
        let names = self.entries.keys().cloned().collect();
        Box::pin(async move { Ok(names) })
    }
}

fn insert_into(entries: &mut BTreeMap<String, QueueEntry>, entry: QueueEntry) -> bool {
    if entries.contains_key(entry.name()) {
        debug!(job = %entry.name(), "job already queued; not inserting");
        return false;
    }
    entries.insert(entry.name().to_string(), entry);
    true
}

/// Stores the queue as JSON in `<home>/.avian/cron-queue.json`, so it
/// survives master restarts without a shared store.
#[derive(Debug)]
pub struct FileQueueStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileQueueStore {
    pub fn new(home: &Path, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: home.join(QUEUE_FILE_PATH),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, QueueEntry>> {
        if !self.fs.exists(&self.path) {
            return Ok(BTreeMap::new());
        }
        let contents = self.fs.read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &BTreeMap<String, QueueEntry>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        self.fs.write(&self.path, &json)?;
        Ok(())
    }
}

impl JobQueueStore for FileQueueStore {
    fn insert_if_absent(&mut self, entry: QueueEntry) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut entries = self.load()?;
            let inserted = insert_into(&mut entries, entry);
            if inserted {
                self.save(&entries)?;
            }
            Ok(inserted)
        })
    }

    fn take(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        Box::pin(async move {
            let mut entries = self.load()?;
            let entry = entries.remove(&name);
            if entry.is_some() {
                self.save(&entries)?;
            }
            Ok(entry)
        })
    }

    fn get(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        Box::pin(async move { Ok(self.load()?.remove(&name)) })
    }

    fn names(&mut self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.load()?.into_keys().collect()) })
    }
}

/// Stores the queue in Redis under `avian:cron:queue:<job name>`.
///
/// `SET .. NX` gives insert-if-absent and `GETDEL` gives an atomic take even
/// when several masters share one Redis.
pub struct RedisQueueStore {
    conn: redis::aio::MultiplexedConnection,
}

impl std::fmt::Debug for RedisQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueStore").finish_non_exhaustive()
    }
}

impl RedisQueueStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = %url, "connected to redis job queue");
        Ok(Self { conn })
    }

    fn key(name: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{name}")
    }
}

impl JobQueueStore for RedisQueueStore {
    fn insert_if_absent(&mut self, entry: QueueEntry) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let value = serde_json::to_string(&entry)?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(Self::key(entry.name()))
                .arg(value)
                .arg("NX")
                .query_async(&mut self.conn)
                .await?;
            Ok(reply.is_some())
        })
    }

    fn take(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        Box::pin(async move {
            let raw: Option<String> = redis::cmd("GETDEL")
                .arg(Self::key(&name))
                .query_async(&mut self.conn)
                .await?;
            raw.map(|s| serde_json::from_str(&s).map_err(AvianError::from))
                .transpose()
        })
    }

    fn get(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        Box::pin(async move {
            let raw: Option<String> = redis::cmd("GET")
                .arg(Self::key(&name))
                .query_async(&mut self.conn)
                .await?;
            raw.map(|s| serde_json::from_str(&s).map_err(AvianError::from))
                .transpose()
        })
    }

    fn names(&mut self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let keys: Vec<String> = redis::cmd("KEYS")
                .arg(format!("{REDIS_KEY_PREFIX}*"))
                .query_async(&mut self.conn)
                .await?;
            let mut names: Vec<String> = keys
                .iter()
                .filter_map(|k| k.strip_prefix(REDIS_KEY_PREFIX))
                .map(str::to_string)
                .collect();
            names.sort();
            Ok(names)
        })
    }
}

/// Open the store selected by `[cron].storage`.
pub async fn open_store(
    mode: QueueStorageMode,
    home: &Path,
    redis_url: Option<&str>,
    fs: Arc<dyn FileSystem>,
) -> Result<Box<dyn JobQueueStore>> {
    match mode {
        QueueStorageMode::Memory => Ok(Box::new(MemoryQueueStore::new())),
        QueueStorageMode::File => Ok(Box::new(FileQueueStore::new(home, fs))),
        QueueStorageMode::Redis => {
            let url = redis_url.ok_or_else(|| {
                AvianError::ConfigError("redis queue storage requires [cron].redis_url".into())
            })?;
            Ok(Box::new(RedisQueueStore::connect(url).await?))
        }
    }
}
