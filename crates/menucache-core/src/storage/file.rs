//! Disk-backed partitions.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   menu-elegante-cache-v1.json   # { name, created_at, entries: [...] }
//!   menu-data-cache-v1.json
//! ```
//!
//! Each partition is a single JSON document rewritten on every write
//! (write to `.tmp`, then rename). Writes to one partition are serialised
//! through a per-partition lock shared by all handles of this storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{ensure_cacheable, upsert, CacheStorage, Partition};
use crate::error::{CacheError, Result};
use crate::http::{CachedResponse, Method, Request, RequestKey, Response};

const PARTITION_EXT: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct PartitionFile {
    name: String,
    created_at: DateTime<Utc>,
    entries: Vec<CachedResponse>,
}

impl PartitionFile {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct PartitionState {
    lock: Mutex<()>,
    detached: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    states: Arc<Mutex<HashMap<String, Arc<PartitionState>>>>,
}

#[derive(Debug, Clone)]
pub struct FilePartition {
    name: String,
    path: PathBuf,
    state: Arc<PartitionState>,
}

/// Partition names become file names, so only a conservative character set
/// is accepted.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidPartitionName(name.to_string()))
    }
}

async fn read_partition(path: &Path) -> Result<Option<PartitionFile>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_partition(path: &Path, file: &PartitionFile) -> Result<()> {
    let contents = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension(format!("{}.tmp", PARTITION_EXT));
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, PARTITION_EXT))
    }

    async fn state(&self, name: &str) -> Arc<PartitionState> {
        let mut states = self.states.lock().await;
        Arc::clone(states.entry(name.to_string()).or_default())
    }

    /// Every partition on disk, oldest first, each file parsed once.
    /// Unreadable partitions are listed last with no contents so cleanup
    /// can still remove them.
    async fn scan(&self) -> Result<Vec<(String, Option<PartitionFile>)>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found: Vec<(DateTime<Utc>, String, Option<PartitionFile>)> = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PARTITION_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_name(name).is_err() {
                continue;
            }
            match read_partition(&path).await {
                Ok(Some(file)) => found.push((file.created_at, name.to_string(), Some(file))),
                Ok(None) => continue,
                Err(e) => {
                    warn!(partition = %name, error = %e, "Unreadable cache partition");
                    found.push((DateTime::<Utc>::MAX_UTC, name.to_string(), None));
                }
            }
        }

        found.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        Ok(found.into_iter().map(|(_, name, file)| (name, file)).collect())
    }
}

impl FilePartition {
    /// Current contents. A missing or unreadable file reads as empty; the
    /// next write replaces it.
    async fn load(&self) -> Result<PartitionFile> {
        match read_partition(&self.path).await {
            Ok(Some(file)) => Ok(file),
            Ok(None) => Ok(PartitionFile::empty(&self.name)),
            Err(CacheError::Serialization(e)) => {
                warn!(partition = %self.name, error = %e, "Unreadable cache partition, treating as empty");
                Ok(PartitionFile::empty(&self.name))
            }
            Err(e) => Err(e),
        }
    }

    fn is_detached(&self) -> bool {
        self.state.detached.load(Ordering::SeqCst)
    }

    /// Read-modify-write under the partition lock. Returns `None` without
    /// touching disk once the partition has been deleted.
    async fn modify<F, T>(&self, apply: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Vec<CachedResponse>) -> T + Send,
        T: Send,
    {
        let _guard = self.state.lock.lock().await;
        if self.is_detached() {
            debug!(partition = %self.name, "Dropping write to deleted partition");
            return Ok(None);
        }
        let mut file = self.load().await?;
        let outcome = apply(&mut file.entries);
        write_partition(&self.path, &file).await?;
        Ok(Some(outcome))
    }
}

#[async_trait]
impl Partition for FilePartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if request.method != Method::Get || self.is_detached() {
            return Ok(None);
        }
        let key = request.key();
        let _guard = self.state.lock.lock().await;
        let file = self.load().await?;
        Ok(file
            .entries
            .into_iter()
            .find(|e| e.key == key)
            .map(|e| e.response))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        ensure_cacheable(&request.method)?;
        let key = request.key();
        self.modify(move |entries| upsert(entries, key, response))
            .await?;
        Ok(())
    }

    async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<()> {
        for (request, _) in &batch {
            ensure_cacheable(&request.method)?;
        }
        self.modify(move |entries| {
            for (request, response) in batch {
                upsert(entries, request.key(), response);
            }
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        let key = request.key();
        let removed = self
            .modify(move |entries| {
                let before = entries.len();
                entries.retain(|e| e.key != key);
                entries.len() != before
            })
            .await?;
        Ok(removed.unwrap_or(false))
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        if self.is_detached() {
            return Ok(Vec::new());
        }
        let _guard = self.state.lock.lock().await;
        let file = self.load().await?;
        Ok(file.entries.into_iter().map(|e| e.key).collect())
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    type Partition = FilePartition;

    async fn open(&self, name: &str) -> Result<FilePartition> {
        validate_name(name)?;
        fs::create_dir_all(&self.root).await?;

        let state = self.state(name).await;
        let path = self.partition_path(name);
        {
            let _guard = state.lock.lock().await;
            match read_partition(&path).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!(partition = %name, "Creating cache partition");
                    write_partition(&path, &PartitionFile::empty(name)).await?;
                }
                Err(CacheError::Serialization(e)) => {
                    warn!(partition = %name, error = %e, "Resetting unreadable cache partition");
                    write_partition(&path, &PartitionFile::empty(name)).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(FilePartition {
            name: name.to_string(),
            path,
            state,
        })
    }

    async fn has(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(fs::try_exists(self.partition_path(name)).await?)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let state = self.state(name).await;
        let _guard = state.lock.lock().await;

        let removed = match fs::remove_file(self.partition_path(name)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        // Existing handles stay detached; a later open gets a fresh state.
        state.detached.store(true, Ordering::SeqCst);
        self.states.lock().await.remove(name);
        Ok(removed)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let scanned = self.scan().await?;
        Ok(scanned.into_iter().map(|(name, _)| name).collect())
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        if request.method != Method::Get {
            return Ok(None);
        }
        let key = request.key();
        for (_, file) in self.scan().await? {
            let found = file
                .and_then(|f| f.entries.into_iter().find(|e| e.key == key))
                .map(|e| e.response);
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}
