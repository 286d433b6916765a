//! Named cache partitions.
//!
//! A partition maps request identity to the last response stored for it.
//! Partitions are created lazily by [`CacheStorage::open`] and destroyed only
//! by [`CacheStorage::delete`]. A partition handle obtained before its
//! deletion stays usable but is detached from storage.
//!
//! Two backends are provided:
//! - [`MemoryStorage`]: process-local, used by embedders that persist
//!   elsewhere and by tests
//! - [`FileStorage`]: one JSON document per partition on disk, surviving
//!   restarts

pub mod file;
pub mod memory;

pub use file::{FilePartition, FileStorage};
pub use memory::{MemoryPartition, MemoryStorage};

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::http::{CachedResponse, Method, Request, RequestKey, Response};

#[async_trait]
pub trait Partition: Send + Sync {
    fn name(&self) -> &str;

    /// Stored response for `request`, if any. Only GET requests match.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>>;

    /// Store `response` under `request`, replacing any previous entry.
    async fn put(&self, request: &Request, response: Response) -> Result<()>;

    /// Store several entries at once. Either all entries are written or,
    /// when any request is not cacheable, none are.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<()> {
        for (request, _) in &entries {
            ensure_cacheable(&request.method)?;
        }
        for (request, response) in entries {
            self.put(&request, response).await?;
        }
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool>;

    /// Keys in insertion order.
    async fn keys(&self) -> Result<Vec<RequestKey>>;
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    type Partition: Partition + Clone + 'static;

    /// Open a partition, creating it empty if absent.
    async fn open(&self, name: &str) -> Result<Self::Partition>;

    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a partition and every entry in it. Returns false when no such
    /// partition existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Partition names, oldest first.
    async fn keys(&self) -> Result<Vec<String>>;

    /// First stored response for `request` across all partitions, searched
    /// in creation order.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        for name in self.keys().await? {
            let partition = self.open(&name).await?;
            if let Some(response) = partition.match_request(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

pub(crate) fn ensure_cacheable(method: &Method) -> Result<()> {
    if *method == Method::Get {
        Ok(())
    } else {
        Err(CacheError::UnsupportedMethod(method.clone()))
    }
}

/// Replace the entry for `key` in place, or append it.
pub(crate) fn upsert(entries: &mut Vec<CachedResponse>, key: RequestKey, response: Response) {
    match entries.iter_mut().find(|e| e.key == key) {
        Some(existing) => *existing = CachedResponse::new(key, response),
        None => entries.push(CachedResponse::new(key, response)),
    }
}
