use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ensure_cacheable, upsert, CacheStorage, Partition};
use crate::error::Result;
use crate::http::{CachedResponse, Method, Request, RequestKey, Response};

/// In-memory partitions. Clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    // Vec keeps creation order for `keys` and `match_any`.
    partitions: Arc<RwLock<Vec<MemoryPartition>>>,
}

#[derive(Debug, Clone)]
pub struct MemoryPartition {
    name: Arc<str>,
    entries: Arc<RwLock<Vec<CachedResponse>>>,
}

impl MemoryPartition {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Partition for MemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if request.method != Method::Get {
            return Ok(None);
        }
        let key = request.key();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.response.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        ensure_cacheable(&request.method)?;
        let mut entries = self.entries.write().await;
        upsert(&mut entries, request.key(), response);
        Ok(())
    }

    async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<()> {
        for (request, _) in &batch {
            ensure_cacheable(&request.method)?;
        }
        let mut entries = self.entries.write().await;
        for (request, response) in batch {
            upsert(&mut entries, request.key(), response);
        }
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        let key = request.key();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.key != key);
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().map(|e| e.key.clone()).collect())
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    type Partition = MemoryPartition;

    async fn open(&self, name: &str) -> Result<MemoryPartition> {
        let mut partitions = self.partitions.write().await;
        if let Some(existing) = partitions.iter().find(|p| &*p.name == name) {
            return Ok(existing.clone());
        }
        let partition = MemoryPartition::new(name);
        partitions.push(partition.clone());
        Ok(partition)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let partitions = self.partitions.read().await;
        Ok(partitions.iter().any(|p| &*p.name == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        let before = partitions.len();
        partitions.retain(|p| &*p.name != name);
        Ok(partitions.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let partitions = self.partitions.read().await;
        Ok(partitions.iter().map(|p| p.name.to_string()).collect())
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        let partitions = self.partitions.read().await.clone();
        for partition in partitions {
            if let Some(response) = partition.match_request(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
