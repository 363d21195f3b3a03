use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use super::{ChunkStore, IdStream, StoreError, StoreStats};
use crate::ChunkId;

/// In-memory chunk store, used by tests and wherever deterministic
/// storage without a filesystem is wanted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: Mutex<HashMap<ChunkId, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<ChunkId, Bytes>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn put(&self, id: &ChunkId, data: Bytes) -> Result<(), StoreError> {
        self.locked().entry(*id).or_insert(data);
        Ok(())
    }

    async fn get(&self, id: &ChunkId) -> Result<Bytes, StoreError> {
        self.locked()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn exists(&self, id: &ChunkId) -> Result<bool, StoreError> {
        Ok(self.locked().contains_key(id))
    }

    async fn delete(&self, id: &ChunkId) -> Result<(), StoreError> {
        self.locked().remove(id);
        Ok(())
    }

    fn list(&self, prefix: Option<String>) -> IdStream<'_> {
        let ids: Vec<Result<ChunkId, StoreError>> = self
            .locked()
            .keys()
            .filter(|id| match &prefix {
                Some(prefix) => id.to_string().starts_with(prefix.as_str()),
                None => true,
            })
            .map(|id| Ok(*id))
            .collect();
        Box::pin(stream::iter(ids))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let chunks = self.locked();
        Ok(StoreStats {
            backend: "memory",
            chunk_count: Some(chunks.len() as u64),
            total_bytes: Some(chunks.values().map(|data| data.len() as u64).sum()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        let id = ChunkId::from_data(b"content");
        store.put(&id, Bytes::from_static(b"framed")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"framed"));
        assert!(store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryStore::new();
        let id = ChunkId::from_data(b"content");
        store.put(&id, Bytes::from_static(b"first")).await.unwrap();
        store.put(&id, Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn get_absent_is_not_found() {
        let store = MemoryStore::new();
        let id = ChunkId::from_data(b"absent");
        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn delete_absent_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete(&ChunkId::from_data(b"absent")).await.is_ok());
    }

    #[tokio::test]
    async fn list_with_prefix() {
        let store = MemoryStore::new();
        let mut ids: Vec<ChunkId> = (0u32..20)
            .map(|token| ChunkId::from_data(&token.to_be_bytes()))
            .collect();
        for id in &ids {
            store.put(id, Bytes::from_static(b"x")).await.unwrap();
        }
        ids.sort();

        let mut listed: Vec<ChunkId> = store
            .list(None)
            .map(|result| result.unwrap())
            .collect()
            .await;
        listed.sort();
        assert_eq!(listed, ids);

        let prefix = ids[0].to_string()[..2].to_string();
        let filtered: Vec<ChunkId> = store
            .list(Some(prefix.clone()))
            .map(|result| result.unwrap())
            .collect()
            .await;
        assert!(!filtered.is_empty());
        assert!(filtered
            .iter()
            .all(|id| id.to_string().starts_with(&prefix)));
    }

    #[tokio::test]
    async fn stats_reflect_content() {
        let store = MemoryStore::new();
        store
            .put(&ChunkId::from_data(b"a"), Bytes::from_static(b"12345"))
            .await
            .unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.chunk_count, Some(1));
        assert_eq!(stats.total_bytes, Some(5));
    }
}
