use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ChunkStore, IdStream, StoreError, StoreStats};
use crate::ChunkId;

/// Applies a per call deadline to every operation of an inner store.
///
/// An operation which does not complete within the deadline resolves to
/// [`StoreError::Timeout`]. Listing is passed through as is since it
/// yields items incrementally.
#[derive(Debug)]
pub struct TimeoutStore<S> {
    inner: S,
    deadline: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S> ChunkStore for TimeoutStore<S>
where
    S: ChunkStore,
{
    async fn put(&self, id: &ChunkId, data: Bytes) -> Result<(), StoreError> {
        match tokio::time::timeout(self.deadline, self.inner.put(id, data)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn get(&self, id: &ChunkId) -> Result<Bytes, StoreError> {
        match tokio::time::timeout(self.deadline, self.inner.get(id)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn exists(&self, id: &ChunkId) -> Result<bool, StoreError> {
        match tokio::time::timeout(self.deadline, self.inner.exists(id)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn delete(&self, id: &ChunkId) -> Result<(), StoreError> {
        match tokio::time::timeout(self.deadline, self.inner.delete(id)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    fn list(&self, prefix: Option<String>) -> IdStream<'_> {
        self.inner.list(prefix)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        match tokio::time::timeout(self.deadline, self.inner.stats()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    // Store which stalls on every get.
    struct StallingStore(MemoryStore);

    #[async_trait]
    impl ChunkStore for StallingStore {
        async fn put(&self, id: &ChunkId, data: Bytes) -> Result<(), StoreError> {
            self.0.put(id, data).await
        }
        async fn get(&self, id: &ChunkId) -> Result<Bytes, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.0.get(id).await
        }
        async fn exists(&self, id: &ChunkId) -> Result<bool, StoreError> {
            self.0.exists(id).await
        }
        async fn delete(&self, id: &ChunkId) -> Result<(), StoreError> {
            self.0.delete(id).await
        }
        fn list(&self, prefix: Option<String>) -> IdStream<'_> {
            self.0.list(prefix)
        }
        async fn stats(&self) -> Result<StoreStats, StoreError> {
            self.0.stats().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_is_timeout() {
        let store = TimeoutStore::new(StallingStore(MemoryStore::new()), Duration::from_millis(10));
        let id = ChunkId::from_data(b"data");
        store.put(&id, Bytes::from_static(b"framed")).await.unwrap();
        assert!(matches!(store.get(&id).await, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn fast_operations_pass_through() {
        let store = TimeoutStore::new(MemoryStore::new(), Duration::from_secs(5));
        let id = ChunkId::from_data(b"data");
        store.put(&id, Bytes::from_static(b"framed")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"framed"));
        assert!(store.exists(&id).await.unwrap());
    }
}
