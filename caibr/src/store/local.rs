use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use log::*;
use tokio::fs;

use super::{ChunkStore, IdStream, StoreError, StoreStats};
use crate::{cacnk, ChunkId};

/// Chunk store backed by a local directory.
///
/// Chunks are stored as `{aa}/{bb}/{hex-id}.cacnk` where `aa` and `bb`
/// are the first two hex pairs of the id. Writes go to a temporary file
/// which is fsynced and renamed into place, so concurrent readers never
/// observe a partially written chunk under its final name.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub async fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        fs::create_dir_all(root.as_ref()).await?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a chunk with the given id is stored at.
    pub fn path_of(&self, id: &ChunkId) -> PathBuf {
        let hex = id.to_string();
        self.root
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(cacnk::file_name(id))
    }
}

#[async_trait]
impl ChunkStore for LocalStore {
    async fn put(&self, id: &ChunkId, data: Bytes) -> Result<(), StoreError> {
        let path = self.path_of(id);
        if fs::try_exists(&path).await? {
            debug!("chunk {} already in store", id);
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&root)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|err| StoreError::IO(err.error))?;
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))?
    }

    async fn get(&self, id: &ChunkId) -> Result<Bytes, StoreError> {
        match fs::read(self.path_of(id)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(*id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, id: &ChunkId) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.path_of(id)).await?)
    }

    async fn delete(&self, id: &ChunkId) -> Result<(), StoreError> {
        match fs::remove_file(self.path_of(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self, prefix: Option<String>) -> IdStream<'_> {
        let root = self.root.clone();
        Box::pin(
            stream::once(async move {
                tokio::task::spawn_blocking(move || walk_chunks(&root, prefix.as_deref()))
                    .await
                    .map_err(|err| StoreError::Backend(err.to_string()))?
            })
            .flat_map(|result| match result {
                Ok(entries) => {
                    stream::iter(entries.into_iter().map(|(id, _)| Ok(id)).collect::<Vec<_>>())
                }
                Err(err) => stream::iter(vec![Err(err)]),
            }),
        )
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || walk_chunks(&root, None))
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))??;
        Ok(StoreStats {
            backend: "local",
            chunk_count: Some(entries.len() as u64),
            total_bytes: Some(entries.iter().map(|(_, size)| size).sum()),
        })
    }
}

// Walk the store directory tree with an explicit queue, collecting the
// id and size of every chunk file. Non chunk files (e.g. leftover
// temporary files) are ignored.
fn walk_chunks(root: &Path, prefix: Option<&str>) -> Result<Vec<(ChunkId, u64)>, StoreError> {
    let mut chunks = Vec::new();
    let mut queue = vec![root.to_path_buf()];
    while let Some(dir) = queue.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                queue.push(path);
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(cacnk::CHUNK_FILE_EXT) {
                continue;
            }
            let id = match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(ChunkId::from_hex)
            {
                Some(id) => id,
                None => continue,
            };
            if let Some(prefix) = prefix {
                if !id.to_string().starts_with(prefix) {
                    continue;
                }
            }
            chunks.push((id, entry.metadata()?.len()));
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn store_in_tempdir() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn sharded_layout() {
        let (_dir, store) = store_in_tempdir().await;
        let id = ChunkId::from_data(b"chunk data");
        store.put(&id, Bytes::from_static(b"framed")).await.unwrap();
        let hex = id.to_string();
        let expected = store
            .root()
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{}.cacnk", hex));
        assert!(expected.is_file());
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"framed"));
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let (_dir, store) = store_in_tempdir().await;
        let id = ChunkId::from_data(b"chunk data");
        store.put(&id, Bytes::from_static(b"first")).await.unwrap();
        store.put(&id, Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn absent_chunk_behaviors() {
        let (_dir, store) = store_in_tempdir().await;
        let id = ChunkId::from_data(b"absent");
        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.exists(&id).await.unwrap());
        assert!(store.delete(&id).await.is_ok());
    }

    #[tokio::test]
    async fn list_and_stats() {
        let (_dir, store) = store_in_tempdir().await;
        let ids: Vec<ChunkId> = (0u32..10)
            .map(|token| ChunkId::from_data(&token.to_be_bytes()))
            .collect();
        for id in &ids {
            store.put(id, Bytes::from_static(b"12345678")).await.unwrap();
        }
        let mut listed: Vec<ChunkId> = store
            .list(None)
            .map(|result| result.unwrap())
            .collect()
            .await;
        listed.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(listed, expected);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.backend, "local");
        assert_eq!(stats.chunk_count, Some(10));
        assert_eq!(stats.total_bytes, Some(80));

        let prefix = ids[3].to_string()[..3].to_string();
        let filtered: Vec<ChunkId> = store
            .list(Some(prefix.clone()))
            .map(|result| result.unwrap())
            .collect()
            .await;
        assert!(filtered.iter().any(|id| *id == ids[3]));
        assert!(filtered
            .iter()
            .all(|id| id.to_string().starts_with(&prefix)));
    }

    #[tokio::test]
    async fn delete_removes_chunk() {
        let (_dir, store) = store_in_tempdir().await;
        let id = ChunkId::from_data(b"chunk data");
        store.put(&id, Bytes::from_static(b"framed")).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
    }
}
