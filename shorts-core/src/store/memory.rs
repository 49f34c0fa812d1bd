use super::{Payload, RemoteStore, ResourceKey, WriteMode};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-process store. Clones share the same files, which lets a test act
/// as a second writer behind the cache's back.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: Arc<DashMap<ResourceKey, Payload>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read` calls served so far, hits and misses alike.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, key: &ResourceKey) -> Result<Payload> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(key)
            .map(|payload| payload.value().clone())
            .ok_or_else(|| Error::NotFound(key.path()))
    }

    async fn write(&self, key: &ResourceKey, payload: Payload, mode: WriteMode) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        match (self.files.entry(key.clone()), mode) {
            (Entry::Occupied(mut existing), WriteMode::Append) => existing.get_mut().append(payload)?,
            (Entry::Occupied(mut existing), WriteMode::Overwrite) => {
                existing.insert(payload);
            }
            (Entry::Vacant(slot), _) => {
                slot.insert(payload);
            }
        }
        log::debug!("{} {}", mode, key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ResourceKey>> {
        let mut keys: Vec<_> = self
            .files
            .iter()
            .filter(|entry| entry.key().path().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_by_key(ResourceKey::path);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(channel: &str) -> ResourceKey {
        ResourceKey::Titles(channel.to_string())
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let store = MemoryStore::new();
        let err = store.read(&titles("MovieFacts")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(path) if path == "MovieFacts/titles_moviefacts.txt"));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_append_creates_then_extends() {
        let store = MemoryStore::new();
        let key = titles("MovieFacts");

        store
            .write(&key, Payload::Lines(vec!["Inception".to_string()]), WriteMode::Append)
            .await
            .unwrap();
        store
            .write(&key, Payload::Lines(vec!["Up".to_string()]), WriteMode::Append)
            .await
            .unwrap();

        assert_eq!(store.read(&key).await.unwrap().lines().unwrap(), ["Inception", "Up"]);

        store.write(&key, Payload::empty_lines(), WriteMode::Overwrite).await.unwrap();
        assert!(store.read(&key).await.unwrap().lines().unwrap().is_empty());
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryStore::new();
        for stamp in ["20240102_000000", "20240101_000000"] {
            let key = ResourceKey::Backup {
                channel: "MovieFacts".to_string(),
                stamp: stamp.to_string(),
            };
            store.write(&key, Payload::empty_lines(), WriteMode::Overwrite).await.unwrap();
        }
        store
            .write(&titles("MovieFacts"), Payload::empty_lines(), WriteMode::Overwrite)
            .await
            .unwrap();
        store
            .write(&titles("Other"), Payload::empty_lines(), WriteMode::Overwrite)
            .await
            .unwrap();

        let backups = store.list(&ResourceKey::backups_prefix("MovieFacts")).await.unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups[0].path().ends_with("20240101_000000.txt"));

        let channel = store.list("MovieFacts/").await.unwrap();
        assert_eq!(channel.len(), 3);
    }
}
