use crate::cache::{CacheKey, SharedCache};
use crate::store::{Payload, RemoteStore, ResourceKey, WriteMode};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCRIPT_SEPARATOR_WIDTH: usize = 50;
const UNKNOWN_AUTHOR: &str = "Unknown User";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[get = "pub"]
pub struct ChannelRecord {
    name: String,
    base_prompt: String,
    created_at: DateTime<Utc>,
}

impl ChannelRecord {
    pub fn new(name: &str, base_prompt: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            base_prompt: base_prompt.to_string(),
            created_at,
        }
    }
}

/// Older channel files map a name straight to its prompt.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredChannel {
    Record(ChannelRecord),
    PromptOnly(String),
}

impl StoredChannel {
    fn into_record(self, name: &str) -> ChannelRecord {
        match self {
            StoredChannel::Record(record) => record,
            StoredChannel::PromptOnly(prompt) => {
                ChannelRecord::new(name, &prompt, DateTime::<Utc>::default())
            }
        }
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("channel name is empty".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidInput(format!(
            "channel name may not contain '/': {}",
            name
        )));
    }
    Ok(name)
}

/// Channel definitions, stored as one mapping document and read through
/// the shared cache.
pub struct ChannelRegistry<S> {
    store: S,
    cache: SharedCache,
    write_lock: Mutex<()>,
}

impl<S: RemoteStore> ChannelRegistry<S> {
    pub fn new(store: S, cache: SharedCache) -> Self {
        Self {
            store,
            cache,
            write_lock: Mutex::new(()),
        }
    }

    fn cache_key() -> CacheKey {
        CacheKey::from(&ResourceKey::ChannelConfig)
    }

    async fn load(&self) -> Result<BTreeMap<String, ChannelRecord>> {
        let payload = match self.cache.get(&Self::cache_key()) {
            Some(payload) => payload,
            None => {
                let payload = match self.store.read(&ResourceKey::ChannelConfig).await {
                    Ok(payload) => payload,
                    Err(Error::NotFound(_)) => Payload::empty_document(),
                    Err(err) => return Err(err),
                };
                let payload = Arc::new(payload);
                self.cache.put(Self::cache_key(), payload.clone());
                payload
            }
        };

        Ok(payload
            .decode_map::<StoredChannel>()?
            .into_iter()
            .map(|(name, stored)| {
                let record = stored.into_record(&name);
                (name, record)
            })
            .collect())
    }

    async fn persist(&self, record: &ChannelRecord) -> Result<()> {
        let mut update = BTreeMap::new();
        update.insert(record.name.clone(), record.clone());
        let written = self
            .store
            .write(
                &ResourceKey::ChannelConfig,
                Payload::encode_map(&update)?,
                WriteMode::Append,
            )
            .await;
        self.cache.invalidate(&Self::cache_key());
        written
    }

    /// All channels, ordered by name.
    pub async fn list(&self) -> Result<Vec<ChannelRecord>> {
        Ok(self.load().await?.into_values().collect())
    }

    pub async fn names(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.into_keys().collect())
    }

    pub async fn get(&self, name: &str) -> Result<ChannelRecord> {
        self.load()
            .await?
            .remove(name.trim())
            .ok_or_else(|| Error::NotFound(format!("channel {}", name.trim())))
    }

    pub async fn create(&self, name: &str, base_prompt: &str) -> Result<ChannelRecord> {
        let name = validate_name(name)?;
        let _guard = self.write_lock.lock().await;
        if self.load().await?.contains_key(name) {
            return Err(Error::AlreadyExists(format!("channel {}", name)));
        }

        let record = ChannelRecord::new(name, base_prompt.trim(), self.cache.now());
        self.persist(&record).await?;
        log::info!("Created channel {}", name);
        Ok(record)
    }

    pub async fn update_prompt(&self, name: &str, base_prompt: &str) -> Result<ChannelRecord> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .load()
            .await?
            .remove(name.trim())
            .ok_or_else(|| Error::NotFound(format!("channel {}", name.trim())))?;

        record.base_prompt = base_prompt.trim().to_string();
        self.persist(&record).await?;
        log::info!("Updated prompt of channel {}", record.name);
        Ok(record)
    }

    /// Append a generated script, with its author and session, to the
    /// channel's script archive. The archive is write-only from here and
    /// never cached.
    pub async fn save_script(
        &self,
        channel: &str,
        script: &str,
        author: Option<&str>,
        session_id: &str,
    ) -> Result<()> {
        let stamp = self.cache.now().format("%Y-%m-%d %H:%M:%S");
        let mut lines = vec![
            format!("Created by: {} on {}", author.unwrap_or(UNKNOWN_AUTHOR), stamp),
            format!("Session: {}", session_id),
        ];
        lines.extend(script.lines().map(str::to_string));
        lines.push("=".repeat(SCRIPT_SEPARATOR_WIDTH));

        self.store
            .write(
                &ResourceKey::Scripts(channel.to_string()),
                Payload::Lines(lines),
                WriteMode::Append,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, TtlCache};
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    fn registry(store: MemoryStore) -> ChannelRegistry<MemoryStore> {
        ChannelRegistry::new(store, Arc::new(TtlCache::new(CacheConfig::default())))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = registry(MemoryStore::new());
        registry.create("MovieFacts", "Write a short about a movie fact.").await.unwrap();
        registry.create("Space", "Write a short about space.").await.unwrap();

        assert_eq!(registry.names().await.unwrap(), ["MovieFacts", "Space"]);
        let record = registry.get("MovieFacts").await.unwrap();
        assert_eq!(record.base_prompt(), "Write a short about a movie fact.");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_names() {
        let registry = registry(MemoryStore::new());
        registry.create("MovieFacts", "prompt").await.unwrap();

        assert!(matches!(
            registry.create("MovieFacts", "again").await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(registry.create("  ", "p").await, Err(Error::InvalidInput(_))));
        assert!(matches!(registry.create("a/b", "p").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_prompt() {
        let registry = registry(MemoryStore::new());
        let created = registry.create("MovieFacts", "old").await.unwrap();

        let updated = registry.update_prompt("MovieFacts", "new").await.unwrap();
        assert_eq!(updated.base_prompt(), "new");
        assert_eq!(updated.created_at(), created.created_at());
        assert_eq!(registry.get("MovieFacts").await.unwrap().base_prompt(), "new");

        assert!(matches!(
            registry.update_prompt("Missing", "x").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_prompt_only_documents() {
        let store = MemoryStore::new();
        let mut doc = Map::new();
        doc.insert("MovieFacts".to_string(), json!("Write a short."));
        store
            .write(&ResourceKey::ChannelConfig, Payload::Document(doc), WriteMode::Overwrite)
            .await
            .unwrap();

        let record = registry(store).get("MovieFacts").await.unwrap();
        assert_eq!(record.base_prompt(), "Write a short.");
        assert_eq!(record.name(), "MovieFacts");
    }

    #[tokio::test]
    async fn test_save_script_appends() {
        let store = MemoryStore::new();
        let registry = registry(store.clone());

        registry
            .save_script("MovieFacts", "TITLE: One\nBody", Some("Ada"), "s-1")
            .await
            .unwrap();
        registry
            .save_script("MovieFacts", "TITLE: Two", None, "s-2")
            .await
            .unwrap();

        let stored = store
            .read(&ResourceKey::Scripts("MovieFacts".to_string()))
            .await
            .unwrap();
        let lines = stored.lines().unwrap();
        assert!(lines[0].starts_with("Created by: Ada on "));
        assert_eq!(lines[1], "Session: s-1");
        assert_eq!(lines[2], "TITLE: One");
        assert!(lines.iter().any(|line| line.starts_with("Created by: Unknown User")));
        assert_eq!(lines.last().map(String::len), Some(50));
    }
}
