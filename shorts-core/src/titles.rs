use crate::cache::{CacheKey, SharedCache};
use crate::deduplication::{BulkAddOutcome, TitleSet};
use crate::normalize::TitlePolicy;
use crate::pagination::TitlePage;
use crate::store::{Payload, RemoteStore, ResourceKey, ResourceKind, WriteMode};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const BACKUP_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Used titles per channel, read through the TTL cache.
///
/// The cache holds the raw titles payload; alongside it the library keeps
/// a `TitleSet` per channel, rebuilt whenever the payload is refetched.
/// Every operation on a channel runs under that channel's lock, so two
/// concurrent `add`s of the same title cannot both pass the duplicate
/// check.
///
/// Writes never patch the cached set in place: they go to the store and
/// then drop the channel from the cache, so the next read sees what the
/// store holds, including anything other writers appended meanwhile.
pub struct TitleLibrary<S> {
    store: S,
    cache: SharedCache,
    policy: TitlePolicy,
    index: DashMap<String, Arc<TitleSet>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds a channel's lock. Dropping it releases the lock and prunes the
/// channel's entry once nobody else holds or awaits it.
struct ChannelGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    channel: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.channel, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn titles_key(channel: &str) -> ResourceKey {
    ResourceKey::Titles(channel.to_string())
}

impl<S: RemoteStore> TitleLibrary<S> {
    pub fn new(store: S, cache: SharedCache, policy: TitlePolicy) -> Self {
        Self {
            store,
            cache,
            policy,
            index: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> TitlePolicy {
        self.policy
    }

    async fn lock(&self, channel: &str) -> ChannelGuard<'_> {
        let lock = self.locks.entry(channel.to_string()).or_default().clone();
        ChannelGuard {
            locks: &self.locks,
            channel: channel.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drop everything derived from the channel's titles. Done after every
    /// write, whether or not the store acknowledged it: an ambiguous
    /// failure may still have landed.
    fn forget(&self, channel: &str) {
        self.cache.invalidate(&CacheKey::from(&titles_key(channel)));
        self.index.remove(channel);
    }

    /// Current set for `channel`. Caller holds the channel lock.
    async fn load(&self, channel: &str) -> Result<Arc<TitleSet>> {
        Ok(self.load_stored(channel).await?.1)
    }

    /// The stored lines as fetched, next to the set derived from them.
    /// Writes that rewrite the resource start from the former.
    async fn load_stored(&self, channel: &str) -> Result<(Arc<Payload>, Arc<TitleSet>)> {
        let key = titles_key(channel);
        let cache_key = CacheKey::from(&key);

        if let Some(payload) = self.cache.get(&cache_key) {
            if let Some(set) = self.index.get(channel) {
                return Ok((payload, set.value().clone()));
            }
            let set = Arc::new(TitleSet::from_payload(self.policy, &payload)?);
            self.index.insert(channel.to_string(), set.clone());
            return Ok((payload, set));
        }

        let payload = match self.store.read(&key).await {
            Ok(payload) => payload,
            Err(Error::NotFound(_)) => {
                log::debug!("No titles stored yet for channel {}", channel);
                Payload::empty_lines()
            }
            Err(err) => {
                log::warn!("Failed to load titles for channel {}: {}", channel, err);
                return Err(err);
            }
        };

        let set = Arc::new(TitleSet::from_payload(self.policy, &payload)?);
        let payload = Arc::new(payload);
        self.cache.put(cache_key, payload.clone());
        self.index.insert(channel.to_string(), set.clone());
        log::debug!("Loaded {} titles for channel {}", set.len(), channel);
        Ok((payload, set))
    }

    /// The channel's used titles, from cache when fresh.
    pub async fn titles(&self, channel: &str) -> Result<Arc<TitleSet>> {
        let _guard = self.lock(channel).await;
        self.load(channel).await
    }

    /// Re-read the channel from the store regardless of cache age.
    pub async fn refresh(&self, channel: &str) -> Result<Arc<TitleSet>> {
        let _guard = self.lock(channel).await;
        self.forget(channel);
        self.load(channel).await
    }

    pub async fn contains(&self, channel: &str, title: &str) -> Result<bool> {
        Ok(self.titles(channel).await?.contains(title))
    }

    /// Record `title` unless it repeats a used one. Returns whether it was
    /// recorded.
    pub async fn add(&self, channel: &str, title: &str) -> Result<bool> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(false);
        }

        let _guard = self.lock(channel).await;
        let set = self.load(channel).await?;
        if let Some(existing) = set.find_match(title) {
            log::debug!("Skipping '{}' in {}: repeats '{}'", title, channel, existing);
            return Ok(false);
        }

        let written = self
            .store
            .write(
                &titles_key(channel),
                Payload::Lines(vec![title.to_string()]),
                WriteMode::Append,
            )
            .await;
        self.forget(channel);
        written?;

        log::info!("Added title to {}: {}", channel, title);
        Ok(true)
    }

    /// Like `add`, but a repeat is reported as `Error::DuplicateTitle`.
    pub async fn try_add(&self, channel: &str, title: &str) -> Result<()> {
        if self.add(channel, title).await? {
            Ok(())
        } else {
            Err(Error::DuplicateTitle {
                channel: channel.to_string(),
                title: title.trim().to_string(),
            })
        }
    }

    /// Record every new title of `titles` with a single append. Either the
    /// whole batch lands or the call fails and nothing counts as added.
    pub async fn bulk_add<I, T>(&self, channel: &str, titles: I) -> Result<BulkAddOutcome>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let _guard = self.lock(channel).await;
        let set = self.load(channel).await?;
        let outcome = set.filter_new(titles);
        if outcome.added.is_empty() {
            log::debug!(
                "Nothing new for {} ({} duplicates)",
                channel,
                outcome.duplicate_count()
            );
            return Ok(outcome);
        }

        let written = self
            .store
            .write(
                &titles_key(channel),
                Payload::Lines(outcome.added.clone()),
                WriteMode::Append,
            )
            .await;
        self.forget(channel);
        written?;

        log::info!(
            "Added {} titles to {} ({} duplicates skipped)",
            outcome.added_count(),
            channel,
            outcome.duplicate_count()
        );
        Ok(outcome)
    }

    /// Delete every stored line whose key equals `title`'s key. Other
    /// lines, including ones the set folds together, are written back as
    /// they were. Returns the first removed spelling.
    pub async fn remove(&self, channel: &str, title: &str) -> Result<String> {
        let _guard = self.lock(channel).await;
        let (payload, _) = self.load_stored(channel).await?;

        let target = self.policy.key(title);
        let (removed, kept): (Vec<String>, Vec<String>) = payload
            .lines()?
            .iter()
            .cloned()
            .partition(|line| !line.trim().is_empty() && self.policy.key(line) == target);
        let removed = removed
            .first()
            .map(|line| line.trim().to_string())
            .ok_or_else(|| Error::NotFound(format!("title '{}' in channel {}", title.trim(), channel)))?;

        let written = self
            .store
            .write(&titles_key(channel), Payload::Lines(kept), WriteMode::Overwrite)
            .await;
        self.forget(channel);
        written?;

        log::info!("Removed title from {}: {}", channel, removed);
        Ok(removed)
    }

    pub async fn clear(&self, channel: &str) -> Result<()> {
        let _guard = self.lock(channel).await;
        let written = self
            .store
            .write(&titles_key(channel), Payload::empty_lines(), WriteMode::Overwrite)
            .await;
        self.forget(channel);
        written?;

        log::info!("Cleared titles of {}", channel);
        Ok(())
    }

    /// Zero-based page of the channel's titles in sorted order.
    pub async fn page(&self, channel: &str, page: usize, page_size: usize) -> Result<TitlePage> {
        self.titles(channel).await?.page(page, page_size)
    }

    /// Copy the channel's titles file, line for line, to a timestamped
    /// backup resource. Returns `None` when there is nothing to back up.
    pub async fn backup(&self, channel: &str) -> Result<Option<ResourceKey>> {
        let _guard = self.lock(channel).await;
        let (payload, set) = self.load_stored(channel).await?;
        if set.is_empty() {
            return Ok(None);
        }

        let key = ResourceKey::Backup {
            channel: channel.to_string(),
            stamp: self.cache.now().format(BACKUP_STAMP_FORMAT).to_string(),
        };
        let lines = payload.lines()?.len();
        self.store.write(&key, (*payload).clone(), WriteMode::Overwrite).await?;

        log::info!("Backed up {} lines of {} to {}", lines, channel, key);
        Ok(Some(key))
    }

    /// Backups of the channel's titles, oldest first.
    pub async fn backups(&self, channel: &str) -> Result<Vec<ResourceKey>> {
        let listed = match self.store.list(&ResourceKey::backups_prefix(channel)).await {
            Ok(keys) => keys,
            Err(Error::NotFound(_)) => Vec::new(),
            Err(err) => return Err(err),
        };
        let mut keys: Vec<_> = listed
            .into_iter()
            .filter(|key| key.kind() == ResourceKind::Backup && key.channel() == Some(channel))
            .collect();
        keys.sort_by_key(ResourceKey::path);
        Ok(keys)
    }
}
