use crate::cache::{CacheStats, PayloadCache, SharedCache};
use crate::channels::ChannelRegistry;
use crate::clock::{SharedClock, SystemClock};
use crate::config::Settings;
use crate::generator::{compose_prompt, extract_titles, ContentGenerator, ScriptSession};
use crate::pagination::TitlePage;
use crate::store::{HttpStore, RemoteStore, TimeoutStore};
use crate::titles::TitleLibrary;
use crate::users::UserDirectory;
use crate::{Error, Result};
use getset::Getters;
use std::sync::Arc;
use uuid::Uuid;

/// Store handle shared by every service of a workspace.
pub type SharedStore<S> = Arc<TimeoutStore<S>>;

/// Everything one process needs, wired around a single cache instance.
///
/// Build one at startup and hand it to whatever serves requests; dropping
/// it drops the cache with it.
#[derive(Getters)]
#[get = "pub"]
pub struct ShortsWorkspace<S> {
    settings: Settings,
    cache: SharedCache,
    titles: TitleLibrary<SharedStore<S>>,
    channels: ChannelRegistry<SharedStore<S>>,
    users: UserDirectory<SharedStore<S>>,
}

impl ShortsWorkspace<HttpStore> {
    /// Workspace over the configured remote file service.
    pub fn connect(settings: Settings) -> Result<Self> {
        let store = HttpStore::from_settings(&settings)?;
        Self::new(settings, store)
    }
}

impl<S: RemoteStore> ShortsWorkspace<S> {
    pub fn new(settings: Settings, store: S) -> Result<Self> {
        Self::with_clock(settings, store, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, store: S, clock: SharedClock) -> Result<Self> {
        settings.validate()?;

        let store = Arc::new(TimeoutStore::new(store, settings.store_timeout()));
        let cache = Arc::new(PayloadCache::with_clock(settings.cache_config(), clock));
        log::debug!(
            "Workspace ready: ttl {}s, page size {}, policy {}",
            settings.ttl_seconds,
            settings.page_size,
            settings.title_policy
        );

        Ok(Self {
            titles: TitleLibrary::new(store.clone(), cache.clone(), settings.title_policy),
            channels: ChannelRegistry::new(store.clone(), cache.clone()),
            users: UserDirectory::new(store, cache.clone()),
            cache,
            settings,
        })
    }

    /// Page `page` of the channel's titles at the configured page size.
    pub async fn page(&self, channel: &str, page: usize) -> Result<TitlePage> {
        self.titles.page(channel, page, self.settings.page_size).await
    }

    /// Generate a script for `channel`, archive it and record its new
    /// titles. Nothing is written unless the generator returns a script.
    pub async fn generate_script<G>(
        &self,
        channel: &str,
        extra: Option<&str>,
        author: Option<&str>,
        generator: &G,
    ) -> Result<ScriptSession>
    where
        G: ContentGenerator + ?Sized,
    {
        let record = self.channels.get(channel).await?;
        let channel = record.name().as_str();
        let used = self.titles.titles(channel).await?;
        let prompt = compose_prompt(record.base_prompt(), &used, extra);

        let session_id = Uuid::new_v4().to_string();
        log::info!("Generating script for {} (session {})", channel, session_id);
        let script = generator.generate(&prompt).await.map_err(|err| {
            log::warn!("Generator failed for {}: {}", channel, err);
            err
        })?;
        if script.trim().is_empty() {
            return Err(Error::GeneratorFailure(format!(
                "empty script for channel {}",
                channel
            )));
        }

        // The script is archived before its titles are recorded
        self.channels
            .save_script(channel, &script, author, &session_id)
            .await?;
        let titles = extract_titles(&script);
        let outcome = self.titles.bulk_add(channel, &titles).await.map_err(|err| {
            log::warn!(
                "Script {} for {} was archived but its titles were not recorded: {}",
                session_id,
                channel,
                err
            );
            err
        })?;

        Ok(ScriptSession {
            session_id,
            channel: channel.to_string(),
            script,
            titles,
            outcome,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn evict_expired_cache(&self) -> usize {
        self.cache.evict_expired()
    }
}
