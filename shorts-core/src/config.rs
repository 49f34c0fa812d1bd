use crate::cache::CacheConfig;
use crate::normalize::TitlePolicy;
use crate::store::ResourceKind;
use crate::{Error, Result};
use chrono::Duration;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_TTL_SECONDS: u64 = 300;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 30_000;

/// Runtime settings.
///
/// Sources, lowest precedence first: built-in defaults, an optional YAML
/// file, then `SHORTS_*` environment variables (`SHORTS_TTL_SECONDS=60`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cache lifetime, and therefore the staleness bound for changes made
    /// by other processes.
    pub ttl_seconds: u64,
    pub page_size: usize,
    pub store_timeout_ms: u64,
    pub store_url: Option<String>,
    pub title_policy: TitlePolicy,
    pub kind_ttl_seconds: HashMap<ResourceKind, u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            page_size: DEFAULT_PAGE_SIZE,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            store_url: None,
            title_policy: TitlePolicy::default(),
            kind_ttl_seconds: HashMap::new(),
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "SHORTS_";

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(Self::ENV_PREFIX))
    }

    /// Load and validate. Any invalid value fails here, before anything
    /// talks to the store.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 || seconds(self.ttl_seconds).is_none() {
            return Err(Error::ConfigError(format!(
                "ttl_seconds must be a positive number of seconds, got {}",
                self.ttl_seconds
            )));
        }
        if self.page_size == 0 {
            return Err(Error::ConfigError("page_size must be positive".to_string()));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::ConfigError("store_timeout_ms must be positive".to_string()));
        }
        for (kind, ttl) in &self.kind_ttl_seconds {
            if *ttl == 0 || seconds(*ttl).is_none() {
                return Err(Error::ConfigError(format!(
                    "ttl override for {} must be a positive number of seconds, got {}",
                    kind, ttl
                )));
            }
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        let ttl = seconds(self.ttl_seconds).unwrap_or(Duration::MAX);
        self.kind_ttl_seconds
            .iter()
            .fold(CacheConfig::new(ttl), |config, (kind, secs)| {
                config.with_kind_ttl(*kind, seconds(*secs).unwrap_or(Duration::MAX))
            })
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}
