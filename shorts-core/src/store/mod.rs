pub mod http;
pub mod memory;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString};

pub use http::HttpStore;
pub use memory::MemoryStore;

/// The families of resources kept in the remote store. Used as the first
/// half of a cache key and for per-kind TTL overrides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ChannelConfig,
    Titles,
    Scripts,
    Backup,
    Users,
    PendingUsers,
}

/// A named resource in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    ChannelConfig,
    Titles(String),
    Scripts(String),
    Backup { channel: String, stamp: String },
    Users,
    PendingUsers,
}

const CHANNELS_FILE: &str = "channels.json";
const USERS_FILE: &str = "users.json";
const PENDING_USERS_FILE: &str = "pending_users.json";
const BACKUP_DIR: &str = "backups";

impl ResourceKey {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceKey::ChannelConfig => ResourceKind::ChannelConfig,
            ResourceKey::Titles(_) => ResourceKind::Titles,
            ResourceKey::Scripts(_) => ResourceKind::Scripts,
            ResourceKey::Backup { .. } => ResourceKind::Backup,
            ResourceKey::Users => ResourceKind::Users,
            ResourceKey::PendingUsers => ResourceKind::PendingUsers,
        }
    }

    /// Channel the resource belongs to, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            ResourceKey::Titles(channel)
            | ResourceKey::Scripts(channel)
            | ResourceKey::Backup { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Slash separated location of the resource inside the store.
    pub fn path(&self) -> String {
        match self {
            ResourceKey::ChannelConfig => CHANNELS_FILE.to_string(),
            ResourceKey::Users => USERS_FILE.to_string(),
            ResourceKey::PendingUsers => PENDING_USERS_FILE.to_string(),
            ResourceKey::Titles(channel) => {
                format!("{}/titles_{}.txt", channel, channel.to_lowercase())
            }
            ResourceKey::Scripts(channel) => {
                format!("{}/saved_scripts_{}.txt", channel, channel.to_lowercase())
            }
            ResourceKey::Backup { channel, stamp } => {
                format!("{}/{}/titles_{}.txt", channel, BACKUP_DIR, stamp)
            }
        }
    }

    /// Prefix shared by every backup of `channel`'s titles.
    pub fn backups_prefix(channel: &str) -> String {
        format!("{}/{}/", channel, BACKUP_DIR)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for ResourceKey {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        match path {
            CHANNELS_FILE => return Ok(ResourceKey::ChannelConfig),
            USERS_FILE => return Ok(ResourceKey::Users),
            PENDING_USERS_FILE => return Ok(ResourceKey::PendingUsers),
            _ => {}
        }

        let unknown = || Error::InvalidInput(format!("unrecognised resource path: {}", path));
        let (channel, rest) = path.split_once('/').ok_or_else(unknown)?;
        if channel.is_empty() {
            return Err(unknown());
        }
        let lower = channel.to_lowercase();

        if rest == format!("titles_{}.txt", lower) {
            return Ok(ResourceKey::Titles(channel.to_string()));
        }
        if rest == format!("saved_scripts_{}.txt", lower) {
            return Ok(ResourceKey::Scripts(channel.to_string()));
        }
        if let Some(stamp) = rest
            .strip_prefix(BACKUP_DIR)
            .and_then(|r| r.strip_prefix("/titles_"))
            .and_then(|r| r.strip_suffix(".txt"))
        {
            if !stamp.is_empty() && !stamp.contains('/') {
                return Ok(ResourceKey::Backup {
                    channel: channel.to_string(),
                    stamp: stamp.to_string(),
                });
            }
        }

        Err(unknown())
    }
}

/// Body of a stored resource: an ordered list of lines (titles, scripts)
/// or a JSON mapping (channel config, user records).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Lines(Vec<String>),
    Document(Map<String, Value>),
}

impl Payload {
    pub fn empty_lines() -> Self {
        Payload::Lines(Vec::new())
    }

    pub fn empty_document() -> Self {
        Payload::Document(Map::new())
    }

    /// Split a text file into its non-blank, trimmed lines.
    pub fn from_text(text: &str) -> Self {
        Payload::Lines(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn lines(&self) -> Result<&[String]> {
        match self {
            Payload::Lines(lines) => Ok(lines),
            Payload::Document(_) => Err(Error::InvalidPayload(
                "expected a list of lines, found a document".to_string(),
            )),
        }
    }

    pub fn document(&self) -> Result<&Map<String, Value>> {
        match self {
            Payload::Document(doc) => Ok(doc),
            Payload::Lines(_) => Err(Error::InvalidPayload(
                "expected a document, found a list of lines".to_string(),
            )),
        }
    }

    /// Decode a mapping payload into typed records. A never-written
    /// resource reads back as an empty list and decodes to an empty map.
    pub fn decode_map<T: DeserializeOwned>(&self) -> Result<BTreeMap<String, T>> {
        match self {
            Payload::Lines(lines) if lines.is_empty() => Ok(BTreeMap::new()),
            _ => self
                .document()?
                .iter()
                .map(|(key, value)| -> Result<(String, T)> {
                    Ok((key.clone(), serde_json::from_value(value.clone())?))
                })
                .collect(),
        }
    }

    pub fn encode_map<'a, T, I>(records: I) -> Result<Self>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a String, &'a T)>,
    {
        let mut doc = Map::new();
        for (key, record) in records {
            doc.insert(key.clone(), serde_json::to_value(record)?);
        }
        Ok(Payload::Document(doc))
    }

    /// Apply `WriteMode::Append` semantics: lines are extended, document
    /// keys are merged with the incoming values winning.
    pub fn append(&mut self, other: Payload) -> Result<()> {
        if matches!(self, Payload::Lines(lines) if lines.is_empty()) {
            *self = other;
            return Ok(());
        }
        match (self, other) {
            (Payload::Lines(existing), Payload::Lines(more)) => {
                existing.extend(more);
                Ok(())
            }
            (Payload::Document(existing), Payload::Document(more)) => {
                existing.extend(more);
                Ok(())
            }
            _ => Err(Error::InvalidPayload(
                "cannot append lines to a document or a document to lines".to_string(),
            )),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        match self {
            Payload::Lines(lines) => Ok(lines.iter().map(|line| format!("{}\n", line)).collect()),
            Payload::Document(doc) => Ok(serde_json::to_string_pretty(doc)?),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WriteMode {
    Overwrite,
    Append,
}

/// The authoritative, shared persistence layer.
///
/// Implementations may be slow and may fail ambiguously: a write that
/// returns an error can still have landed remotely. Callers filter
/// duplicates before appending instead of relying on the store for it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a resource. Absent resources are `Error::NotFound`.
    async fn read(&self, key: &ResourceKey) -> Result<Payload>;

    /// Replace or extend a resource, creating it when absent.
    async fn write(&self, key: &ResourceKey, payload: Payload, mode: WriteMode) -> Result<()>;

    /// Keys of every resource whose path starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ResourceKey>>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    async fn read(&self, key: &ResourceKey) -> Result<Payload> {
        (**self).read(key).await
    }

    async fn write(&self, key: &ResourceKey, payload: Payload, mode: WriteMode) -> Result<()> {
        (**self).write(key, payload, mode).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ResourceKey>> {
        (**self).list(prefix).await
    }
}

/// Bounds every call to the wrapped store. A call that does not finish in
/// time is reported as `Error::StoreUnavailable` and is not retried.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn timed_out(&self, operation: &str, target: &dyn fmt::Display) -> Error {
        log::warn!("Store {} of {} timed out after {:?}", operation, target, self.timeout);
        Error::StoreUnavailable(format!(
            "{} of {} timed out after {:?}",
            operation, target, self.timeout
        ))
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for TimeoutStore<S> {
    async fn read(&self, key: &ResourceKey) -> Result<Payload> {
        tokio::time::timeout(self.timeout, self.inner.read(key))
            .await
            .map_err(|_| self.timed_out("read", key))?
    }

    async fn write(&self, key: &ResourceKey, payload: Payload, mode: WriteMode) -> Result<()> {
        tokio::time::timeout(self.timeout, self.inner.write(key, payload, mode))
            .await
            .map_err(|_| self.timed_out("write", key))?
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ResourceKey>> {
        tokio::time::timeout(self.timeout, self.inner.list(prefix))
            .await
            .map_err(|_| self.timed_out("list", &prefix))?
    }
}
