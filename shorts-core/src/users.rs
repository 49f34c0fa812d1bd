use crate::cache::{CacheKey, SharedCache};
use crate::store::{Payload, RemoteStore, ResourceKey, WriteMode};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[get = "pub"]
pub struct UserRecord {
    email: String,
    password_hash: String,
    status: ApprovalStatus,
    #[serde(default)]
    role: Role,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approved_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A freshly registered user. Hashing the password is the caller's job.
    pub fn pending(email: &str, password_hash: &str, role: Role, created_at: DateTime<Utc>) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            password_hash: password_hash.to_string(),
            status: ApprovalStatus::Pending,
            role,
            created_at,
            approved_at: None,
        }
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != ApprovalStatus::Pending {
            return Err(Error::InvalidTransition(format!(
                "user {} is {}, only pending users can be approved",
                self.email, self.status
            )));
        }
        self.status = ApprovalStatus::Approved;
        self.approved_at = Some(now);
        Ok(())
    }
}

/// Approved and pending users, each kept as a mapping document keyed by
/// email.
pub struct UserDirectory<S> {
    store: S,
    cache: SharedCache,
    write_lock: Mutex<()>,
}

impl<S: RemoteStore> UserDirectory<S> {
    pub fn new(store: S, cache: SharedCache) -> Self {
        Self {
            store,
            cache,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self, key: &ResourceKey) -> Result<BTreeMap<String, UserRecord>> {
        let cache_key = CacheKey::from(key);
        if let Some(payload) = self.cache.get(&cache_key) {
            return payload.decode_map();
        }

        let payload = match self.store.read(key).await {
            Ok(payload) => payload,
            Err(Error::NotFound(_)) => Payload::empty_document(),
            Err(err) => return Err(err),
        };
        let records = payload.decode_map()?;
        self.cache.put(cache_key, Arc::new(payload));
        Ok(records)
    }

    async fn save(&self, key: &ResourceKey, payload: Payload, mode: WriteMode) -> Result<()> {
        let written = self.store.write(key, payload, mode).await;
        self.cache.invalidate(&CacheKey::from(key));
        written
    }

    pub async fn approved(&self) -> Result<Vec<UserRecord>> {
        Ok(self.load(&ResourceKey::Users).await?.into_values().collect())
    }

    pub async fn pending(&self) -> Result<Vec<UserRecord>> {
        Ok(self.load(&ResourceKey::PendingUsers).await?.into_values().collect())
    }

    /// Look a user up by email in either document, approved first.
    pub async fn find(&self, email: &str) -> Result<Option<UserRecord>> {
        let email = email.trim().to_lowercase();
        if let Some(user) = self.load(&ResourceKey::Users).await?.remove(&email) {
            return Ok(Some(user));
        }
        Ok(self.load(&ResourceKey::PendingUsers).await?.remove(&email))
    }

    pub async fn register(&self, email: &str, password_hash: &str, role: Role) -> Result<UserRecord> {
        let record = UserRecord::pending(email, password_hash, role, self.cache.now());
        if record.email.is_empty() {
            return Err(Error::InvalidInput("email is empty".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        if self.find(&record.email).await?.is_some() {
            return Err(Error::AlreadyExists(format!("user {}", record.email)));
        }

        let mut update = BTreeMap::new();
        update.insert(record.email.clone(), record.clone());
        self.save(
            &ResourceKey::PendingUsers,
            Payload::encode_map(&update)?,
            WriteMode::Append,
        )
        .await?;

        log::info!("Registered pending user {}", record.email);
        Ok(record)
    }

    /// Move a pending user into the approved document.
    pub async fn approve(&self, email: &str) -> Result<UserRecord> {
        let email = email.trim().to_lowercase();
        let _guard = self.write_lock.lock().await;

        let mut pending = self.load(&ResourceKey::PendingUsers).await?;
        let mut record = match pending.remove(&email) {
            Some(record) => record,
            None => {
                return match self.load(&ResourceKey::Users).await?.remove(&email) {
                    Some(mut approved) => approved.approve(self.cache.now()).map(|_| approved),
                    None => Err(Error::NotFound(format!("pending user {}", email))),
                };
            }
        };
        record.approve(self.cache.now())?;

        let mut update = BTreeMap::new();
        update.insert(email.clone(), record.clone());
        self.save(&ResourceKey::Users, Payload::encode_map(&update)?, WriteMode::Append)
            .await?;
        self.save(
            &ResourceKey::PendingUsers,
            Payload::encode_map(&pending)?,
            WriteMode::Overwrite,
        )
        .await?;

        log::info!("Approved user {}", email);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, TtlCache};
    use crate::store::MemoryStore;

    fn directory(store: MemoryStore) -> UserDirectory<MemoryStore> {
        UserDirectory::new(store, Arc::new(TtlCache::new(CacheConfig::default())))
    }

    #[test]
    fn test_approve_only_from_pending() {
        let mut user = UserRecord::pending(" Ada@Example.com ", "hash", Role::User, Utc::now());
        assert_eq!(user.email(), "ada@example.com");

        user.approve(Utc::now()).unwrap();
        assert_eq!(*user.status(), ApprovalStatus::Approved);
        assert!(user.approved_at().is_some());
        assert!(matches!(user.approve(Utc::now()), Err(Error::InvalidTransition(_))));
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
    }

    #[tokio::test]
    async fn test_register_then_approve() {
        let store = MemoryStore::new();
        let directory = directory(store.clone());

        directory.register("ada@example.com", "hash", Role::Admin).await.unwrap();
        assert_eq!(directory.pending().await.unwrap().len(), 1);
        assert!(directory.approved().await.unwrap().is_empty());

        let approved = directory.approve("ADA@example.com").await.unwrap();
        assert_eq!(*approved.status(), ApprovalStatus::Approved);
        assert_eq!(*approved.role(), Role::Admin);

        assert!(directory.pending().await.unwrap().is_empty());
        let users = directory.approved().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email(), "ada@example.com");

        let found = directory.find("ada@example.com").await.unwrap().unwrap();
        assert_eq!(*found.status(), ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let directory = directory(MemoryStore::new());
        directory.register("ada@example.com", "hash", Role::User).await.unwrap();

        assert!(matches!(
            directory.register("Ada@Example.com", "other", Role::User).await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            directory.register("  ", "hash", Role::User).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_errors() {
        let directory = directory(MemoryStore::new());
        assert!(matches!(
            directory.approve("nobody@example.com").await,
            Err(Error::NotFound(_))
        ));

        directory.register("ada@example.com", "hash", Role::User).await.unwrap();
        directory.approve("ada@example.com").await.unwrap();
        assert!(matches!(
            directory.approve("ada@example.com").await,
            Err(Error::InvalidTransition(_))
        ));
    }
}
