//! Document store.
//!
//! Records are JSON documents under string keys; ordered id lists (the global
//! feed, per-author post lists) use native list operations so concurrent
//! writers do not overwrite each other. Two backends implement [`Backend`]:
//! Redis for deployments and an in-process map for tests and local runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    /// Returns `false` when the key already holds a value.
    async fn set_nx(&self, key: &str, value: String) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list_push_front(&self, key: &str, member: &str) -> Result<()>;
    async fn list_push_back(&self, key: &str, member: &str) -> Result<()>;
    async fn list_remove(&self, key: &str, member: &str) -> Result<()>;
    async fn list_range(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>>;
    async fn list_len(&self, key: &str) -> Result<usize>;
}

/// Handle to the configured backend. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
}

impl Store {
    /// Opens the backend named by `url` (`redis://`, `rediss://` or `memory://`)
    /// and checks that it answers.
    pub async fn connect(url: &str) -> Result<Self> {
        let store = if url.starts_with("memory://") {
            Self::memory()
        } else if url.starts_with("redis://") || url.starts_with("rediss://") {
            Self::with_backend(Arc::new(RedisBackend::connect(url).await?))
        } else {
            bail!("unsupported DB_URL scheme: {}", url);
        };

        store.backend.ping().await.context("data store did not answer")?;
        info!("Database Connected!");
        Ok(store)
    }

    pub fn memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::default()))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn close(self) {
        drop(self.backend);
        info!("Database connection closed");
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt document at {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.backend.set(key, serde_json::to_string(value)?, None).await
    }

    pub async fn set_json_ex<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        self.backend.set(key, serde_json::to_string(value)?, Some(ttl)).await
    }

    pub async fn set_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> Result<bool> {
        self.backend.set_nx(key, serde_json::to_string(value)?).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn list_push_front(&self, key: &str, member: &str) -> Result<()> {
        self.backend.list_push_front(key, member).await
    }

    pub async fn list_push_back(&self, key: &str, member: &str) -> Result<()> {
        self.backend.list_push_back(key, member).await
    }

    pub async fn list_remove(&self, key: &str, member: &str) -> Result<()> {
        self.backend.list_remove(key, member).await
    }

    pub async fn list_range(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.backend.list_range(key, offset, count).await
    }

    /// Every member of the list, in list order.
    pub async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        self.backend.list_range(key, 0, usize::MAX).await
    }

    pub async fn list_len(&self, key: &str) -> Result<usize> {
        self.backend.list_len(key).await
    }
}

// === Redis ===

pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("failed to parse DB_URL connection string")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: String) -> Result<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_push_front(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("LPUSH").arg(key).arg(member).query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_push_back(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("RPUSH").arg(key).arg(member).query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(key)
            .arg(0)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>> {
        let (start, stop) = match redis_range(offset, count) {
            Some(range) => range,
            None => return Ok(Vec::new()),
        };
        let mut conn = self.manager.clone();
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let len: usize = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }
}

/// LRANGE bounds for `count` members from `offset`. Redis indexes are `i64`;
/// `None` when the window starts past the largest index.
fn redis_range(offset: usize, count: usize) -> Option<(i64, i64)> {
    let start = i64::try_from(offset).ok()?;
    let stop = offset.saturating_add(count.saturating_sub(1));
    Some((start, i64::try_from(stop).unwrap_or(i64::MAX)))
}

// === In-memory ===

enum Entry {
    Value {
        value: String,
        expires_at: Option<Instant>,
    },
    List(VecDeque<String>),
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        match self {
            Entry::Value { expires_at: Some(at), .. } => *at > now,
            _ => true,
        }
    }
}

/// Expiring writes between two sweeps of dead entries.
const SWEEP_EVERY: usize = 256;

#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    expiring_writes: AtomicUsize,
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(Entry::List(_)) => bail!("WRONGTYPE {} holds a list", key),
            Some(entry) if entry.is_live(Instant::now()) => match entry {
                Entry::Value { value, .. } => Ok(Some(value.clone())),
                Entry::List(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut entries = self.entries.write().await;

        if ttl.is_some() && self.expiring_writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == 0 {
            entries.retain(|_, entry| entry.is_live(now));
        }
        entries.insert(key.to_string(), Entry::Value { value, expires_at });
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: String) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(Instant::now())) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::Value { value, expires_at: None });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_push_front(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        match entry {
            Entry::List(list) => {
                list.push_front(member.to_string());
                Ok(())
            }
            Entry::Value { .. } => bail!("WRONGTYPE {} holds a value", key),
        }
    }

    async fn list_push_back(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        match entry {
            Entry::List(list) => {
                list.push_back(member.to_string());
                Ok(())
            }
            Entry::Value { .. } => bail!("WRONGTYPE {} holds a value", key),
        }
    }

    async fn list_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now_empty = match entries.get_mut(key) {
            Some(Entry::List(list)) => {
                list.retain(|m| m != member);
                list.is_empty()
            }
            Some(Entry::Value { .. }) => bail!("WRONGTYPE {} holds a value", key),
            None => false,
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, offset: usize, count: usize) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(Entry::List(list)) => Ok(list.iter().skip(offset).take(count).cloned().collect()),
            Some(Entry::Value { .. }) => bail!("WRONGTYPE {} holds a value", key),
            None => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(Entry::List(list)) => Ok(list.len()),
            Some(Entry::Value { .. }) => bail!("WRONGTYPE {} holds a value", key),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_documents_round_trip_through_the_store() {
        let store = Store::memory();
        store.set_json("post:1", &serde_json::json!({"title": "Rex"})).await.unwrap();

        let doc: Option<serde_json::Value> = store.get_json("post:1").await.unwrap();
        assert_eq!(doc.unwrap()["title"], "Rex");

        store.delete("post:1").await.unwrap();
        let gone: Option<serde_json::Value> = store.get_json("post:1").await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn set_if_absent_keeps_the_first_writer() {
        let store = Store::memory();
        assert!(store.set_json_if_absent("username:rex", &"a").await.unwrap());
        assert!(!store.set_json_if_absent("username:rex", &"b").await.unwrap());

        let owner: Option<String> = store.get_json("username:rex").await.unwrap();
        assert_eq!(owner.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn expired_values_disappear() {
        let store = Store::memory();
        store
            .set_json_ex("session:1", &1, Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let value: Option<i32> = store.get_json("session:1").await.unwrap();
        assert!(value.is_none());
        assert!(store.set_json_if_absent("session:1", &2).await.unwrap());
    }

    #[tokio::test]
    async fn lists_are_newest_first_and_pageable() {
        let store = Store::memory();
        for id in ["a", "b", "c", "d"] {
            store.list_push_front("feed", id).await.unwrap();
        }

        assert_eq!(store.list_len("feed").await.unwrap(), 4);
        assert_eq!(store.list_range("feed", 0, 2).await.unwrap(), vec!["d", "c"]);
        assert_eq!(store.list_range("feed", 2, 2).await.unwrap(), vec!["b", "a"]);
        assert!(store.list_range("feed", 4, 2).await.unwrap().is_empty());
        assert!(store.list_range("feed", 0, 0).await.unwrap().is_empty());

        store.list_remove("feed", "c").await.unwrap();
        assert_eq!(store.list_range("feed", 0, 10).await.unwrap(), vec!["d", "b", "a"]);
    }

    #[tokio::test]
    async fn push_back_appends_in_arrival_order() {
        let store = Store::memory();
        for id in ["c1", "c2", "c3"] {
            store.list_push_back("post_comments:1", id).await.unwrap();
        }
        assert_eq!(store.list_all("post_comments:1").await.unwrap(), vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn expired_values_are_swept_on_later_writes() {
        let backend = MemoryBackend::default();
        for i in 0..10 {
            backend
                .set(&format!("session:{}", i), "{}".to_string(), Some(Duration::from_millis(5)))
                .await
                .unwrap();
        }
        backend.set("post:1", "{}".to_string(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // advance the counter to the next sweep point
        backend.expiring_writes.store(SWEEP_EVERY, Ordering::Relaxed);
        backend
            .set("session:fresh", "{}".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let entries = backend.entries.read().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("post:1"));
        assert!(entries.contains_key("session:fresh"));
    }

    #[test]
    fn redis_ranges_never_overflow() {
        assert_eq!(redis_range(0, 6), Some((0, 5)));
        assert_eq!(redis_range(10, 1), Some((10, 10)));
        assert_eq!(redis_range(0, usize::MAX), Some((0, i64::MAX)));
        assert_eq!(redis_range(usize::MAX - 15, 50), None);
        assert_eq!(redis_range(i64::MAX as usize - 1, 50), Some((i64::MAX - 1, i64::MAX)));
    }

    #[tokio::test]
    async fn missing_lists_are_empty() {
        let store = Store::memory();
        assert_eq!(store.list_len("user_posts:nobody").await.unwrap(), 0);
        store.list_remove("user_posts:nobody", "x").await.unwrap();
        assert!(store.list_range("user_posts:nobody", 0, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_schemes_are_refused() {
        assert!(Store::connect("mongodb://localhost:27017/dogPics").await.is_err());
        assert!(Store::connect("memory://").await.is_ok());
    }
}
