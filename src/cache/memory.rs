//! Process-local cache with per-entry expiry.

use crate::cache::CacheClient;
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: Value,
    /// `None` when the TTL is too large to represent; such entries never expire.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Earliest expiry among stored entries; expired entries are swept once it passes.
    next_expiry: Option<Instant>,
}

impl Entries {
    fn sweep(&mut self, now: Instant) {
        if self.next_expiry.map_or(true, |t| t > now) {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, e| e.is_live(now));
        self.next_expiry = self.map.values().filter_map(|e| e.expires_at).min();
        tracing::debug!(removed = before - self.map.len(), "swept expired cache entries");
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<Entries>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of live entries, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .map
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub async fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .map
            .get(key)
            .is_some_and(|e| e.is_live(now))
    }

    /// Stored entries, including expired ones not yet swept.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.map.len()
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                None => return Ok(None),
                Some(e) if e.is_live(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> Result<(), AppError> {
        let now = Instant::now();
        let expires_at = now.checked_add(Duration::from_secs(ttl_seconds));
        let mut entries = self.entries.write().await;
        entries.sweep(now);
        if let Some(t) = expires_at {
            entries.next_expiry = Some(entries.next_expiry.map_or(t, |n| n.min(t)));
        }
        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.entries.write().await.map.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.map.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache.set("widget_1", &json!({"id": 1}), 60).await.unwrap();
        assert_eq!(cache.get("widget_1").await.unwrap(), Some(json!({"id": 1})));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("widget_1").await.unwrap(), None);
        assert!(cache.keys().await.is_empty());
    }

    #[tokio::test]
    async fn delete_many_removes_only_named_keys() {
        let cache = InMemoryCache::new();
        for k in ["widget_1", "widget_2", "widget_3"] {
            cache.set(k, &json!(k), 60).await.unwrap();
        }
        cache
            .delete_many(&["widget_1".to_string(), "widget_3".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(cache.keys().await, vec!["widget_2"]);
        cache.delete("widget_2").await.unwrap();
        assert!(!cache.contains("widget_2").await);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept_on_set() {
        let cache = InMemoryCache::new();
        for i in 0..1000 {
            cache.set(&format!("widget_all_id_{i}"), &json!([i]), 1).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set("widget_1", &json!({"id": 1}), 60).await.unwrap();
        assert_eq!(cache.entry_count().await, 1);
        assert_eq!(cache.keys().await, vec!["widget_1"]);
    }

    #[tokio::test]
    async fn huge_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache.set("widget_1", &json!(1), u64::MAX).await.unwrap();
        assert_eq!(cache.get("widget_1").await.unwrap(), Some(json!(1)));
    }
}
