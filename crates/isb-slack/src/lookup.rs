//! Bidirectional lookup cache with refresh-on-miss
//!
//! Forward and reverse maps always agree: every entry goes in through
//! [`LookupCache::put`], which also drops pairs the new one supersedes.
//! A lookup that misses runs exactly one refresh (targeted for forward misses
//! if the cache has one, full otherwise) and then answers from the maps.
//! Nothing is ever evicted.

use std::collections::HashMap;
use std::hash::Hash;

use futures::future::BoxFuture;

use crate::error::{Result, SlackError};

/// Full refresh: fetch every known pair.
pub type FullRefresh<C, K, V> = for<'a> fn(&'a C) -> BoxFuture<'a, Result<Vec<(K, V)>>>;

/// Targeted refresh for a single key.
pub type KeyRefresh<C, K, V> = for<'a> fn(&'a C, &'a K) -> BoxFuture<'a, Result<Vec<(K, V)>>>;

pub struct LookupCache<C, K, V> {
    forward: HashMap<K, V>,
    reverse: HashMap<V, K>,
    full: FullRefresh<C, K, V>,
    by_key: Option<KeyRefresh<C, K, V>>,
    label: &'static str,
}

impl<C, K, V> LookupCache<C, K, V>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    V: Eq + Hash + Clone + std::fmt::Display,
{
    /// `label` names the cache in `NotFound` errors.
    pub fn new(label: &'static str, full: FullRefresh<C, K, V>) -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
            full,
            by_key: None,
            label,
        }
    }

    /// Use a targeted refresh for forward misses.
    pub fn with_key_refresh(mut self, refresh: KeyRefresh<C, K, V>) -> Self {
        self.by_key = Some(refresh);
        self
    }

    /// Record a pair in both directions.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(old_value) = self.forward.remove(&key) {
            self.reverse.remove(&old_value);
        }
        if let Some(old_key) = self.reverse.remove(&value) {
            self.forward.remove(&old_key);
        }
        self.forward.insert(key.clone(), value.clone());
        self.reverse.insert(value, key);
    }

    /// Cached key for `value`, without refreshing
    pub fn get_reverse(&self, value: &V) -> Option<&K> {
        self.reverse.get(value)
    }

    pub async fn find_forward(&mut self, ctx: &C, key: &K) -> Result<Option<V>> {
        if let Some(value) = self.forward.get(key) {
            return Ok(Some(value.clone()));
        }
        let entries = match self.by_key {
            Some(refresh) => refresh(ctx, key).await?,
            None => (self.full)(ctx).await?,
        };
        self.absorb(entries);
        Ok(self.forward.get(key).cloned())
    }

    pub async fn find_reverse(&mut self, ctx: &C, value: &V) -> Result<Option<K>> {
        if let Some(key) = self.reverse.get(value) {
            return Ok(Some(key.clone()));
        }
        let entries = (self.full)(ctx).await?;
        self.absorb(entries);
        Ok(self.reverse.get(value).cloned())
    }

    pub async fn require_forward(&mut self, ctx: &C, key: &K) -> Result<V> {
        self.find_forward(ctx, key)
            .await?
            .ok_or_else(|| SlackError::NotFound(format!("{} {}", self.label, key)))
    }

    pub async fn require_reverse(&mut self, ctx: &C, value: &V) -> Result<K> {
        self.find_reverse(ctx, value)
            .await?
            .ok_or_else(|| SlackError::NotFound(format!("{} {}", self.label, value)))
    }

    fn absorb(&mut self, entries: Vec<(K, V)>) {
        for (key, value) in entries {
            self.put(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Directory {
        entries: Vec<(String, String)>,
        full_calls: AtomicUsize,
        targeted_calls: AtomicUsize,
    }

    fn full(dir: &Directory) -> BoxFuture<'_, Result<Vec<(String, String)>>> {
        Box::pin(async move {
            dir.full_calls.fetch_add(1, Ordering::SeqCst);
            Ok(dir.entries.clone())
        })
    }

    fn targeted<'a>(dir: &'a Directory, key: &'a String) -> BoxFuture<'a, Result<Vec<(String, String)>>> {
        Box::pin(async move {
            dir.targeted_calls.fetch_add(1, Ordering::SeqCst);
            Ok(dir.entries.iter().filter(|(k, _)| k == key).cloned().collect())
        })
    }

    fn directory(entries: &[(&str, &str)]) -> Directory {
        Directory {
            entries: entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_miss_refreshes_once_then_hits() {
        let dir = directory(&[("alice", "U1"), ("bob", "U2")]);
        let mut cache: LookupCache<Directory, String, String> = LookupCache::new("user", full);

        let id = cache.find_forward(&dir, &"alice".to_string()).await.unwrap();
        assert_eq!(id.as_deref(), Some("U1"));
        assert_eq!(dir.full_calls.load(Ordering::SeqCst), 1);

        // populated by the same refresh
        let name = cache.find_reverse(&dir, &"U2".to_string()).await.unwrap();
        assert_eq!(name.as_deref(), Some("bob"));
        assert_eq!(dir.full_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absent_key_is_one_refresh_per_lookup() {
        let dir = directory(&[("alice", "U1")]);
        let mut cache: LookupCache<Directory, String, String> = LookupCache::new("user", full);

        assert_eq!(cache.find_forward(&dir, &"zed".to_string()).await.unwrap(), None);
        assert_eq!(dir.full_calls.load(Ordering::SeqCst), 1);

        let err = cache.require_forward(&dir, &"zed".to_string()).await.unwrap_err();
        assert!(matches!(err, SlackError::NotFound(ref what) if what == "user zed"));
        assert_eq!(dir.full_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_targeted_refresh_preferred_for_forward_misses() {
        let dir = directory(&[("alice", "D1"), ("bob", "D2")]);
        let mut cache: LookupCache<Directory, String, String> = LookupCache::new("im", full).with_key_refresh(targeted);

        assert_eq!(cache.require_forward(&dir, &"bob".to_string()).await.unwrap(), "D2");
        assert_eq!(dir.targeted_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dir.full_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.forward.len(), 1);

        // reverse misses always run the full refresh
        assert_eq!(cache.require_reverse(&dir, &"D1".to_string()).await.unwrap(), "alice");
        assert_eq!(dir.full_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_put_keeps_directions_in_step() {
        let mut cache: LookupCache<Directory, String, String> = LookupCache::new("channel", full);
        cache.put("general".to_string(), "C1".to_string());
        cache.put("general".to_string(), "C2".to_string());

        assert_eq!(cache.forward.get("general").map(String::as_str), Some("C2"));
        assert_eq!(cache.get_reverse(&"C1".to_string()), None);

        cache.put("renamed".to_string(), "C2".to_string());
        assert_eq!(cache.forward.get("general"), None);
        assert_eq!(cache.get_reverse(&"C2".to_string()).map(String::as_str), Some("renamed"));
        assert_eq!(cache.forward.len(), 1);
    }
}
