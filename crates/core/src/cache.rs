use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::CacheConfig;
use crate::context::WorkspaceId;
use crate::rules::RuleSet;

const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Bounded map whose entries expire a fixed time after insertion.
///
/// Callers pass `now` so expiry is deterministic under test.
#[derive(Clone, Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries: max_entries.max(1), entries: HashMap::new() }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl_secs = i64::try_from(config.ttl_secs).unwrap_or(MAX_TTL_SECS).min(MAX_TTL_SECS);
        Self::new(Duration::seconds(ttl_secs), config.max_entries)
    }

    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Stores `value`, evicting the oldest entry when the cache is full.
    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.purge_expired(now);
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }

        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(key, Entry { value, inserted_at: now, expires_at });
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-workspace rule sets shared across evaluations.
///
/// Rule edits take effect on the next evaluation after [`RuleSetCache::invalidate`]
/// or once the entry expires.
pub struct RuleSetCache {
    inner: Mutex<TtlCache<WorkspaceId, Arc<RuleSet>>>,
}

impl RuleSetCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self { inner: Mutex::new(TtlCache::from_config(config)) }
    }

    /// Returns the cached rule set, or runs `load` and caches what it returns.
    pub fn get_or_load<F, E>(&self, workspace_id: &WorkspaceId, load: F) -> Result<Arc<RuleSet>, E>
    where
        F: FnOnce(&WorkspaceId) -> Result<RuleSet, E>,
    {
        let now = Utc::now();
        if let Some(rules) = self.lock().get(workspace_id, now) {
            debug!(
                event_name = "rules.cache.hit",
                workspace_id = %workspace_id,
                "rule set served from cache"
            );
            return Ok(rules);
        }

        let loaded = Arc::new(load(workspace_id)?);
        debug!(
            event_name = "rules.cache.loaded",
            workspace_id = %workspace_id,
            rule_count = loaded.rules.len(),
            "rule set loaded into cache"
        );
        self.lock().insert(workspace_id.clone(), Arc::clone(&loaded), now);
        Ok(loaded)
    }

    pub fn invalidate(&self, workspace_id: &WorkspaceId) -> bool {
        self.lock().invalidate(workspace_id)
    }

    pub fn invalidate_all(&self) {
        self.lock().invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TtlCache<WorkspaceId, Arc<RuleSet>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::{Duration, TimeZone, Utc};

    use crate::config::CacheConfig;
    use crate::context::WorkspaceId;
    use crate::rules::{Rule, RuleSet};

    use super::{RuleSetCache, TtlCache};

    #[test]
    fn entries_expire_after_ttl() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).single().expect("valid instant");
        let mut cache = TtlCache::new(Duration::seconds(30), 4);
        cache.insert("ws-acme", 1, start);

        assert_eq!(cache.get(&"ws-acme", start + Duration::seconds(29)), Some(1));
        assert_eq!(cache.get(&"ws-acme", start + Duration::seconds(30)), None);
        assert_eq!(cache.purge_expired(start + Duration::seconds(31)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_oldest_entry() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).single().expect("valid instant");
        let mut cache = TtlCache::new(Duration::minutes(5), 2);
        cache.insert("a", 1, start);
        cache.insert("b", 2, start + Duration::seconds(1));
        cache.insert("c", 3, start + Duration::seconds(2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a", start + Duration::seconds(3)), None);
        assert_eq!(cache.get(&"c", start + Duration::seconds(3)), Some(3));
        assert!(cache.invalidate(&"b"));
        assert!(!cache.invalidate(&"b"));
    }

    #[test]
    fn rule_set_cache_loads_once_until_invalidated() {
        let cache = RuleSetCache::new(&CacheConfig::default());
        let workspace = WorkspaceId("ws-acme".to_owned());
        let loads = Cell::new(0);
        let load = |id: &WorkspaceId| -> Result<RuleSet, String> {
            loads.set(loads.get() + 1);
            Ok(RuleSet::new(id.clone(), vec![Rule::new("r1", "First")]))
        };

        let first = cache.get_or_load(&workspace, load).expect("first load");
        let second = cache.get_or_load(&workspace, load).expect("cached");
        assert_eq!(loads.get(), 1);
        assert_eq!(first, second);

        assert!(cache.invalidate(&workspace));
        cache.get_or_load(&workspace, load).expect("reload");
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn load_failures_are_not_cached() {
        let cache = RuleSetCache::new(&CacheConfig::default());
        let workspace = WorkspaceId("ws-acme".to_owned());

        let failed: Result<_, String> = cache.get_or_load(&workspace, |_| Err("store down".into()));
        assert_eq!(failed.err(), Some("store down".to_owned()));
        assert!(cache.is_empty());
    }
}
