//! Fingerprint-keyed memo of orchestrator answers.
//!
//! - Fixed TTL (10 minutes) for every operation.
//! - Lazy eviction: an expired entry is dropped when it is read.
//! - Last write wins; values for one fingerprint are interchangeable.
//! - `snapshot` / `restore` let a short-lived process (the CLI) keep the
//!   cache on disk between runs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::fingerprint::Fingerprint;
use crate::results::PriorityResult;

pub const CACHE_TTL_SECS: i64 = 10 * 60;

pub fn cache_ttl() -> Duration {
    Duration::seconds(CACHE_TTL_SECS)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Priority(PriorityResult),
    Deadline(DateTime<Utc>),
    Text(String),
    Tags(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub value: CachedValue,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic mid-insert cannot leave a half-written entry, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CachedValue> {
        self.get_at(fingerprint, Utc::now())
    }

    pub fn get_at(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<CachedValue> {
        {
            let entries = self.read();
            match entries.get(fingerprint) {
                None => return None,
                Some(e) if e.is_live(now) => return Some(e.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: evict unless a fresh write raced in.
        let mut entries = self.write();
        if entries.get(fingerprint).is_some_and(|e| !e.is_live(now)) {
            entries.remove(fingerprint);
        }
        None
    }

    pub fn set(&self, fingerprint: Fingerprint, value: CachedValue, ttl: Duration) {
        self.set_at(fingerprint, value, ttl, Utc::now());
    }

    pub fn set_at(
        &self,
        fingerprint: Fingerprint,
        value: CachedValue,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            value,
            expires_at: now + ttl,
        };
        self.write().insert(fingerprint, entry);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Live entries, ordered by fingerprint for stable output.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        let mut out: Vec<CacheEntry> = self
            .read()
            .values()
            .filter(|e| e.is_live(now))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        out
    }

    /// Load entries written by `snapshot_at`, skipping ones already expired.
    pub fn restore_at(&self, entries: Vec<CacheEntry>, now: DateTime<Utc>) -> usize {
        let mut map = self.write();
        let mut loaded = 0;
        for e in entries.into_iter().filter(|e| e.is_live(now)) {
            map.insert(e.fingerprint.clone(), e);
            loaded += 1;
        }
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{fingerprint, Operation};
    use chrono::TimeZone;

    fn fp(title: &str) -> Fingerprint {
        fingerprint(Operation::Enhance, title, &Vec::<String>::new())
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = ResultCache::new();
        let t0 = Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap();
        cache.set_at(fp("a"), CachedValue::Text("hello".into()), cache_ttl(), t0);

        assert_eq!(
            cache.get_at(&fp("a"), t0 + Duration::minutes(9)),
            Some(CachedValue::Text("hello".into()))
        );
        assert_eq!(cache.get_at(&fp("a"), t0 + Duration::minutes(10)), None);
        // Lazily evicted.
        assert!(cache.is_empty());
    }

    #[test]
    fn last_write_wins() {
        let cache = ResultCache::new();
        cache.set(fp("a"), CachedValue::Tags(vec!["Work".into()]), cache_ttl());
        cache.set(fp("a"), CachedValue::Tags(vec!["Home".into()]), cache_ttl());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fp("a")), Some(CachedValue::Tags(vec!["Home".into()])));
    }

    #[test]
    fn snapshot_restore_skips_expired() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap();
        let cache = ResultCache::new();
        cache.set_at(fp("old"), CachedValue::Text("old".into()), cache_ttl(), t0);
        cache.set_at(
            fp("new"),
            CachedValue::Text("new".into()),
            cache_ttl(),
            t0 + Duration::minutes(8),
        );

        let later = t0 + Duration::minutes(12);
        let snap = cache.snapshot_at(later);
        assert_eq!(snap.len(), 1);

        let json = serde_json::to_string(&snap).unwrap();
        let back: Vec<CacheEntry> = serde_json::from_str(&json).unwrap();

        let fresh = ResultCache::new();
        assert_eq!(fresh.restore_at(back, later), 1);
        assert_eq!(fresh.get_at(&fp("new"), later), Some(CachedValue::Text("new".into())));

        assert_eq!(cache.purge_expired_at(later), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_writers_do_not_corrupt() {
        let cache = std::sync::Arc::new(ResultCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let key = fp(&format!("k{}", j % 10));
                        cache.set(key.clone(), CachedValue::Text(format!("{i}-{j}")), cache_ttl());
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
