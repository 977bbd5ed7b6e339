//! In-memory cache for aggregate queries that back the admin overview and
//! the regulation filter.
//!
//! Both change rarely (regulations are imported from the CLI, job counts
//! only matter at a glance), so a short TTL keeps page loads cheap without
//! any invalidation protocol between processes.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::template_structs::AdminStats;

/// Default TTL for cached stats.
const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// A cached value with expiration time.
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn get(&self) -> Option<T> {
        if Instant::now() >= self.expires_at {
            None
        } else {
            Some(self.value.clone())
        }
    }
}

pub struct StatsCache {
    admin_stats: RwLock<Option<CacheEntry<AdminStats>>>,
    categories: RwLock<Option<CacheEntry<Vec<String>>>>,
    ttl: Duration,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            admin_stats: RwLock::new(None),
            categories: RwLock::new(None),
            ttl,
        }
    }

    /// Get cached admin counters, or None if expired/missing.
    pub fn get_admin_stats(&self) -> Option<AdminStats> {
        self.admin_stats
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().and_then(|e| e.get()))
    }

    pub fn set_admin_stats(&self, stats: AdminStats) {
        if let Ok(mut guard) = self.admin_stats.write() {
            *guard = Some(CacheEntry::new(stats, self.ttl));
        }
    }

    /// Get cached regulation categories, or None if expired/missing.
    pub fn get_categories(&self) -> Option<Vec<String>> {
        self.categories
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().and_then(|e| e.get()))
    }

    pub fn set_categories(&self, categories: Vec<String>) {
        if let Ok(mut guard) = self.categories.write() {
            *guard = Some(CacheEntry::new(categories, self.ttl));
        }
    }

    /// Drop everything (call after an admin action changes job state).
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.admin_stats.write() {
            *guard = None;
        }
        if let Ok(mut guard) = self.categories.write() {
            *guard = None;
        }
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_stats_roundtrip_and_invalidate() {
        let cache = StatsCache::new();
        assert!(cache.get_admin_stats().is_none());

        cache.set_admin_stats(AdminStats {
            users: 3,
            jobs_failed: 1,
            ..Default::default()
        });
        let stats = cache.get_admin_stats().unwrap();
        assert_eq!(stats.users, 3);
        assert_eq!(stats.jobs_failed, 1);

        cache.invalidate();
        assert!(cache.get_admin_stats().is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = StatsCache::with_ttl(Duration::ZERO);
        cache.set_categories(vec!["Fall Protection".into()]);
        assert!(cache.get_categories().is_none());
    }
}
