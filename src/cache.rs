//! In-process TTL cache for hot read-mostly queries.

use std::{
    future::Future,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::models::{AdminDashboardStats, Testimonial};

pub const TESTIMONIALS_TTL: Duration = Duration::from_secs(300);
pub const STATS_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// TtlCache
///
/// A cloneable handle onto a shared map. Expired entries read as absent and are
/// removed the first time they are looked at.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: Arc<DashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        // The read guard must be gone before remove_if takes the write lock.
        let live = self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());

        if live.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        live
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Returns the cached value, or runs `loader` and caches its success. Errors are
    /// passed through and nothing is cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = loader().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

/// The caches carried in `AppState`.
#[derive(Debug, Clone)]
pub struct AppCache {
    pub testimonials: TtlCache<&'static str, Vec<Testimonial>>,
    pub stats: TtlCache<&'static str, AdminDashboardStats>,
}

impl AppCache {
    pub const APPROVED_TESTIMONIALS: &'static str = "testimonials:approved";
    pub const ADMIN_STATS: &'static str = "stats:admin";

    pub fn new() -> Self {
        Self {
            testimonials: TtlCache::new(TESTIMONIALS_TTL),
            stats: TtlCache::new(STATS_TTL),
        }
    }

    pub fn invalidate_testimonials(&self) {
        self.testimonials.invalidate(&Self::APPROVED_TESTIMONIALS);
    }

    pub fn invalidate_stats(&self) {
        self.stats.invalidate(&Self::ADMIN_STATS);
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_and_are_removed() {
        let cache = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("k", 1, t0);

        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(9)), Some(1));
        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(10)), None);
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn invalidate_drops_the_entry() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", "v".to_string());
        cache.invalidate(&"k");
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test]
    async fn loader_runs_once_while_fresh() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        let calls = std::sync::atomic::AtomicU32::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("k", || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, ()>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));

        let first = cache
            .get_or_try_insert_with("k", || async { Err::<u32, _>("db down") })
            .await;
        assert_eq!(first, Err("db down"));

        let second = cache
            .get_or_try_insert_with("k", || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(second, Ok(7));
    }
}
