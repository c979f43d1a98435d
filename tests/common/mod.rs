//! Shared test doubles: an instrumented page fetcher and an in-memory store.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use shopcrawl::{CacheRecord, PageFetcher, UrlStore};

/// Serves canned snapshot lists and records every fetch performed.
///
/// URLs with no canned entry yield an empty snapshot list, the same shape a
/// timed-out or unreachable page produces in production.
pub struct RecordingFetcher {
    pages: HashMap<String, Vec<String>>,
    fetched: Mutex<Vec<String>>,
    delay: Duration,
}

impl RecordingFetcher {
    pub fn new(pages: HashMap<String, Vec<String>>) -> Self {
        Self {
            pages,
            fetched: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Add an artificial per-fetch delay, to widen concurrency windows.
    #[allow(dead_code)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn total_fetches(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

impl PageFetcher for RecordingFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Vec<String>> + Send {
        self.fetched.lock().unwrap().push(url.to_string());
        let snapshots = self.pages.get(url).cloned().unwrap_or_default();
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            snapshots
        }
    }
}

/// In-memory [`UrlStore`] with the same read-time TTL semantics as the
/// SQLite store.
pub struct MemoryStore {
    cache: Mutex<HashMap<String, CacheRecord>>,
    products: Mutex<HashMap<String, HashSet<String>>>,
    cache_writes: Mutex<usize>,
    ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            products: Mutex::new(HashMap::new()),
            cache_writes: Mutex::new(0),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl MemoryStore {
    #[allow(dead_code)]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// Pre-populate a cache record with an explicit creation timestamp.
    #[allow(dead_code)]
    pub fn seed_cache(&self, url: &str, is_product: bool, outgoing: &[&str], created_at: i64) {
        self.cache.lock().unwrap().insert(
            url.to_string(),
            CacheRecord {
                url: url.to_string(),
                is_product,
                outgoing_urls: outgoing.iter().map(|s| s.to_string()).collect(),
                created_at,
            },
        );
    }

    /// Pre-populate the persisted product set for a domain.
    #[allow(dead_code)]
    pub fn seed_product(&self, domain: &str, url: &str) {
        self.products
            .lock()
            .unwrap()
            .entry(domain.to_string())
            .or_default()
            .insert(url.to_string());
    }

    #[allow(dead_code)]
    pub fn cache_write_count(&self) -> usize {
        *self.cache_writes.lock().unwrap()
    }

    #[allow(dead_code)]
    pub fn cached(&self, url: &str) -> Option<CacheRecord> {
        self.cache.lock().unwrap().get(url).cloned()
    }
}

impl UrlStore for MemoryStore {
    async fn get_cached(&self, url: &str) -> Option<CacheRecord> {
        let cutoff = chrono::Utc::now().timestamp() - self.ttl.as_secs() as i64;
        let record = self.cache.lock().unwrap().get(url).cloned();
        record.filter(|r| r.created_at >= cutoff)
    }

    async fn cache_url(&self, url: &str, is_product: bool, outgoing_urls: &[String]) {
        *self.cache_writes.lock().unwrap() += 1;
        self.cache.lock().unwrap().insert(
            url.to_string(),
            CacheRecord {
                url: url.to_string(),
                is_product,
                outgoing_urls: outgoing_urls.to_vec(),
                created_at: chrono::Utc::now().timestamp(),
            },
        );
    }

    async fn get_domain_products(&self, domain: &str) -> HashSet<String> {
        self.products
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    async fn add_domain_product(&self, domain: &str, url: &str) {
        self.products
            .lock()
            .unwrap()
            .entry(domain.to_string())
            .or_default()
            .insert(url.to_string());
    }
}
