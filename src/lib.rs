//! Bounded-concurrency e-commerce crawler.
//!
//! Discovers reachable pages on a set of domains with a pooled headless
//! browser, classifies them as product pages, and memoizes results in a
//! TTL'd SQLite cache so repeated runs skip work that is still fresh.

pub mod browser_setup;
pub mod config;
pub mod crawl_engine;
pub mod page_parser;
pub mod scheduler;
pub mod session_pool;
pub mod store;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use config::CrawlerConfig;
pub use crawl_engine::{CrawlError, CrawlTask, EcommerceCrawler, PageFetcher};
pub use scheduler::TaskScheduler;
pub use session_pool::{SessionPool, SessionPoolConfig};
pub use store::{CacheRecord, SqliteStore, UrlStore};

/// Crawl `domains` with the given configuration and return the confirmed
/// product URLs per domain.
///
/// Wires the production pieces together: SQLite-backed cache, browser
/// session pool, and the orchestrator. The pool and the store are shut down
/// before returning.
pub async fn crawl(
    domains: Vec<String>,
    config: CrawlerConfig,
) -> Result<HashMap<String, HashSet<String>>, CrawlError> {
    let store = SqliteStore::open(&config.db_path, config.cache_ttl())
        .await
        .map_err(|e| CrawlError::Storage(format!("{e:#}")))?;

    let pool = SessionPool::new(SessionPoolConfig {
        capacity: config.max_sessions,
        headless: config.headless,
        navigation_timeout: config.navigation_timeout,
        render_settle: config.render_settle,
    });

    let crawler = EcommerceCrawler::new(
        domains,
        Arc::clone(&pool),
        Arc::new(store.clone()),
        config.max_concurrent,
    );

    let results = crawler.crawl().await;

    pool.shutdown().await;
    store.close().await;

    Ok(results)
}
