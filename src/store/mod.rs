//! Persistence: URL-result cache with TTL and per-domain product store.
//!
//! Backed by SQLite with WAL mode. Both collections are plain key-value
//! shapes: `url_cache` memoizes the classification outcome and outgoing
//! links per URL, `domain_products` records confirmed product URLs per
//! domain. Every operation degrades on error — reads fall back to "absent"
//! and writes are logged and swallowed — so a flaky database never aborts a
//! crawl. The cache may simply be cold on the next run.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use tracing::warn;

/// SQL schema for the crawl cache database
const SCHEMA_SQL: &str = r#"
-- URL cache: memoized classification outcome and outgoing links per URL
CREATE TABLE IF NOT EXISTS url_cache (
    url TEXT PRIMARY KEY,
    is_product INTEGER NOT NULL,
    outgoing_urls TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Index for TTL sweeps
CREATE INDEX IF NOT EXISTS idx_url_cache_created ON url_cache(created_at);

-- Confirmed product URLs per domain
CREATE TABLE IF NOT EXISTS domain_products (
    domain TEXT NOT NULL,
    url TEXT NOT NULL,
    UNIQUE(domain, url)
);

CREATE INDEX IF NOT EXISTS idx_domain_products_domain ON domain_products(domain);
"#;

/// One memoized crawl outcome, keyed by normalized URL.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub url: String,
    pub is_product: bool,
    pub outgoing_urls: Vec<String>,
    /// Unix timestamp of when the record was written.
    pub created_at: i64,
}

/// Storage seam used by the orchestrator.
///
/// The production implementation is [`SqliteStore`]; tests substitute an
/// in-memory fake. Implementations contain their own failures — none of
/// these operations can fail from the caller's point of view.
pub trait UrlStore: Send + Sync {
    /// Look up a non-expired cache record for `url`.
    fn get_cached(&self, url: &str) -> impl Future<Output = Option<CacheRecord>> + Send;

    /// Record the crawl outcome for `url`.
    fn cache_url(
        &self,
        url: &str,
        is_product: bool,
        outgoing_urls: &[String],
    ) -> impl Future<Output = ()> + Send;

    /// All product URLs persisted for `domain`.
    fn get_domain_products(&self, domain: &str) -> impl Future<Output = HashSet<String>> + Send;

    /// Persist one confirmed product URL for `domain`.
    fn add_domain_product(&self, domain: &str, url: &str) -> impl Future<Output = ()> + Send;
}

/// SQLite-backed store with a read-time TTL on cache records.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        Self::init(pool, ttl).await
    }

    /// Open a private in-memory database. Test-oriented.
    pub async fn open_in_memory(ttl: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        // One connection only: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::init(pool, ttl).await
    }

    async fn init(pool: SqlitePool, ttl: Duration) -> Result<Self> {
        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize database schema")?;
        Ok(Self { pool, ttl })
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn expiry_cutoff(&self) -> i64 {
        chrono::Utc::now().timestamp() - self.ttl.as_secs() as i64
    }

    async fn try_get_cached(&self, url: &str) -> Result<Option<CacheRecord>> {
        let row: Option<(bool, String, i64)> = sqlx::query_as(
            "SELECT is_product, outgoing_urls, created_at FROM url_cache WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query url cache")?;

        let Some((is_product, outgoing_json, created_at)) = row else {
            return Ok(None);
        };

        if created_at < self.expiry_cutoff() {
            // Expired records are equivalent to never cached; reap lazily.
            sqlx::query("DELETE FROM url_cache WHERE url = ?")
                .bind(url)
                .execute(&self.pool)
                .await
                .context("Failed to delete expired cache record")?;
            return Ok(None);
        }

        let outgoing_urls: Vec<String> = serde_json::from_str(&outgoing_json)
            .context("Failed to decode outgoing URL list")?;

        Ok(Some(CacheRecord {
            url: url.to_string(),
            is_product,
            outgoing_urls,
            created_at,
        }))
    }

    async fn try_cache_url(
        &self,
        url: &str,
        is_product: bool,
        outgoing_urls: &[String],
    ) -> Result<()> {
        let outgoing_json =
            serde_json::to_string(outgoing_urls).context("Failed to encode outgoing URL list")?;

        sqlx::query(
            r#"
            INSERT INTO url_cache (url, is_product, outgoing_urls, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                is_product = excluded.is_product,
                outgoing_urls = excluded.outgoing_urls,
                created_at = excluded.created_at
            "#,
        )
        .bind(url)
        .bind(is_product)
        .bind(&outgoing_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to upsert cache record")?;

        Ok(())
    }

    async fn try_get_domain_products(&self, domain: &str) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT url FROM domain_products WHERE domain = ?")
                .bind(domain)
                .fetch_all(&self.pool)
                .await
                .context("Failed to query domain products")?;

        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    async fn try_add_domain_product(&self, domain: &str, url: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO domain_products (domain, url) VALUES (?, ?)")
            .bind(domain)
            .bind(url)
            .execute(&self.pool)
            .await
            .context("Failed to insert domain product")?;
        Ok(())
    }
}

impl UrlStore for SqliteStore {
    async fn get_cached(&self, url: &str) -> Option<CacheRecord> {
        match self.try_get_cached(url).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Cache read failed for {url}, treating as absent: {e:#}");
                None
            }
        }
    }

    async fn cache_url(&self, url: &str, is_product: bool, outgoing_urls: &[String]) {
        if let Err(e) = self.try_cache_url(url, is_product, outgoing_urls).await {
            warn!("Cache write failed for {url}: {e:#}");
        }
    }

    async fn get_domain_products(&self, domain: &str) -> HashSet<String> {
        match self.try_get_domain_products(domain).await {
            Ok(products) => products,
            Err(e) => {
                warn!("Product read failed for {domain}, treating as empty: {e:#}");
                HashSet::new()
            }
        }
    }

    async fn add_domain_product(&self, domain: &str, url: &str) {
        if let Err(e) = self.try_add_domain_product(domain, url).await {
            warn!("Product write failed for {domain}: {e:#}");
        }
    }
}
