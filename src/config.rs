//! Crawler configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a crawl run.
///
/// `max_sessions` bounds the number of live browser processes system-wide;
/// `max_concurrent` bounds the number of crawl steps in flight. Sessions are
/// by far the more expensive resource, so `max_sessions` is usually the
/// smaller of the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum live browser sessions (pool capacity).
    pub max_sessions: usize,
    /// Maximum concurrently executing crawl tasks.
    pub max_concurrent: usize,
    /// Timeout applied to navigation and page-settle waits.
    pub navigation_timeout: Duration,
    /// Pause after scroll/pagination actions to let the DOM render.
    pub render_settle: Duration,
    /// Age after which a cached URL record is treated as absent.
    pub cache_ttl_days: u32,
    /// Run browsers without a visible window.
    pub headless: bool,
    /// Location of the SQLite cache database.
    pub db_path: PathBuf,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            max_concurrent: 10,
            navigation_timeout: Duration::from_secs(60),
            render_settle: Duration::from_millis(100),
            cache_ttl_days: 7,
            headless: true,
            db_path: PathBuf::from("shopcrawl.sqlite"),
        }
    }
}

impl CrawlerConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// Recognized variables: `MAX_SESSIONS`, `MAX_WORKERS`,
    /// `REQUEST_DEFAULT_TIMEOUT` (seconds), `URL_CACHE_TTL_DAYS`,
    /// `CRAWL_DB_PATH`, `CRAWL_HEADFUL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions),
            max_concurrent: env_parse("MAX_WORKERS", defaults.max_concurrent),
            navigation_timeout: Duration::from_secs(env_parse(
                "REQUEST_DEFAULT_TIMEOUT",
                defaults.navigation_timeout.as_secs(),
            )),
            render_settle: defaults.render_settle,
            cache_ttl_days: env_parse("URL_CACHE_TTL_DAYS", defaults.cache_ttl_days),
            headless: !std::env::var("CRAWL_HEADFUL").is_ok_and(|v| v == "1" || v == "true"),
            db_path: std::env::var("CRAWL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
        }
    }

    /// Cache TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.cache_ttl_days) * 24 * 60 * 60)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
