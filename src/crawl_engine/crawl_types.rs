//! Core types for crawl operations.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Error type for the public crawl entry points. Fetch and cache failures
/// are contained at their own boundaries, so only setup can fail.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// One unit of crawl work: a URL to visit and the seed domain it is
/// accounted against. Immutable once enqueued; consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    pub url: String,
    pub domain: String,
}

/// Source of rendered page snapshots.
///
/// The production implementation is the session pool; tests substitute an
/// instrumented fake. Implementations contain all of their failures: an
/// unreachable or timed-out page is reported as an empty snapshot list,
/// never as an error.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Vec<String>> + Send;
}
