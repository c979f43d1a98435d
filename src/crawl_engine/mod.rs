//! Crawl orchestration: task types, the fetcher seam, and the orchestrator
//! that walks domains to completion.

pub mod crawl_types;
pub mod orchestrator;

pub use crawl_types::{CrawlError, CrawlTask, PageFetcher};
pub use orchestrator::EcommerceCrawler;
