//! The crawl orchestrator.
//!
//! Seeds one task per domain, runs the scheduler to quiescence, and
//! accumulates per-domain product sets. The per-URL step is cache-first:
//! a still-valid cache record short-circuits the expensive browser fetch
//! and only replays the recorded outgoing links into the frontier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::{debug, info};
use url::Url;

use super::crawl_types::{CrawlTask, PageFetcher};
use crate::page_parser::{extract_links, is_product_page};
use crate::scheduler::TaskScheduler;
use crate::store::UrlStore;

/// Strip the fragment identifier; fragments are client-side markers, not
/// distinct resources.
fn normalize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Crawls a set of e-commerce domains and collects their product URLs.
pub struct EcommerceCrawler<F, S> {
    domains: Vec<String>,
    fetcher: Arc<F>,
    store: Arc<S>,
    scheduler: Arc<TaskScheduler<CrawlTask>>,
    /// URLs committed to processing. Insertion is the sole dedup gate.
    visited: DashSet<String>,
    /// Per-domain product accumulation, merged with persisted sets on
    /// cache hits.
    products: DashMap<String, HashSet<String>>,
}

impl<F, S> EcommerceCrawler<F, S>
where
    F: PageFetcher + 'static,
    S: UrlStore + 'static,
{
    pub fn new(
        domains: Vec<String>,
        fetcher: Arc<F>,
        store: Arc<S>,
        max_concurrent: usize,
    ) -> Arc<Self> {
        let products = DashMap::new();
        for domain in &domains {
            products.insert(domain.clone(), HashSet::new());
        }
        Arc::new(Self {
            domains,
            fetcher,
            store,
            scheduler: TaskScheduler::new(max_concurrent),
            visited: DashSet::new(),
            products,
        })
    }

    /// Crawl every configured domain to quiescence and return the
    /// accumulated product URLs per domain.
    pub async fn crawl(self: &Arc<Self>) -> HashMap<String, HashSet<String>> {
        for domain in &self.domains {
            self.scheduler
                .submit(CrawlTask {
                    url: format!("https://{domain}"),
                    domain: domain.clone(),
                })
                .await;
        }

        let crawler = Arc::clone(self);
        self.scheduler
            .run_until_quiescent(move |task| {
                let crawler = Arc::clone(&crawler);
                async move { crawler.crawl_url(task).await }
            })
            .await;

        self.products
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// The per-URL crawl step (the scheduler task body).
    ///
    /// Normalize → visited check-and-insert → cache lookup → fetch/classify/
    /// record on a miss → fan discovered links back into the scheduler.
    pub async fn crawl_url(&self, task: CrawlTask) {
        let Some(url) = normalize_url(&task.url) else {
            debug!("Dropping unparseable URL: {}", task.url);
            return;
        };

        // `insert` returning false means another step already claimed this
        // URL; DashSet makes the check-and-insert a single atomic step.
        if !self.visited.insert(url.clone()) {
            return;
        }

        let outgoing = match self.store.get_cached(&url).await {
            Some(record) => {
                debug!("Cache hit, skipping fetch: {url}");
                if self.is_tracked_domain(&url) {
                    // Merge the persisted set rather than overwrite: a
                    // concurrent step may have added a product that the
                    // store snapshot does not carry yet.
                    let persisted = self.store.get_domain_products(&task.domain).await;
                    self.products
                        .entry(task.domain.clone())
                        .or_default()
                        .extend(persisted);
                }
                record.outgoing_urls
            }
            None => {
                info!("Crawling {url}");
                let snapshots = self.fetcher.fetch(&url).await;
                if snapshots.is_empty() {
                    debug!("No content for {url}, treating as unreachable");
                    return;
                }

                let mut discovered = HashSet::new();
                for html in &snapshots {
                    discovered.extend(extract_links(html, &url));
                }
                let outgoing: Vec<String> = discovered.into_iter().collect();

                // Classification looks at the first snapshot only; later
                // snapshots are pagination steps of the same document.
                let is_product = is_product_page(&snapshots[0], &url);
                self.store.cache_url(&url, is_product, &outgoing).await;

                if is_product && self.is_tracked_domain(&url) {
                    info!("Found product: {url}");
                    self.products
                        .entry(task.domain.clone())
                        .or_default()
                        .insert(url.clone());
                    self.store.add_domain_product(&task.domain, &url).await;
                }

                outgoing
            }
        };

        for next in outgoing {
            // Best-effort pre-filter; the authoritative dedup is the
            // visited insert at the top of the step that eventually runs.
            if self.visited.contains(&next) {
                continue;
            }
            self.scheduler
                .submit(CrawlTask {
                    url: next,
                    domain: task.domain.clone(),
                })
                .await;
        }
    }

    /// Whether the URL's host is one of the tracked domains. Product
    /// accounting only applies to tracked hosts; link traversal does not
    /// care.
    fn is_tracked_domain(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|host| self.domains.iter().any(|d| *d == host))
    }

    /// Snapshot of the visited set.
    pub fn visited_urls(&self) -> HashSet<String> {
        self.visited.iter().map(|u| u.clone()).collect()
    }

    /// Product URLs accumulated so far for one domain.
    pub fn product_urls(&self, domain: &str) -> HashSet<String> {
        self.products
            .get(domain)
            .map(|set| set.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_fragment() {
        assert_eq!(
            normalize_url("https://example.test/page#section").as_deref(),
            Some("https://example.test/page")
        );
        assert_eq!(
            normalize_url("https://example.test/page?a=1#x").as_deref(),
            Some("https://example.test/page?a=1")
        );
        assert_eq!(normalize_url("not a url"), None);
    }
}
