//! CLI entry point: crawl the given domains and print the per-domain
//! product URLs as JSON.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shopcrawl::CrawlerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let domains: Vec<String> = std::env::args().skip(1).collect();
    if domains.is_empty() {
        eprintln!("usage: shopcrawl <domain> [<domain>...]");
        std::process::exit(2);
    }

    let config = CrawlerConfig::from_env();
    info!(
        "Starting crawl of {} domain(s) with {} sessions / {} workers",
        domains.len(),
        config.max_sessions,
        config.max_concurrent
    );

    let results = shopcrawl::crawl(domains, config).await?;

    // Sorted output for stable, diffable reports.
    let report: BTreeMap<String, Vec<String>> = results
        .into_iter()
        .map(|(domain, urls)| {
            let mut urls: Vec<String> = urls.into_iter().collect();
            urls.sort();
            (domain, urls)
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
