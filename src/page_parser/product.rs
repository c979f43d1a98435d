//! Product-page classification over rendered markup.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};

/// Path segments that mark a URL as a product page on most storefronts.
const URL_PATTERNS: &[&str] = &[r"/product/", r"/products/", r"/dp/", r"/item/", r"/p/", r"shop"];

/// Call-to-action phrases that identify a purchasable item.
const CTA_PHRASES: &[&str] = &[
    "add to cart",
    "buy now",
    "buy it now",
    "pay now",
    "out of stock",
    "add to basket",
    "add to bag",
    "checkout",
    "purchase",
];

static URL_PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&URL_PATTERNS.join("|")).expect("BUG: hardcoded URL pattern regex is invalid")
});

static CTA_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(&CTA_PHRASES.join("|"))
        .case_insensitive(true)
        .build()
        .expect("BUG: hardcoded call-to-action regex is invalid")
});

static CTA_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("button, a").expect("BUG: hardcoded CTA selector is invalid")
});

/// Decide whether a rendered page is a product page.
///
/// A page qualifies when its URL contains one of the known product path
/// segments, or when the document contains exactly one button/anchor whose
/// text is a purchase call-to-action. A page with several matching elements
/// (say, a category listing with a "buy now" per tile) does not qualify via
/// the call-to-action rule.
pub fn is_product_page(html: &str, url: &str) -> bool {
    url_pattern_matches(url) || has_unique_cta(html)
}

fn url_pattern_matches(url: &str) -> bool {
    URL_PATTERN_RE.is_match(&url.to_lowercase())
}

fn has_unique_cta(html: &str) -> bool {
    let document = Html::parse_document(html);
    let matching = document
        .select(&CTA_ELEMENTS)
        .filter(|el| {
            let text = el.text().collect::<String>();
            CTA_RE.is_match(text.trim())
        })
        .count();
    matching == 1
}
