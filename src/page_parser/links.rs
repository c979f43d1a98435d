//! Same-origin link extraction from rendered markup.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static HREF_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href], area[href], link[href]")
        .expect("BUG: hardcoded href selector is invalid")
});

static SRC_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[src], script[src]").expect("BUG: hardcoded src selector is invalid")
});

/// Collect every same-origin URL referenced by anchors, areas, link tags,
/// images and scripts in `html`, resolved against `base_url`.
///
/// Relative references are joined with the base; anything that resolves to a
/// different host is discarded, so outgoing links never leave the origin of
/// the page they were found on.
pub fn extract_links(html: &str, base_url: &str) -> HashSet<String> {
    let Ok(base) = Url::parse(base_url) else {
        return HashSet::new();
    };

    let document = Html::parse_document(html);
    let mut urls = HashSet::new();

    let candidates = document
        .select(&HREF_ELEMENTS)
        .filter_map(|el| el.value().attr("href"))
        .chain(
            document
                .select(&SRC_ELEMENTS)
                .filter_map(|el| el.value().attr("src")),
        );

    for raw in candidates {
        let Ok(resolved) = base.join(raw) else {
            continue;
        };
        if resolved.host_str() == base.host_str() {
            urls.insert(resolved.to_string());
        }
    }

    urls
}
