//! Pure markup transformations: link extraction and product classification.
//!
//! Nothing in here performs I/O. Both functions operate on already-rendered
//! HTML snapshots produced by the session pool.

pub mod links;
pub mod product;

pub use links::extract_links;
pub use product::is_product_page;
