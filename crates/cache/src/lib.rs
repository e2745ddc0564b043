//! PDF Annotator Cache Library
//!
//! Rendered page rasters keyed by page and scale, with LRU eviction under a
//! memory budget.

pub mod page_store;

pub use page_store::{PageKey, PageRaster, PageStore, StoreStats};
