//! Page raster store with LRU eviction
//!
//! Holds rendered page bitmaps keyed by page index and render scale. A zoom
//! change produces a new key, so the editor invalidates the old rasters of
//! the page explicitly instead of waiting for them to age out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Key identifying one rendered page at one scale
///
/// Scales are quantized to thousandths so that `1.5` computed two different
/// ways still hits the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub page_index: u32,
    scale_milli: u32,
}

impl PageKey {
    pub fn new(page_index: u32, scale: f32) -> Self {
        let scale_milli = (scale.max(0.0) * 1000.0).round() as u32;
        Self {
            page_index,
            scale_milli,
        }
    }

    /// Render scale this key was built from (quantized)
    pub fn scale(&self) -> f32 {
        self.scale_milli as f32 / 1000.0
    }
}

/// RGBA bitmap of one source page
///
/// Pixel data is shared, so handing a raster to the compositor does not copy
/// the bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl PageRaster {
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// Memory size of the pixel buffer in bytes
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Statistics about store usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreStats {
    /// Number of rasters currently held
    pub raster_count: usize,

    /// Total memory used by held rasters (bytes)
    pub memory_used: usize,

    /// Memory budget (bytes)
    pub memory_limit: usize,

    pub hits: u64,
    pub misses: u64,

    /// Rasters dropped due to memory pressure
    pub evictions: u64,

    /// Rasters dropped by explicit invalidation
    pub invalidations: u64,
}

impl StoreStats {
    /// Hit rate between 0.0 and 1.0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Page raster store with LRU eviction
///
/// When a new raster would push usage above the budget, least recently used
/// rasters are evicted first. A raster bigger than the whole budget is still
/// stored (alone) so the current page always has a background.
///
/// # Example
///
/// ```
/// use pdf_annotator_cache::{PageKey, PageRaster, PageStore};
///
/// let mut store = PageStore::with_mb_limit(64);
/// let key = PageKey::new(0, 1.5);
///
/// store.insert(key, PageRaster::new(2, 2, vec![255u8; 16]));
/// assert!(store.get(&key).is_some());
///
/// // zoom changed: drop every raster of page 0
/// store.invalidate_page(0);
/// assert!(!store.contains(&key));
/// ```
#[derive(Debug)]
pub struct PageStore {
    rasters: HashMap<PageKey, PageRaster>,

    /// Most recently used at the back
    lru_queue: VecDeque<PageKey>,

    memory_used: usize,
    memory_limit: usize,
    stats: StoreStats,
}

impl PageStore {
    /// Create a store with a memory budget in bytes
    pub fn new(memory_limit: usize) -> Self {
        Self {
            rasters: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: StoreStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    /// Store a raster, replacing any raster already held under `key`
    pub fn insert(&mut self, key: PageKey, raster: PageRaster) {
        self.remove_entry(&key);

        let size = raster.memory_size();
        self.evict_to_fit(size);

        self.memory_used += size;
        self.rasters.insert(key, raster);
        self.lru_queue.push_back(key);
        self.sync_stats();
    }

    /// Retrieve a raster, marking it most recently used
    pub fn get(&mut self, key: &PageKey) -> Option<PageRaster> {
        match self.rasters.get(key).cloned() {
            Some(raster) => {
                self.touch(*key);
                self.stats.hits += 1;
                Some(raster)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Whether `key` is held, without touching LRU order or statistics
    pub fn contains(&self, key: &PageKey) -> bool {
        self.rasters.contains_key(key)
    }

    pub fn remove(&mut self, key: &PageKey) -> Option<PageRaster> {
        let removed = self.remove_entry(key);
        self.sync_stats();
        removed
    }

    /// Drop every raster of `page_index`, at any scale. Returns how many
    /// were dropped.
    pub fn invalidate_page(&mut self, page_index: u32) -> usize {
        let keys: Vec<PageKey> = self
            .rasters
            .keys()
            .filter(|key| key.page_index == page_index)
            .copied()
            .collect();

        for key in &keys {
            self.remove_entry(key);
        }
        self.stats.invalidations += keys.len() as u64;
        self.sync_stats();

        if !keys.is_empty() {
            log::debug!("invalidated {} raster(s) of page {}", keys.len(), page_index);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.rasters.clear();
        self.lru_queue.clear();
        self.memory_used = 0;
        self.sync_stats();
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Change the budget, evicting if usage is now above it
    pub fn set_memory_limit(&mut self, limit: usize) {
        self.memory_limit = limit;
        self.stats.memory_limit = limit;
        if self.memory_used > limit {
            self.evict_to_fit(0);
        }
        self.sync_stats();
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn len(&self) -> usize {
        self.rasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rasters.is_empty()
    }

    fn touch(&mut self, key: PageKey) {
        self.lru_queue.retain(|k| *k != key);
        self.lru_queue.push_back(key);
    }

    fn remove_entry(&mut self, key: &PageKey) -> Option<PageRaster> {
        let raster = self.rasters.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(raster.memory_size());
        self.lru_queue.retain(|k| k != key);
        Some(raster)
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.memory_used + required > self.memory_limit {
            let Some(key) = self.lru_queue.pop_front() else {
                break;
            };
            if let Some(raster) = self.rasters.remove(&key) {
                self.memory_used = self.memory_used.saturating_sub(raster.memory_size());
                self.stats.evictions += 1;
                log::debug!(
                    "evicted page {} at scale {:.3}",
                    key.page_index,
                    key.scale()
                );
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.raster_count = self.rasters.len();
        self.stats.memory_used = self.memory_used;
    }
}

impl Default for PageStore {
    /// A store with a 256MB budget
    fn default() -> Self {
        Self::with_mb_limit(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB_256: usize = 256 * 1024;

    fn raster() -> PageRaster {
        PageRaster::new(256, 256, vec![0u8; KB_256])
    }

    #[test]
    fn test_basic_insert_get() {
        let mut store = PageStore::new(1024 * 1024);
        let key = PageKey::new(3, 1.0);

        store.insert(key, raster());

        let held = store.get(&key).expect("raster should be held");
        assert_eq!(held.width, 256);
        assert_eq!(held.height, 256);
        assert_eq!(held.memory_size(), KB_256);
    }

    #[test]
    fn test_scale_is_part_of_key() {
        let mut store = PageStore::new(1024 * 1024);
        store.insert(PageKey::new(0, 1.0), raster());

        assert!(store.get(&PageKey::new(0, 1.5)).is_none());
        assert!(store.get(&PageKey::new(0, 1.0)).is_some());
        assert_eq!(PageKey::new(0, 0.1 + 0.2), PageKey::new(0, 0.3));
    }

    #[test]
    fn test_lru_eviction() {
        let mut store = PageStore::new(2 * KB_256);

        store.insert(PageKey::new(0, 1.0), raster());
        store.insert(PageKey::new(1, 1.0), raster());
        // touch page 0 so page 1 is the oldest
        assert!(store.get(&PageKey::new(0, 1.0)).is_some());
        store.insert(PageKey::new(2, 1.0), raster());

        assert!(store.contains(&PageKey::new(0, 1.0)));
        assert!(!store.contains(&PageKey::new(1, 1.0)));
        assert!(store.contains(&PageKey::new(2, 1.0)));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_raster_still_stored() {
        let mut store = PageStore::new(1024);
        let key = PageKey::new(0, 4.0);

        store.insert(key, raster());

        assert!(store.contains(&key));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalidate_page_drops_all_scales() {
        let mut store = PageStore::new(4 * KB_256);
        store.insert(PageKey::new(0, 1.0), raster());
        store.insert(PageKey::new(0, 2.0), raster());
        store.insert(PageKey::new(1, 1.0), raster());

        assert_eq!(store.invalidate_page(0), 2);

        assert_eq!(store.len(), 1);
        assert_eq!(store.memory_used(), KB_256);
        assert_eq!(store.stats().invalidations, 2);
        assert!(store.contains(&PageKey::new(1, 1.0)));
    }

    #[test]
    fn test_replacing_key_keeps_memory_accurate() {
        let mut store = PageStore::new(1024 * 1024);
        let key = PageKey::new(0, 1.0);

        store.insert(key, raster());
        store.insert(key, PageRaster::new(1, 1, vec![0u8; 4]));

        assert_eq!(store.len(), 1);
        assert_eq!(store.memory_used(), 4);
    }

    #[test]
    fn test_stats_hit_rate() {
        let mut store = PageStore::default();
        let key = PageKey::new(0, 1.0);
        store.insert(key, raster());

        let _ = store.get(&key);
        let _ = store.get(&PageKey::new(9, 1.0));
        let _ = store.get(&PageKey::new(9, 2.0));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate() - 0.333).abs() < 0.01);
    }

    #[test]
    fn test_set_memory_limit_evicts() {
        let mut store = PageStore::new(4 * KB_256);
        for page in 0..4 {
            store.insert(PageKey::new(page, 1.0), raster());
        }

        store.set_memory_limit(KB_256);

        assert_eq!(store.len(), 1);
        assert!(store.contains(&PageKey::new(3, 1.0)));
    }

    #[test]
    fn test_clear() {
        let mut store = PageStore::new(1024 * 1024);
        store.insert(PageKey::new(0, 1.0), raster());
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.memory_used(), 0);
        assert!(store.remove(&PageKey::new(0, 1.0)).is_none());
    }
}
