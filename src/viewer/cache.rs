//! Rasterized pages kept around so zooming back or revisiting a page is free

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;

use super::fit::SurfaceGeometry;
use super::types::PageData;

/// A raster is only reusable at the exact same backing size and layout scale
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page: usize,
    pub backing: (u32, u32),
    /// Layout scale in millionths, floats do not hash
    pub scale_millionths: u32,
}

impl CacheKey {
    pub fn for_surface(page: usize, geometry: &SurfaceGeometry) -> Self {
        Self {
            page,
            backing: (geometry.backing_width, geometry.backing_height),
            scale_millionths: (geometry.scale * 1_000_000.0).round() as u32,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct PageCache {
    pages: LruCache<CacheKey, Arc<PageData>>,
    hits: u64,
    misses: u64,
}

impl PageCache {
    pub const DEFAULT_CAPACITY: usize = 16;

    pub fn new(capacity: usize) -> Self {
        Self {
            pages: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    /// Counts the lookup and marks a hit as most recently used
    pub fn lookup(&mut self, key: &CacheKey) -> Option<Arc<PageData>> {
        match self.pages.get(key) {
            Some(data) => {
                self.hits += 1;
                Some(Arc::clone(data))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn store(&mut self, key: CacheKey, data: PageData) -> Arc<PageData> {
        let data = Arc::new(data);
        if let Some((evicted, _)) = self.pages.push(key, Arc::clone(&data)) {
            if evicted != key {
                debug!("Evicted page {} from the raster cache", evicted.page);
            }
        }
        data
    }

    /// A new document or pixel ratio makes every raster stale
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.pages.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{Raster, Size};
    use super::*;

    fn key(page: usize, zoom: f32) -> CacheKey {
        let geometry =
            SurfaceGeometry::compute(Size::new(600.0, 800.0), Size::new(800.0, 600.0), zoom, 1.0);
        CacheKey::for_surface(page, &geometry)
    }

    fn blank(page: usize) -> PageData {
        PageData {
            page,
            raster: Raster {
                pixels: vec![255; 12],
                width_px: 2,
                height_px: 2,
            },
            text_runs: Vec::new(),
        }
    }

    #[test]
    fn zoom_level_is_part_of_the_key() {
        let mut cache = PageCache::new(4);
        cache.store(key(1, 1.5), blank(1));

        assert_eq!(cache.lookup(&key(1, 1.5)).map(|d| d.page), Some(1));
        assert!(cache.lookup(&key(1, 1.8)).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn recently_viewed_page_survives_eviction() {
        let mut cache = PageCache::new(2);
        cache.store(key(1, 1.5), blank(1));
        cache.store(key(2, 1.5), blank(2));
        assert!(cache.lookup(&key(1, 1.5)).is_some());
        cache.store(key(3, 1.5), blank(3));

        assert!(cache.lookup(&key(1, 1.5)).is_some());
        assert!(cache.lookup(&key(2, 1.5)).is_none());
    }

    #[test]
    fn zero_capacity_still_holds_one_page() {
        let mut cache = PageCache::new(0);
        cache.store(key(1, 1.5), blank(1));
        assert_eq!(cache.stats().entries, 1);
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
