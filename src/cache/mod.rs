use bevy::prelude::*;
use lru::LruCache;
use std::num::NonZeroUsize;
use crate::render::tiles::TileKey;

const DEFAULT_TILE_CAPACITY: usize = 512;

#[derive(Resource, Default, Debug)]
pub struct TileMetrics {
    pub tiles_fetched: u32,
    pub cache_hits: u32,
    pub fetch_failures: u32,
}

/// Decoded basemap tiles, least recently displayed evicted first.
#[derive(Resource)]
pub struct TileCache {
    cache: LruCache<TileKey, Handle<Image>>,
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TILE_CAPACITY)
    }
}

impl TileCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &TileKey) -> Option<Handle<Image>> {
        self.cache.get(key).cloned()
    }

    pub fn insert(&mut self, key: TileKey, tile: Handle<Image>) {
        self.cache.put(key, tile);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
