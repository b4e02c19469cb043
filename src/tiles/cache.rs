use crate::core::geo::TileCoord;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A cached tile with the moment it was fetched.
#[derive(Debug, Clone)]
struct CachedTile {
    bytes: Arc<Vec<u8>>,
    fetched_at: Instant,
}

/// In-memory tile cache using LRU eviction with time-based expiry.
///
/// Entries older than the caller's max age count as stale; they stay in
/// the cache so a failed refetch can still fall back to them.
#[derive(Debug)]
pub struct TileCache {
    cache: Arc<Mutex<LruCache<TileCoord, CachedTile>>>,
}

impl TileCache {
    /// Create a new tile cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1024).unwrap());
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Create a new tile cache with default capacity (1024 tiles)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    /// Get a tile no older than `max_age`.
    pub fn get_fresh(&self, coord: &TileCoord, max_age: Duration) -> Option<Arc<Vec<u8>>> {
        let mut cache = self.cache.lock().ok()?;
        let entry = cache.get(coord)?;
        if entry.fetched_at.elapsed() < max_age {
            Some(entry.bytes.clone())
        } else {
            None
        }
    }

    /// Get a tile regardless of age (the stale-serve fallback path).
    pub fn get_any(&self, coord: &TileCoord) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().ok()?.get(coord).map(|e| e.bytes.clone())
    }

    /// Insert a tile with a fresh timestamp and return the shared bytes.
    pub fn insert(&self, coord: TileCoord, data: Vec<u8>) -> Arc<Vec<u8>> {
        let bytes = Arc::new(data);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                coord,
                CachedTile {
                    bytes: bytes.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        bytes
    }

    /// Check if a tile is in the cache, fresh or stale.
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.contains(coord))
            .unwrap_or(false)
    }

    /// Remove a tile from the cache
    pub fn remove(&self, coord: &TileCoord) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(coord);
        }
    }

    /// Clear all tiles from the cache
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.cache.lock().ok().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for TileCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_fresh_hit_within_max_age() {
        let cache = TileCache::new(4);
        let coord = TileCoord::new(1, 2, 3);
        cache.insert(coord, vec![1, 2, 3]);

        let hit = cache.get_fresh(&coord, HOUR).unwrap();
        assert_eq!(*hit, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_max_age_is_always_stale() {
        let cache = TileCache::new(4);
        let coord = TileCoord::new(1, 2, 3);
        cache.insert(coord, vec![1]);

        assert!(cache.get_fresh(&coord, Duration::ZERO).is_none());
        // The stale entry is still reachable as a fallback.
        assert_eq!(*cache.get_any(&coord).unwrap(), vec![1]);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = TileCache::new(2);
        let c1 = TileCoord::new(1, 1, 1);
        let c2 = TileCoord::new(2, 2, 2);
        let c3 = TileCoord::new(3, 3, 3);

        cache.insert(c1, vec![1]);
        cache.insert(c2, vec![2]);
        cache.insert(c3, vec![3]);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&c1));
        assert!(cache.contains(&c2));
        assert!(cache.contains(&c3));
    }
}
