use crate::core::crs::SpatialReference;
use crate::core::geo::{Envelope, TileCoord};
use crate::persist;
use crate::tiles::cache::TileCache;
use crate::{MapError, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Shared blocking HTTP client with a custom User-Agent so that public tile
/// servers (e.g. OpenStreetMap) don't reject the request. Building the client
/// once avoids the cost of TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("mapstore/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build reqwest blocking client")
});

/// Trait representing anything that can fetch tile bytes for a URL.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Production fetcher over the shared blocking client, with one retry.
pub struct HttpFetcher;

impl TileFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        const MAX_ATTEMPTS: usize = 2;
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            log::debug!("fetch {url} attempt {attempt}");
            let result: std::result::Result<Vec<u8>, String> = HTTP_CLIENT
                .get(url)
                .send()
                .map_err(|e| e.to_string())
                .and_then(|resp| {
                    if !resp.status().is_success() {
                        return Err(format!("HTTP {}", resp.status()));
                    }
                    resp.bytes().map(|b| b.to_vec()).map_err(|e| e.to_string())
                });

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::warn!("fetch {url} failed on attempt {attempt}: {e}");
                    last_error = e;
                    if attempt < MAX_ATTEMPTS {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        }
        Err(MapError::Fetch(last_error))
    }
}

/// Definition of a remote TMS source: a z/x/y URL template, a zoom range,
/// full and limit extents, and a cache-expiry duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmsConfig {
    pub name: String,
    pub url_template: String,
    pub srs: SpatialReference,
    pub z_min: u8,
    pub z_max: u8,
    pub full_extent: Envelope,
    pub limit_extent: Envelope,
    pub cache_expires: Duration,
}

impl TmsConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.z_min > self.z_max {
            return Err(MapError::InvalidSchema(format!(
                "zoom range {}..{} is inverted",
                self.z_min, self.z_max
            )));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                return Err(MapError::InvalidSchema(format!(
                    "url template {:?} is missing {placeholder}",
                    self.url_template
                )));
            }
        }
        // Extents may come from deserialized documents, which bypass the
        // Envelope constructor.
        for extent in [&self.full_extent, &self.limit_extent] {
            if extent.min.x > extent.max.x || extent.min.y > extent.max.y {
                return Err(MapError::InvalidSchema("inverted extent".to_string()));
            }
        }
        Ok(())
    }
}

/// A remote tile source with a two-level (memory + disk) expiring cache.
///
/// Tiles never fetch eagerly; `get_tile` resolves each request through the
/// caches first and falls back to stale bytes when a refetch fails.
pub struct TileSource {
    config: TmsConfig,
    cache: TileCache,
    disk_dir: PathBuf,
    fetcher: Arc<dyn TileFetcher>,
}

impl TileSource {
    /// Creates a source over the production HTTP fetcher.
    pub fn new(config: TmsConfig, tiles_dir: &Path) -> Result<Self> {
        Self::with_fetcher(config, tiles_dir, Arc::new(HttpFetcher))
    }

    /// Creates a source with a caller-provided fetcher.
    pub fn with_fetcher(
        config: TmsConfig,
        tiles_dir: &Path,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let disk_dir = tiles_dir.join(&config.name);
        Ok(Self {
            config,
            cache: TileCache::with_default_capacity(),
            disk_dir,
            fetcher,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TmsConfig {
        &self.config
    }

    /// Returns the tile bytes for (z, x, y).
    ///
    /// Cache hits younger than `cache_expires` return without a fetch; a
    /// miss or stale entry refetches and restamps. When the fetch fails,
    /// any cached bytes are served stale rather than surfacing an error
    /// to the rendering consumer.
    pub fn get_tile(&self, z: u8, x: u32, y: u32) -> Result<Arc<Vec<u8>>> {
        if z < self.config.z_min || z > self.config.z_max {
            return Err(MapError::OutOfRange(format!(
                "zoom {z} outside {}..{}",
                self.config.z_min, self.config.z_max
            )));
        }
        let coord = TileCoord::new(x, y, z);
        if !coord.is_valid() {
            return Err(MapError::OutOfRange(format!(
                "tile ({x}, {y}) outside the grid at zoom {z}"
            )));
        }

        let max_age = self.config.cache_expires;
        if let Some(bytes) = self.cache.get_fresh(&coord, max_age) {
            return Ok(bytes);
        }
        if let Some(bytes) = self.disk_read(&coord, true) {
            return Ok(self.cache.insert(coord, bytes));
        }

        let url = self.url_for(&coord);
        match self.fetcher.fetch(&url) {
            Ok(bytes) => {
                log::debug!("{}: fetched {:?} ({} bytes)", self.config.name, coord, bytes.len());
                if let Err(e) = persist::write_atomic(&self.disk_path(&coord), &bytes) {
                    log::warn!("{}: tile {:?} not persisted: {e}", self.config.name, coord);
                }
                Ok(self.cache.insert(coord, bytes))
            }
            Err(e) => {
                if let Some(stale) = self
                    .cache
                    .get_any(&coord)
                    .or_else(|| self.disk_read(&coord, false).map(Arc::new))
                {
                    log::warn!(
                        "{}: serving stale tile {:?} after failed refetch: {e}",
                        self.config.name,
                        coord
                    );
                    return Ok(stale);
                }
                Err(e)
            }
        }
    }

    fn url_for(&self, coord: &TileCoord) -> String {
        self.config
            .url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    fn disk_path(&self, coord: &TileCoord) -> PathBuf {
        self.disk_dir
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(coord.y.to_string())
    }

    /// Reads a tile from the disk tier; `require_fresh` applies the
    /// expiry rule against the file's modification time.
    fn disk_read(&self, coord: &TileCoord, require_fresh: bool) -> Option<Vec<u8>> {
        let path = self.disk_path(coord);
        if require_fresh {
            let modified = fs::metadata(&path).ok()?.modified().ok()?;
            let age = SystemTime::now().duration_since(modified).ok()?;
            if age >= self.config.cache_expires {
                return None;
            }
        }
        fs::read(&path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fetcher that counts calls and can be switched to fail.
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TileFetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(MapError::Fetch("connection refused".to_string()));
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    fn config(expires: Duration) -> TmsConfig {
        TmsConfig {
            name: "osm".to_string(),
            url_template: "http://tile.example.org/{z}/{x}/{y}.png".to_string(),
            srs: SpatialReference::WebMercator,
            z_min: 0,
            z_max: 18,
            full_extent: Envelope::web_mercator_extent(),
            limit_extent: Envelope::web_mercator_extent(),
            cache_expires: expires,
        }
    }

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    #[test]
    fn test_validation_rejects_bad_configs() {
        let mut bad_zoom = config(WEEK);
        bad_zoom.z_min = 10;
        bad_zoom.z_max = 2;
        assert!(bad_zoom.validate().is_err());

        let mut bad_template = config(WEEK);
        bad_template.url_template = "http://tile.example.org/tiles.png".to_string();
        assert!(bad_template.validate().is_err());
    }

    #[test]
    fn test_out_of_range_requests() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new();
        let mut cfg = config(WEEK);
        cfg.z_min = 2;
        let source = TileSource::with_fetcher(cfg, dir.path(), fetcher.clone()).unwrap();

        assert!(matches!(
            source.get_tile(1, 0, 0),
            Err(MapError::OutOfRange(_))
        ));
        assert!(matches!(
            source.get_tile(2, 4, 0),
            Err(MapError::OutOfRange(_))
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn test_repeat_request_within_expiry_fetches_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new();
        let source = TileSource::with_fetcher(config(WEEK), dir.path(), fetcher.clone()).unwrap();

        let first = source.get_tile(3, 1, 2).unwrap();
        let second = source.get_tile(3, 1, 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_expired_entry_triggers_one_refetch() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new();
        let source =
            TileSource::with_fetcher(config(Duration::ZERO), dir.path(), fetcher.clone()).unwrap();

        source.get_tile(3, 1, 2).unwrap();
        source.get_tile(3, 1, 2).unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_stale_serve_on_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new();
        let source =
            TileSource::with_fetcher(config(Duration::ZERO), dir.path(), fetcher.clone()).unwrap();

        let original = source.get_tile(3, 1, 2).unwrap();
        fetcher.fail.store(true, Ordering::SeqCst);

        // The entry is expired and the refetch fails, so the stale bytes win.
        let served = source.get_tile(3, 1, 2).unwrap();
        assert_eq!(original, served);

        // A tile that was never cached has nothing to fall back on.
        assert!(matches!(
            source.get_tile(4, 0, 0),
            Err(MapError::Fetch(_))
        ));
    }

    #[test]
    fn test_disk_tier_survives_a_new_source_instance() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new();
        {
            let source =
                TileSource::with_fetcher(config(WEEK), dir.path(), fetcher.clone()).unwrap();
            source.get_tile(5, 9, 11).unwrap();
        }
        assert_eq!(fetcher.calls(), 1);

        let reopened = TileSource::with_fetcher(config(WEEK), dir.path(), fetcher.clone()).unwrap();
        let bytes = reopened.get_tile(5, 9, 11).unwrap();
        assert_eq!(*bytes, b"http://tile.example.org/5/9/11.png".to_vec());
        assert_eq!(fetcher.calls(), 1);
    }
}
