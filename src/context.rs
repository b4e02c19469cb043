use crate::background::download::{self, TaskHandle};
use crate::background::tasks::TaskCoordinator;
use crate::core::map::{Map, SharedMap};
use crate::persist;
use crate::prelude::HashMap;
use crate::store::DataStore;
use crate::tiles::source::{TileFetcher, TileSource, TmsConfig};
use crate::{MapError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Engine context owning the store, map and tile-source registries.
///
/// Constructed explicitly and passed down to collaborators; there is no
/// process-wide instance. The context owns canonical storage — consumers
/// hold shared handles that invalidate (via `Weak` upgrade failure) once
/// the owning registry unloads the resource.
pub struct MapContext {
    data_dir: PathBuf,
    stores: RwLock<HashMap<String, Arc<DataStore>>>,
    maps: RwLock<HashMap<String, SharedMap>>,
    tile_sources: RwLock<HashMap<String, Arc<TileSource>>>,
    coordinator: TaskCoordinator,
}

impl MapContext {
    /// Opens a context rooted at the application-managed data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(data_dir.join("maps"))?;
        fs::create_dir_all(data_dir.join("tiles"))?;
        log::info!("context opened at {}", data_dir.display());

        Ok(Self {
            data_dir,
            stores: RwLock::new(HashMap::default()),
            maps: RwLock::new(HashMap::default()),
            tile_sources: RwLock::new(HashMap::default()),
            coordinator: TaskCoordinator::with_default_pool(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    /// Reports a component version; `"self"` names the engine itself.
    pub fn version_string(&self, component: &str) -> Option<String> {
        match component {
            "self" => Some(env!("CARGO_PKG_VERSION").to_string()),
            _ => None,
        }
    }

    /// Gets or opens the named data store under the data directory.
    pub fn get_store(&self, name: &str) -> Result<Arc<DataStore>> {
        if let Some(store) = self.stores.read().unwrap().get(name) {
            return Ok(store.clone());
        }
        let mut stores = self.stores.write().unwrap();
        // Lost the race to another opener? Reuse its store.
        if let Some(store) = stores.get(name) {
            return Ok(store.clone());
        }
        let store = Arc::new(DataStore::open(&self.data_dir, name)?);
        stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Gets the named map, loading its persisted definition or creating a
    /// fresh empty map on first lookup.
    ///
    /// Repeated calls return the same shared identity and never duplicate
    /// layers.
    pub fn get_or_create_map(&self, name: &str) -> Result<SharedMap> {
        if let Some(map) = self.maps.read().unwrap().get(name) {
            return Ok(map.clone());
        }
        let mut maps = self.maps.write().unwrap();
        if let Some(map) = maps.get(name) {
            return Ok(map.clone());
        }
        let map = match Map::load(&self.data_dir, name)? {
            Some(persisted) => {
                log::debug!("loaded map {name:?} ({} layers)", persisted.layer_count());
                persisted
            }
            None => Map::new(name),
        };
        let shared: SharedMap = Arc::new(RwLock::new(map));
        maps.insert(name.to_string(), shared.clone());
        Ok(shared)
    }

    /// Persists the named map's current state.
    pub fn save_map(&self, name: &str) -> Result<()> {
        let map = self
            .maps
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| MapError::NotFound(format!("map {name:?}")))?;
        let guard = map.read().unwrap();
        guard.save(&self.data_dir)
    }

    /// Drops the canonical owner of a loaded map. Outstanding weak
    /// handles stop upgrading; a pending debounced job that captured one
    /// becomes a no-op.
    pub fn unload_map(&self, name: &str) -> bool {
        self.maps.write().unwrap().remove(name).is_some()
    }

    /// Registers a TMS source, persisting its definition so it can be
    /// reopened by name. Does not fetch anything eagerly.
    pub fn create_tms(&self, config: TmsConfig) -> Result<Arc<TileSource>> {
        self.create_tms_with_fetcher(config, Arc::new(crate::tiles::source::HttpFetcher))
    }

    /// As [`MapContext::create_tms`], with a caller-provided fetcher.
    pub fn create_tms_with_fetcher(
        &self,
        config: TmsConfig,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Result<Arc<TileSource>> {
        let mut sources = self.tile_sources.write().unwrap();
        if sources.contains_key(&config.name) || self.tms_config_path(&config.name).exists() {
            return Err(MapError::AlreadyExists(format!(
                "tile source {:?}",
                config.name
            )));
        }
        let name = config.name.clone();
        let source = Arc::new(TileSource::with_fetcher(
            config.clone(),
            &self.tiles_dir(),
            fetcher,
        )?);
        persist::write_json_atomic(&self.tms_config_path(&name), &config)?;
        sources.insert(name, source.clone());
        Ok(source)
    }

    /// Looks up a tile source, reopening a persisted definition if it is
    /// not resident yet.
    pub fn tile_source(&self, name: &str) -> Result<Arc<TileSource>> {
        if let Some(source) = self.tile_sources.read().unwrap().get(name) {
            return Ok(source.clone());
        }
        let path = self.tms_config_path(name);
        if !path.exists() {
            return Err(MapError::NotFound(format!("tile source {name:?}")));
        }
        let config: TmsConfig = persist::read_json(&path)?;
        let source = Arc::new(TileSource::new(config, &self.tiles_dir())?);
        self.tile_sources
            .write()
            .unwrap()
            .insert(name.to_string(), source.clone());
        Ok(source)
    }

    /// Warms the named source's cache for one tile on a pool worker, so
    /// the rendering consumer finds the bytes resident instead of paying
    /// for the fetch itself.
    pub fn prefetch_tile(&self, source_name: &str, z: u8, x: u32, y: u32) -> Result<()> {
        let source = self.tile_source(source_name)?;
        self.coordinator.submit(move || {
            if let Err(e) = source.get_tile(z, x, y) {
                log::debug!("prefetch {z}/{x}/{y} skipped: {e}");
            }
        })
    }

    /// Starts a background download through the shared coordinator.
    pub fn start_download(
        &self,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Result<TaskHandle> {
        download::start_download(&self.coordinator, url, destination)
    }

    fn tiles_dir(&self) -> PathBuf {
        self.data_dir.join("tiles")
    }

    fn tms_config_path(&self, name: &str) -> PathBuf {
        self.tiles_dir().join(format!("{name}.json"))
    }
}
