use crate::core::geo::Envelope;
use crate::layers::layer::{Layer, LayerId, LayerSource};
use crate::persist;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Shared handle to a map. Mutations go through the write lock; the
/// rendering consumer takes read guards and observes consistent snapshots.
pub type SharedMap = Arc<RwLock<Map>>;

/// Map-level configuration.
///
/// Takes effect on the next render; setting options performs no I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapOptions {
    /// Extra zoom levels added on top of the scale-derived zoom.
    pub zoom_increment: f64,
    /// Divisor applied to the viewport width/height to reduce memory usage.
    pub viewport_reduce_factor: f64,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            zoom_increment: 0.0,
            viewport_reduce_factor: 1.0,
        }
    }
}

impl MapOptions {
    /// Applies a string-keyed option, the form configuration callers use.
    ///
    /// Unknown keys fail with `NotFound`, non-numeric values with
    /// `InvalidSchema`; nothing is silently dropped.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed: f64 = value.parse().map_err(|_| {
            MapError::InvalidSchema(format!("option {key} expects a number, got {value:?}"))
        })?;
        match key {
            "ZOOM_INCREMENT" => self.zoom_increment = parsed,
            "VIEWPORT_REDUCE_FACTOR" => self.viewport_reduce_factor = parsed,
            other => return Err(MapError::NotFound(format!("map option {other}"))),
        }
        Ok(())
    }
}

/// A named, persistent, ordered sequence of layers.
///
/// Index 0 draws at the bottom. The map is created empty on first lookup
/// by name and becomes populated through [`Map::add_layer`]; persistence
/// is explicit via [`Map::save`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    name: String,
    layers: Vec<Layer>,
    options: MapOptions,
    extent_limits: Option<Envelope>,
    next_layer_id: u32,
}

impl Map {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            options: MapOptions::default(),
            extent_limits: None,
            next_layer_id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layers in draw order, bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: MapOptions) {
        self.options = options;
    }

    pub fn extent_limits(&self) -> Option<&Envelope> {
        self.extent_limits.as_ref()
    }

    pub fn set_extent_limits(&mut self, limits: Envelope) {
        self.extent_limits = Some(limits);
    }

    /// Appends a layer on top of the stack and returns its id.
    ///
    /// Names need not be unique; identity is the returned [`LayerId`].
    pub fn add_layer(&mut self, name: impl Into<String>, source: LayerSource) -> LayerId {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        self.layers.push(Layer::new(id, name, source));
        id
    }

    /// Removes a layer from the stack.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer> {
        let pos = self
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| MapError::NotFound(format!("{id} in map {:?}", self.name)))?;
        Ok(self.layers.remove(pos))
    }

    /// Repositions `moved` immediately before `before`; `None` moves it to
    /// the end (top of the draw order).
    pub fn reorder(&mut self, moved: LayerId, before: Option<LayerId>) -> Result<()> {
        let from = self
            .layers
            .iter()
            .position(|l| l.id == moved)
            .ok_or_else(|| MapError::NotFound(format!("{moved} in map {:?}", self.name)))?;
        if let Some(before_id) = before {
            if self.layers.iter().all(|l| l.id != before_id) {
                return Err(MapError::NotFound(format!(
                    "{before_id} in map {:?}",
                    self.name
                )));
            }
            if before_id == moved {
                return Ok(());
            }
        }

        let layer = self.layers.remove(from);
        let to = match before {
            Some(before_id) => self
                .layers
                .iter()
                .position(|l| l.id == before_id)
                .unwrap_or(self.layers.len()),
            None => self.layers.len(),
        };
        self.layers.insert(to, layer);
        Ok(())
    }

    /// Persists the ordered layer list, styles, source bindings and
    /// map-level configuration under `data_dir`, atomically.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = Self::document_path(data_dir, &self.name);
        persist::write_json_atomic(&path, self)?;
        log::info!("saved map {:?} ({} layers)", self.name, self.layers.len());
        Ok(())
    }

    /// Loads a persisted map by name, if one exists.
    pub fn load(data_dir: &Path, name: &str) -> Result<Option<Map>> {
        let path = Self::document_path(data_dir, name);
        if !path.exists() {
            return Ok(None);
        }
        let map: Map = persist::read_json(&path)?;
        Ok(Some(map))
    }

    pub(crate) fn document_path(data_dir: &Path, name: &str) -> PathBuf {
        data_dir.join("maps").join(format!("{name}.json"))
    }
}
