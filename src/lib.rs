//! # mapstore
//!
//! A tiled map composition and feature store engine.
//!
//! This library provides the backing core for a map client: named maps
//! composed of ordered vector and tile layers, a schema-typed feature
//! store with spatial filtering, an expiring tile cache over remote TMS
//! sources, and a background task coordinator for downloads and
//! viewport-driven recounts. Rendering and input handling are left to an
//! external collaborator that pulls tiles and layer data on demand.

pub mod background;
pub mod context;
pub mod core;
pub mod layers;
pub mod store;
pub mod tiles;

pub(crate) mod persist;
pub mod prelude;

// Re-export public API
pub use crate::core::{
    crs::{transform, SpatialReference},
    geo::{Envelope, Point, TileCoord},
    map::{Map, MapOptions, SharedMap},
};

pub use crate::layers::{
    layer::{Layer, LayerId, LayerSource},
    style::{Style, StyleValue},
};

pub use crate::store::{
    class::FeatureClass,
    feature::{Feature, Geometry, GeometryType},
    schema::{Field, FieldKind, FieldValue},
    DataStore, SharedFeatureClass,
};

pub use crate::tiles::{
    cache::TileCache,
    source::{HttpFetcher, TileFetcher, TileSource, TmsConfig},
};

pub use crate::background::{
    debounce::Debouncer,
    download::{TaskEvent, TaskHandle, TaskState},
    tasks::TaskCoordinator,
};

pub use crate::context::MapContext;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("unsupported spatial reference: EPSG:{0}")]
    UnsupportedReference(u32),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Error type alias for convenience
pub type Error = MapError;
