//! Prelude module for common mapstore types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use mapstore::prelude::*;`

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

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::{Arc, Mutex, RwLock, Weak},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
