//! Schema-typed feature storage.
//!
//! A [`DataStore`] is a named directory of feature classes; each class
//! persists as one JSON document and is rebuilt (spatial index included)
//! when the store is opened.

pub mod class;
pub mod feature;
pub mod schema;

use crate::core::crs::SpatialReference;
use crate::persist;
use crate::prelude::HashMap;
use crate::store::class::{ClassDocument, FeatureClass};
use crate::store::feature::GeometryType;
use crate::store::schema::Field;
use crate::{MapError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Shared handle to a feature class. One writer at a time; counts and
/// rendering reads take read guards concurrently.
pub type SharedFeatureClass = Arc<RwLock<FeatureClass>>;

/// A named collection of feature classes rooted at one directory.
pub struct DataStore {
    name: String,
    dir: PathBuf,
    classes: RwLock<HashMap<String, SharedFeatureClass>>,
}

impl DataStore {
    /// Opens the store at `<data_dir>/<name>/`, loading every persisted
    /// feature class found there.
    pub fn open(data_dir: &Path, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let dir = data_dir.join(&name);
        fs::create_dir_all(&dir)?;

        let mut classes = HashMap::default();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let doc: ClassDocument = persist::read_json(&path)?;
            let class = FeatureClass::from_document(doc)?;
            log::debug!(
                "store {:?}: loaded class {:?} ({} features)",
                name,
                class.name(),
                class.len()
            );
            classes.insert(class.name().to_string(), Arc::new(RwLock::new(class)));
        }
        log::info!("opened store {:?} with {} classes", name, classes.len());

        Ok(Self {
            name,
            dir,
            classes: RwLock::new(classes),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a feature class and persists its (empty) document.
    pub fn create_feature_class(
        &self,
        name: &str,
        geometry_type: GeometryType,
        srs: SpatialReference,
        fields: Vec<Field>,
    ) -> Result<SharedFeatureClass> {
        let mut classes = self.classes.write().unwrap();
        if classes.contains_key(name) {
            return Err(MapError::AlreadyExists(format!(
                "feature class {name:?} in store {:?}",
                self.name
            )));
        }
        let class = FeatureClass::new(name, geometry_type, srs, fields)?;
        persist::write_json_atomic(&self.class_path(name), &class.to_document())?;
        let shared = Arc::new(RwLock::new(class));
        classes.insert(name.to_string(), shared.clone());
        Ok(shared)
    }

    /// Looks up a feature class by name.
    pub fn child(&self, name: &str) -> Option<SharedFeatureClass> {
        self.classes.read().unwrap().get(name).cloned()
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Persists one class, atomically replacing its document.
    pub fn save_class(&self, name: &str) -> Result<()> {
        let class = self.child(name).ok_or_else(|| {
            MapError::NotFound(format!("feature class {name:?} in store {:?}", self.name))
        })?;
        let doc = class.read().unwrap().to_document();
        persist::write_json_atomic(&self.class_path(name), &doc)
    }

    /// Persists every class in the store.
    pub fn save(&self) -> Result<()> {
        for name in self.class_names() {
            self.save_class(&name)?;
        }
        Ok(())
    }

    fn class_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Point;
    use crate::store::feature::Geometry;
    use crate::store::schema::{FieldKind, FieldValue};
    use tempfile::TempDir;

    fn point_fields() -> Vec<Field> {
        vec![
            Field::new("long", FieldKind::Real),
            Field::new("lat", FieldKind::Real),
            Field::new("datetime", FieldKind::Date),
            Field::new("name", FieldKind::String),
        ]
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path(), "store").unwrap();

        store
            .create_feature_class(
                "points",
                GeometryType::Point,
                SpatialReference::WebMercator,
                point_fields(),
            )
            .unwrap();

        assert!(store.child("points").is_some());
        assert!(store.child("lines").is_none());
        assert!(matches!(
            store.create_feature_class(
                "points",
                GeometryType::Point,
                SpatialReference::WebMercator,
                point_fields(),
            ),
            Err(MapError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = DataStore::open(dir.path(), "store").unwrap();
            let class = store
                .create_feature_class(
                    "points",
                    GeometryType::Point,
                    SpatialReference::WebMercator,
                    point_fields(),
                )
                .unwrap();

            let mut guard = class.write().unwrap();
            let mut feature = guard.create_feature();
            feature.geometry = Some(Geometry::Point(Point::new(100.0, 200.0)));
            guard
                .set_value(&mut feature, "name", FieldValue::String("a".into()))
                .unwrap();
            guard.insert(feature).unwrap();
            drop(guard);
            store.save().unwrap();
        }

        let reopened = DataStore::open(dir.path(), "store").unwrap();
        let class = reopened.child("points").unwrap();
        let guard = class.read().unwrap();
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.fields().len(), 4);
    }
}
