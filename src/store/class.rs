use crate::core::crs::SpatialReference;
use crate::core::geo::Envelope;
use crate::store::feature::{Feature, Geometry, GeometryType};
use crate::store::schema::{validate_fields, Field, FieldValue};
use crate::{MapError, Result};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// R-tree entry: a feature id with its geometry's bounding box.
#[derive(Debug, Clone, PartialEq)]
struct IndexedGeometry {
    id: i64,
    min: [f64; 2],
    max: [f64; 2],
}

impl RTreeObject for IndexedGeometry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// A named collection of features sharing one schema and geometry type.
///
/// Owns a spatial index over feature geometries and an optional active
/// filter that narrows `count` and iteration until cleared. The filter is
/// state of this instance, not of the feature data.
#[derive(Debug)]
pub struct FeatureClass {
    name: String,
    geometry_type: GeometryType,
    srs: SpatialReference,
    fields: Vec<Field>,
    features: BTreeMap<i64, Feature>,
    next_id: i64,
    index: RTree<IndexedGeometry>,
    filter: Option<Envelope>,
}

/// Serializable form of a feature class; the index is rebuilt on load.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ClassDocument {
    name: String,
    geometry_type: GeometryType,
    srs: SpatialReference,
    fields: Vec<Field>,
    next_id: i64,
    features: Vec<Feature>,
}

impl FeatureClass {
    pub fn new(
        name: impl Into<String>,
        geometry_type: GeometryType,
        srs: SpatialReference,
        fields: Vec<Field>,
    ) -> Result<Self> {
        validate_fields(&fields)?;
        Ok(Self {
            name: name.into(),
            geometry_type,
            srs,
            fields,
            features: BTreeMap::new(),
            next_id: 1,
            index: RTree::new(),
            filter: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn srs(&self) -> SpatialReference {
        self.srs
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Allocates a feature with an identity unique within this class.
    /// Geometry and fields start unset; the record exists in the class
    /// only after [`FeatureClass::insert`].
    pub fn create_feature(&mut self) -> Feature {
        let id = self.next_id;
        self.next_id += 1;
        Feature::new(id, self.fields.len())
    }

    /// Sets a field value by name, checking the kind against the schema.
    pub fn set_value(
        &self,
        feature: &mut Feature,
        field: &str,
        value: FieldValue,
    ) -> Result<()> {
        let index = self
            .field_index(field)
            .ok_or_else(|| MapError::NotFound(format!("field {field:?} in {:?}", self.name)))?;
        let expected = self.fields[index].kind;
        if value.kind() != expected {
            return Err(MapError::SchemaMismatch(format!(
                "field {field:?} is {expected}, got {}",
                value.kind()
            )));
        }
        feature.set_slot(index, value);
        Ok(())
    }

    /// Inserts a feature, validating it against the schema.
    ///
    /// Partial records are allowed: an unset field is filled from its
    /// default when one exists, and only non-nullable fields without a
    /// default reject the record.
    pub fn insert(&mut self, mut feature: Feature) -> Result<i64> {
        if feature.values().len() != self.fields.len() {
            return Err(MapError::SchemaMismatch(format!(
                "feature carries {} values, schema has {} fields",
                feature.values().len(),
                self.fields.len()
            )));
        }
        if self.features.contains_key(&feature.id()) {
            return Err(MapError::AlreadyExists(format!(
                "feature {} in {:?}",
                feature.id(),
                self.name
            )));
        }
        if let Some(geometry) = &feature.geometry {
            if geometry.geometry_type() != self.geometry_type {
                return Err(MapError::SchemaMismatch(format!(
                    "class {:?} stores {:?} geometries, got {:?}",
                    self.name,
                    self.geometry_type,
                    geometry.geometry_type()
                )));
            }
        }
        for (i, field) in self.fields.iter().enumerate() {
            match feature.value(i) {
                Some(value) => {
                    if value.kind() != field.kind {
                        return Err(MapError::SchemaMismatch(format!(
                            "field {:?} is {}, got {}",
                            field.name,
                            field.kind,
                            value.kind()
                        )));
                    }
                }
                None => {
                    if let Some(default) = &field.default {
                        feature.set_slot(i, default.clone());
                    } else if !field.nullable {
                        return Err(MapError::SchemaMismatch(format!(
                            "non-nullable field {:?} is unset",
                            field.name
                        )));
                    }
                }
            }
        }

        let id = feature.id();
        if let Some(entry) = Self::index_entry(&feature) {
            self.index.insert(entry);
        }
        self.features.insert(id, feature);
        Ok(id)
    }

    /// Removes a feature. Records leave the class only through this call.
    pub fn delete(&mut self, id: i64) -> Result<Feature> {
        let feature = self
            .features
            .remove(&id)
            .ok_or_else(|| MapError::NotFound(format!("feature {id} in {:?}", self.name)))?;
        if let Some(entry) = Self::index_entry(&feature) {
            self.index.remove(&entry);
        }
        Ok(feature)
    }

    pub fn feature(&self, id: i64) -> Option<&Feature> {
        self.features.get(&id)
    }

    /// Restricts subsequent counts and iteration to features whose
    /// geometry intersects `envelope`. The envelope is reprojected into
    /// this class's reference when needed; the latest filter always
    /// replaces the previous one.
    pub fn set_spatial_filter(&mut self, envelope: Envelope) -> Result<()> {
        self.filter = Some(envelope.to_srs(self.srs)?);
        Ok(())
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn filter(&self) -> Option<&Envelope> {
        self.filter.as_ref()
    }

    /// Cardinality honoring the active filter.
    ///
    /// The filtered path is an index scan; it never walks the full
    /// feature table.
    pub fn count(&self) -> usize {
        match &self.filter {
            Some(envelope) => self
                .index
                .locate_in_envelope_intersecting(&Self::query_aabb(envelope))
                .count(),
            None => self.features.len(),
        }
    }

    /// Features honoring the active filter, ordered by id.
    pub fn features(&self) -> Vec<&Feature> {
        match &self.filter {
            Some(envelope) => {
                let mut ids: Vec<i64> = self
                    .index
                    .locate_in_envelope_intersecting(&Self::query_aabb(envelope))
                    .map(|entry| entry.id)
                    .collect();
                ids.sort_unstable();
                ids.iter().filter_map(|id| self.features.get(id)).collect()
            }
            None => self.features.values().collect(),
        }
    }

    /// Total number of stored features, ignoring any filter.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn index_entry(feature: &Feature) -> Option<IndexedGeometry> {
        let geometry = feature.geometry.as_ref()?;
        let (min, max) = geometry.bounds()?;
        Some(IndexedGeometry {
            id: feature.id(),
            min,
            max,
        })
    }

    fn query_aabb(envelope: &Envelope) -> AABB<[f64; 2]> {
        AABB::from_corners(
            [envelope.min.x, envelope.min.y],
            [envelope.max.x, envelope.max.y],
        )
    }

    pub(crate) fn to_document(&self) -> ClassDocument {
        ClassDocument {
            name: self.name.clone(),
            geometry_type: self.geometry_type,
            srs: self.srs,
            fields: self.fields.clone(),
            next_id: self.next_id,
            features: self.features.values().cloned().collect(),
        }
    }

    pub(crate) fn from_document(doc: ClassDocument) -> Result<Self> {
        let mut class = Self::new(doc.name, doc.geometry_type, doc.srs, doc.fields)?;
        for feature in doc.features {
            if let Some(entry) = Self::index_entry(&feature) {
                class.index.insert(entry);
            }
            class.features.insert(feature.id(), feature);
        }
        class.next_id = doc.next_id;
        Ok(class)
    }
}
