use crate::core::geo::Point;
use crate::store::schema::FieldValue;
use serde::{Deserialize, Serialize};

/// Geometry kind shared by every feature in a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    Polygon,
}

/// A feature geometry. Coordinates are in the owning class's spatial
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "snake_case")]
pub enum Geometry {
    Point(Point),
    MultiPoint(Vec<Point>),
    LineString(Vec<Point>),
    Polygon(Vec<Point>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
        }
    }

    /// Axis-aligned bounds as raw corner coordinates, or `None` for an
    /// empty coordinate list.
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        let points: &[Point] = match self {
            Geometry::Point(p) => std::slice::from_ref(p),
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) | Geometry::Polygon(ps) => ps,
        };
        let first = points.first()?;
        let mut min = [first.x, first.y];
        let mut max = [first.x, first.y];
        for p in points {
            min[0] = min[0].min(p.x);
            min[1] = min[1].min(p.y);
            max[0] = max[0].max(p.x);
            max[1] = max[1].max(p.y);
        }
        Some((min, max))
    }
}

/// One record of a feature class: an identity, an optional geometry and a
/// value slot per schema field.
///
/// Created through `FeatureClass::create_feature`, which sizes the slots
/// to the schema; destroyed only via an explicit delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    id: i64,
    pub geometry: Option<Geometry>,
    values: Vec<Option<FieldValue>>,
}

impl Feature {
    pub(crate) fn new(id: i64, field_count: usize) -> Self {
        Self {
            id,
            geometry: None,
            values: vec![None; field_count],
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn values(&self) -> &[Option<FieldValue>] {
        &self.values
    }

    /// Value at a schema slot.
    pub fn value(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index).and_then(|v| v.as_ref())
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: FieldValue) {
        self.values[index] = Some(value);
    }
}
