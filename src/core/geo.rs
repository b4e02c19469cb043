use crate::core::crs::SpatialReference;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Represents a point in projected or geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Axis-aligned bounding rectangle in a specific spatial reference.
///
/// `min <= max` holds on both axes for every constructed envelope;
/// comparisons against an envelope in another reference require an
/// explicit [`Envelope::to_srs`] first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: Point,
    pub max: Point,
    pub srs: SpatialReference,
}

impl Envelope {
    /// Creates an envelope, rejecting inverted bounds.
    pub fn new(min: Point, max: Point, srs: SpatialReference) -> Result<Self> {
        if min.x > max.x || min.y > max.y {
            return Err(MapError::InvalidSchema(format!(
                "inverted envelope bounds: ({}, {})..({}, {})",
                min.x, min.y, max.x, max.y
            )));
        }
        Ok(Self { min, max, srs })
    }

    /// Creates an envelope from individual coordinates.
    pub fn from_coords(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        srs: SpatialReference,
    ) -> Result<Self> {
        Self::new(Point::new(min_x, min_y), Point::new(max_x, max_y), srs)
    }

    /// Full Web Mercator extent, the limit used by global tile sets.
    pub fn web_mercator_extent() -> Self {
        Self {
            min: Point::new(-20037508.34, -20037508.34),
            max: Point::new(20037508.34, 20037508.34),
            srs: SpatialReference::WebMercator,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// Checks if the envelope contains a point. Same-reference operands only.
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Checks if the envelope intersects another envelope in the same reference.
    pub fn intersects(&self, other: &Envelope) -> bool {
        debug_assert_eq!(self.srs, other.srs);
        !(other.max.x < self.min.x
            || other.min.x > self.max.x
            || other.max.y < self.min.y
            || other.min.y > self.max.y)
    }

    /// Extends the envelope to include a point.
    pub fn extend(&mut self, point: &Point) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// Reprojects the envelope into the target reference by transforming
    /// both corners.
    pub fn to_srs(&self, target: SpatialReference) -> Result<Envelope> {
        if self.srs == target {
            return Ok(*self);
        }
        let min = crate::core::crs::transform(self.min, self.srs, target)?;
        let max = crate::core::crs::transform(self.max, self.srs, target)?;
        Envelope::new(min, max, target)
    }
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Checks if the tile lies inside the grid for its zoom level.
    pub fn is_valid(&self) -> bool {
        let max_coord = 2_u32.pow(self.z as u32);
        self.x < max_coord && self.y < max_coord
    }

    /// Gets the tile's bounds in Web Mercator.
    pub fn envelope(&self) -> Envelope {
        let world = 2.0 * PI * crate::core::crs::EARTH_RADIUS;
        let n = 2_f64.powi(self.z as i32);
        let tile_span = world / n;
        let origin = -world / 2.0;

        let min_x = origin + self.x as f64 * tile_span;
        let max_y = -origin - self.y as f64 * tile_span;
        Envelope {
            min: Point::new(min_x, max_y - tile_span),
            max: Point::new(min_x + tile_span, max_y),
            srs: SpatialReference::WebMercator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_rejects_inverted_bounds() {
        let err = Envelope::from_coords(10.0, 0.0, -10.0, 5.0, SpatialReference::Wgs84);
        assert!(err.is_err());
    }

    #[test]
    fn test_envelope_contains() {
        let env =
            Envelope::from_coords(40.0, -75.0, 41.0, -73.0, SpatialReference::Wgs84).unwrap();
        assert!(env.contains(&Point::new(40.5, -74.0)));
        assert!(!env.contains(&Point::new(42.0, -74.0)));
    }

    #[test]
    fn test_envelope_intersects() {
        let a = Envelope::from_coords(0.0, 0.0, 10.0, 10.0, SpatialReference::Wgs84).unwrap();
        let b = Envelope::from_coords(5.0, 5.0, 15.0, 15.0, SpatialReference::Wgs84).unwrap();
        let c = Envelope::from_coords(11.0, 11.0, 12.0, 12.0, SpatialReference::Wgs84).unwrap();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_tile_coord_validity() {
        assert!(TileCoord::new(0, 0, 0).is_valid());
        assert!(TileCoord::new(3, 3, 2).is_valid());
        assert!(!TileCoord::new(4, 0, 2).is_valid());
    }

    #[test]
    fn test_tile_envelope_covers_world_at_zero() {
        let env = TileCoord::new(0, 0, 0).envelope();
        assert!((env.width() - 2.0 * PI * crate::core::crs::EARTH_RADIUS).abs() < 1.0);
        assert!((env.center().x).abs() < 1e-6);
        assert!((env.center().y).abs() < 1e-6);
    }
}
