use crate::core::geo::Point;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Web Mercator projection constants
pub(crate) const EARTH_RADIUS: f64 = 6378137.0;
const MAX_LATITUDE: f64 = 85.0511287798;

/// A coordinate system known to the engine, identified by its EPSG code.
///
/// Immutable once constructed; carries everything needed to convert
/// coordinates to and from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialReference {
    /// Geographic WGS 84 (EPSG:4326), x = longitude, y = latitude.
    Wgs84,
    /// Spherical Web Mercator (EPSG:3857), meters.
    WebMercator,
}

impl SpatialReference {
    /// Resolves an EPSG authority code.
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 => Ok(Self::Wgs84),
            3857 => Ok(Self::WebMercator),
            other => Err(MapError::UnsupportedReference(other)),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
        }
    }
}

impl std::fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Transforms a point between two spatial references.
///
/// Deterministic and pure; latitude is clamped to the Mercator-safe range
/// before projecting.
pub fn transform(point: Point, from: SpatialReference, to: SpatialReference) -> Result<Point> {
    use SpatialReference::*;
    match (from, to) {
        (Wgs84, Wgs84) | (WebMercator, WebMercator) => Ok(point),
        (Wgs84, WebMercator) => {
            let lat = point.y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
            let x = point.x.to_radians() * EARTH_RADIUS;
            let y = ((PI / 4.0 + lat.to_radians() / 2.0).tan().ln()) * EARTH_RADIUS;
            Ok(Point::new(x, y))
        }
        (WebMercator, Wgs84) => {
            let lng = (point.x / EARTH_RADIUS).to_degrees();
            let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
            Ok(Point::new(lng, lat))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_epsg() {
        assert_eq!(
            SpatialReference::from_epsg(3857).unwrap(),
            SpatialReference::WebMercator
        );
        assert_eq!(
            SpatialReference::from_epsg(4326).unwrap(),
            SpatialReference::Wgs84
        );
        assert!(matches!(
            SpatialReference::from_epsg(32633),
            Err(MapError::UnsupportedReference(32633))
        ));
    }

    #[test]
    fn test_transform_round_trip() {
        let moscow = Point::new(37.6173, 55.7558);
        let projected = transform(
            moscow,
            SpatialReference::Wgs84,
            SpatialReference::WebMercator,
        )
        .unwrap();
        let back = transform(
            projected,
            SpatialReference::WebMercator,
            SpatialReference::Wgs84,
        )
        .unwrap();

        assert!((back.x - moscow.x).abs() < 1e-6);
        assert!((back.y - moscow.y).abs() < 1e-6);
    }

    #[test]
    fn test_transform_known_value() {
        // Prime meridian at the equator projects to the Mercator origin.
        let origin = transform(
            Point::new(0.0, 0.0),
            SpatialReference::Wgs84,
            SpatialReference::WebMercator,
        )
        .unwrap();
        assert!(origin.x.abs() < 1e-6);
        assert!(origin.y.abs() < 1e-6);

        // The antimeridian lands on the edge of the Web Mercator extent.
        let edge = transform(
            Point::new(180.0, 0.0),
            SpatialReference::Wgs84,
            SpatialReference::WebMercator,
        )
        .unwrap();
        assert!((edge.x - 20037508.34).abs() < 1.0);
    }

    #[test]
    fn test_transform_identity() {
        let p = Point::new(12.5, -3.25);
        let same = transform(p, SpatialReference::Wgs84, SpatialReference::Wgs84).unwrap();
        assert_eq!(same, p);
    }
}
