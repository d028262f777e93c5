//! The two projected coordinate systems used across regions.
//!
//! Every region publishes its data in one of two UTM zones. Tile footprints
//! are stored uniformly in zone 32, so zone-33 geometry is transferred via
//! geographic coordinates using the transverse Mercator pair.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::utm::TransverseMercator;

/// UTM zone of a region's native coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtmZone {
    Utm32,
    Utm33,
}

impl UtmZone {
    /// Zone number, used as the leading component of tile ids.
    pub fn code(&self) -> u32 {
        match self {
            UtmZone::Utm32 => 32,
            UtmZone::Utm33 => 33,
        }
    }

    /// EPSG code of the projected CRS (ETRS89 / UTM).
    pub fn epsg(&self) -> u32 {
        match self {
            UtmZone::Utm32 => 25832,
            UtmZone::Utm33 => 25833,
        }
    }

    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            25832 => Some(UtmZone::Utm32),
            25833 => Some(UtmZone::Utm33),
            _ => None,
        }
    }

    /// Central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        match self {
            UtmZone::Utm32 => 9.0,
            UtmZone::Utm33 => 15.0,
        }
    }

    pub fn projection(&self) -> TransverseMercator {
        TransverseMercator::utm(self.central_meridian())
    }
}

impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Transfer a projected point from one zone to another.
pub fn reproject_point(from: UtmZone, to: UtmZone, easting: f64, northing: f64) -> (f64, f64) {
    if from == to {
        return (easting, northing);
    }
    let (lat, lon) = from.projection().inverse(easting, northing);
    to.projection().forward(lat, lon)
}

/// Transfer a polygon between zones, holes included.
pub fn reproject_polygon(from: UtmZone, to: UtmZone, polygon: &Polygon<f64>) -> Polygon<f64> {
    if from == to {
        return polygon.clone();
    }
    let reproject_ring = |ring: &LineString<f64>| {
        LineString::from(
            ring.coords()
                .map(|c| {
                    let (x, y) = reproject_point(from, to, c.x, c.y);
                    Coord { x, y }
                })
                .collect::<Vec<_>>(),
        )
    };
    Polygon::new(
        reproject_ring(polygon.exterior()),
        polygon.interiors().iter().map(reproject_ring).collect(),
    )
}

/// Transfer a multi-polygon between zones.
pub fn reproject_multi_polygon(
    from: UtmZone,
    to: UtmZone,
    multi: &MultiPolygon<f64>,
) -> MultiPolygon<f64> {
    if from == to {
        return multi.clone();
    }
    MultiPolygon(
        multi
            .0
            .iter()
            .map(|p| reproject_polygon(from, to, p))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_codes() {
        assert_eq!(UtmZone::Utm32.code(), 32);
        assert_eq!(UtmZone::Utm33.epsg(), 25833);
        assert_eq!(UtmZone::from_epsg(25832), Some(UtmZone::Utm32));
        assert_eq!(UtmZone::from_epsg(4326), None);
    }

    #[test]
    fn test_cross_zone_roundtrip() {
        // A point near the 32/33 overlap (lon ~12E).
        let (e32, n32) = UtmZone::Utm32.projection().forward(51.5, 12.1);
        let (e33, n33) = reproject_point(UtmZone::Utm32, UtmZone::Utm33, e32, n32);
        // In zone 33 the same point lies west of the central meridian.
        assert!(e33 < 500_000.0);
        let (back_e, back_n) = reproject_point(UtmZone::Utm33, UtmZone::Utm32, e33, n33);
        assert!((back_e - e32).abs() < 0.01, "easting {e32} vs {back_e}");
        assert!((back_n - n32).abs() < 0.01, "northing {n32} vs {back_n}");
    }

    #[test]
    fn test_same_zone_is_identity() {
        let (e, n) = reproject_point(UtmZone::Utm32, UtmZone::Utm32, 500_000.0, 5_700_000.0);
        assert_eq!((e, n), (500_000.0, 5_700_000.0));
    }

    #[test]
    fn test_polygon_reprojection_preserves_shape() {
        let square = Polygon::new(
            LineString::from(vec![
                (700_000.0, 5_700_000.0),
                (701_000.0, 5_700_000.0),
                (701_000.0, 5_701_000.0),
                (700_000.0, 5_701_000.0),
                (700_000.0, 5_700_000.0),
            ]),
            vec![],
        );
        let transferred = reproject_polygon(UtmZone::Utm32, UtmZone::Utm33, &square);
        let back = reproject_polygon(UtmZone::Utm33, UtmZone::Utm32, &transferred);
        for (a, b) in square.exterior().coords().zip(back.exterior().coords()) {
            assert!((a.x - b.x).abs() < 0.01);
            assert!((a.y - b.y).abs() < 0.01);
        }
    }
}
