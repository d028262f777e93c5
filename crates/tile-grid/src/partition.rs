//! Lattice generation and intersection filtering.

use geo::{Area, BoundingRect, Intersects, LineString, MultiPolygon, Polygon};
use harvest_common::{HarvestError, HarvestResult};
use projection::UtmZone;

use crate::convention::TilingConvention;

/// A candidate grid cell produced by partitioning, before registry seeding.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCandidate {
    pub id: String,
    /// Square footprint in the region's native zone: 4 corners, open ring.
    pub footprint: Vec<(f64, f64)>,
}

impl TileCandidate {
    /// Closed-ring polygon for geometry tests.
    pub fn polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.footprint.clone()), vec![])
    }
}

/// Deterministic tile id from zone and lower-left corner coordinates.
///
/// The id is a pure function of the cell: `{zone}_{x_km:03}_{y_km:04}` with
/// kilometer indices floored, so re-running partitioning always reproduces
/// the same ids.
pub fn tile_id(zone: UtmZone, x: f64, y: f64) -> String {
    format!(
        "{}_{:03}_{:04}",
        zone.code(),
        (x / 1000.0).floor() as i64,
        (y / 1000.0).floor() as i64
    )
}

/// Reconstruct a candidate from its id (used for explicit tile-list input).
pub fn tile_from_id(id: &str, convention: &TilingConvention) -> HarvestResult<TileCandidate> {
    let mut parts = id.split('_');
    let (Some(zone), Some(x_km), Some(y_km), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HarvestError::Format(format!("malformed tile id: {id}")));
    };
    let _zone: u32 = zone
        .parse()
        .map_err(|_| HarvestError::Format(format!("malformed tile id: {id}")))?;
    let x: f64 = x_km
        .parse::<i64>()
        .map_err(|_| HarvestError::Format(format!("malformed tile id: {id}")))? as f64
        * 1000.0;
    let y: f64 = y_km
        .parse::<i64>()
        .map_err(|_| HarvestError::Format(format!("malformed tile id: {id}")))? as f64
        * 1000.0;
    let size = convention.tile_size;
    Ok(TileCandidate {
        id: id.to_string(),
        footprint: square_corners(x, y, size),
    })
}

fn square_corners(x: f64, y: f64, size: f64) -> Vec<(f64, f64)> {
    vec![(x, y), (x + size, y), (x + size, y + size), (x, y + size)]
}

fn closed_square(x: f64, y: f64, size: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (x, y),
            (x + size, y),
            (x + size, y + size),
            (x, y + size),
            (x, y),
        ]),
        vec![],
    )
}

/// Partition an area into lattice-aligned candidate tiles.
///
/// Generates tile-size-spaced lattice coordinates from one step before the
/// area's bounding box to one step after (shifted by the convention origin),
/// and keeps every cell whose square footprint intersects the area. Partial
/// overlap qualifies; a degenerate or empty area yields no tiles.
pub fn partition(
    area: &MultiPolygon<f64>,
    convention: &TilingConvention,
    zone: UtmZone,
) -> Vec<TileCandidate> {
    if area.0.is_empty() || area.unsigned_area() == 0.0 {
        return Vec::new();
    }
    let Some(bounds) = area.bounding_rect() else {
        return Vec::new();
    };

    let size = convention.tile_size;
    let start_x = (bounds.min().x / size).floor() * size - convention.origin_x;
    let end_x = (bounds.max().x / size).ceil() * size + convention.origin_x;
    let start_y = (bounds.min().y / size).floor() * size - convention.origin_y;
    let end_y = (bounds.max().y / size).ceil() * size + convention.origin_y;

    let nx = ((end_x - start_x) / size).ceil() as i64;
    let ny = ((end_y - start_y) / size).ceil() as i64;

    let mut tiles = Vec::new();
    for i in 0..nx {
        let x = start_x + i as f64 * size;
        for j in 0..ny {
            let y = start_y + j as f64 * size;
            if closed_square(x, y, size).intersects(area) {
                tiles.push(TileCandidate {
                    id: tile_id(zone, x, y),
                    footprint: square_corners(x, y, size),
                });
            }
        }
    }
    tiles
}
