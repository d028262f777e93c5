//! Registry seeding: AOI x region boundary -> canonical tile lists.

use geo::{BooleanOps, Intersects};
use harvest_common::{HarvestResult, Tile};
use projection::{reproject_point, UtmZone};
use tile_grid::{partition, tile_from_id, Aoi, Region, TileCandidate, TilingConvention};
use tracing::{debug, info};

/// Generate the tile list for one region.
///
/// The AOI (kept in UTM32) is moved into the region's native zone, clipped
/// against the region boundary and partitioned on the region's lattice. Each
/// candidate is checked against the boundary a second time because the
/// clipped area's bounding lattice can reach cells outside the region.
/// Footprints are stored uniformly in UTM32.
pub fn region_tiles(
    aoi: &Aoi,
    region: &Region,
    convention: &TilingConvention,
) -> HarvestResult<Vec<Tile>> {
    convention.validate()?;

    let aoi_in_zone = if region.zone == UtmZone::Utm32 {
        aoi.geometry.clone()
    } else {
        projection::reproject_multi_polygon(UtmZone::Utm32, region.zone, &aoi.geometry)
    };

    let clipped = aoi_in_zone.intersection(&region.boundary);
    let candidates = partition(&clipped, convention, region.zone);

    let tiles: Vec<Tile> = candidates
        .into_iter()
        .filter(|candidate| candidate.polygon().intersects(&region.boundary))
        .map(|candidate| to_tile(candidate, region.zone))
        .collect();

    if tiles.is_empty() {
        debug!(region = %region.name, "AOI does not reach this region");
    } else {
        info!(region = %region.name, tiles = tiles.len(), "Generated tile grid");
    }
    Ok(tiles)
}

/// Build tiles from an explicit id list instead of a polygon.
pub fn tiles_from_ids(ids: &[String], convention: &TilingConvention) -> HarvestResult<Vec<Tile>> {
    convention.validate()?;
    ids.iter()
        .map(|id| {
            let candidate = tile_from_id(id, convention)?;
            let zone = if id.starts_with("33") {
                UtmZone::Utm33
            } else {
                UtmZone::Utm32
            };
            Ok(to_tile(candidate, zone))
        })
        .collect()
}

fn to_tile(candidate: TileCandidate, zone: UtmZone) -> Tile {
    let footprint = candidate
        .footprint
        .iter()
        .map(|&(x, y)| reproject_point(zone, UtmZone::Utm32, x, y))
        .collect();
    Tile::new(candidate.id, footprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};

    fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (min_x + size, min_y),
                (min_x + size, min_y + size),
                (min_x, min_y + size),
                (min_x, min_y),
            ]),
            vec![],
        )])
    }

    #[test]
    fn test_region_tiles_clip_to_boundary() {
        // AOI spans 3x3 km but the region boundary only covers the west
        // half, so the eastern tile column must not be generated.
        let aoi = Aoi::from_geometry("survey", square(488_000.0, 5_478_000.0, 2_500.0));
        let region = Region {
            name: "Weststaat".to_string(),
            zone: UtmZone::Utm32,
            boundary: square(487_000.0, 5_477_000.0, 2_500.0),
        };
        let convention = TilingConvention::new(1000.0, 0.0, 0.0);

        let tiles = region_tiles(&aoi, &region, &convention).unwrap();
        let ids: Vec<_> = tiles.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&"32_488_5478"));
        assert!(ids.contains(&"32_489_5478"));
        assert!(!ids.contains(&"32_490_5478"));
    }

    #[test]
    fn test_region_tiles_outside_boundary_is_empty() {
        let aoi = Aoi::from_geometry("survey", square(100_000.0, 5_400_000.0, 2_000.0));
        let region = Region {
            name: "Oststaat".to_string(),
            zone: UtmZone::Utm32,
            boundary: square(700_000.0, 5_900_000.0, 50_000.0),
        };
        let convention = TilingConvention::new(1000.0, 0.0, 0.0);

        let tiles = region_tiles(&aoi, &region, &convention).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_utm33_footprints_are_stored_in_utm32() {
        let tiles = tiles_from_ids(
            &["33_401_5802".to_string()],
            &TilingConvention::new(1000.0, 0.0, 0.0),
        )
        .unwrap();
        let (x, _) = tiles[0].footprint[0];
        // UTM33 401km east lands far east of the 500km false easting when
        // expressed in UTM32 coordinates.
        assert!(x > 700_000.0);
    }

    #[test]
    fn test_tiles_from_ids_rejects_malformed() {
        let convention = TilingConvention::new(1000.0, 0.0, 0.0);
        assert!(tiles_from_ids(&["garbage".to_string()], &convention).is_err());
    }

    #[test]
    fn test_tiles_from_ids_preserves_order_and_ids() {
        let ids = vec!["32_488_5478".to_string(), "32_489_5478".to_string()];
        let tiles = tiles_from_ids(&ids, &TilingConvention::new(1000.0, 0.0, 0.0)).unwrap();
        let got: Vec<_> = tiles.iter().map(|t| t.id.clone()).collect();
        assert_eq!(got, ids);
    }
}
