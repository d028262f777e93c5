//! GeoJSON export of a registry for inspection in GIS tools.

use std::fs;
use std::path::Path;

use harvest_common::geojson::{Feature, FeatureCollection, Geometry};
use harvest_common::HarvestResult;
use serde_json::{Map, Value};
use tracing::info;

use crate::TileRegistry;

/// One feature per tile, footprints in the registry's output CRS (UTM32).
pub fn to_feature_collection(registry: &TileRegistry) -> FeatureCollection {
    let mut collection = FeatureCollection::new().with_epsg(25832);
    for (region, tiles) in &registry.regions {
        for tile in &tiles.tile_list {
            let mut ring: Vec<[f64; 2]> = tile.footprint.iter().map(|&(x, y)| [x, y]).collect();
            if let Some(&first) = ring.first() {
                ring.push(first);
            }
            let geometry = Geometry::Polygon {
                coordinates: vec![ring],
            };

            let mut properties = Map::new();
            properties.insert("tile_name".to_string(), Value::from(tile.id.as_str()));
            properties.insert("region".to_string(), Value::from(region.as_str()));
            properties.insert("status".to_string(), Value::from(tile.status.as_str()));
            properties.insert(
                "timestamp".to_string(),
                tile.timestamp
                    .map(|d| Value::from(d.to_string()))
                    .unwrap_or(Value::Null),
            );
            properties.insert(
                "location".to_string(),
                tile.location.clone().map(Value::from).unwrap_or(Value::Null),
            );
            properties.insert(
                "format".to_string(),
                tile.format.clone().map(Value::from).unwrap_or(Value::Null),
            );

            collection.features.push(Feature::new(geometry, properties));
        }
    }
    collection
}

pub fn export_geojson(registry: &TileRegistry, path: &Path) -> HarvestResult<()> {
    let collection = to_feature_collection(registry);
    fs::write(path, serde_json::to_vec_pretty(&collection)?)?;
    info!(
        path = %path.display(),
        features = collection.features.len(),
        "Exported registry as GeoJSON"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegionTiles;
    use harvest_common::{Tile, TileStatus};
    use std::collections::BTreeMap;

    fn sample_registry() -> TileRegistry {
        let mut tile = Tile::new(
            "32_488_5478",
            vec![
                (488000.0, 5478000.0),
                (489000.0, 5478000.0),
                (489000.0, 5479000.0),
                (488000.0, 5479000.0),
            ],
        );
        tile.status = TileStatus::Uploaded;
        tile.location = Some("s3://bucket/dop/32_488_5478".to_string());
        let mut regions = BTreeMap::new();
        regions.insert(
            "Hessen".to_string(),
            RegionTiles {
                data_type: "dop".to_string(),
                tile_list: vec![tile],
            },
        );
        TileRegistry {
            aoi_name: "survey".to_string(),
            data_type: "dop".to_string(),
            regions,
        }
    }

    #[test]
    fn test_export_closes_rings() {
        let collection = to_feature_collection(&sample_registry());
        assert_eq!(collection.epsg(), Some(25832));
        assert_eq!(collection.features.len(), 1);

        let Some(Geometry::Polygon { coordinates }) = &collection.features[0].geometry else {
            panic!("expected a polygon");
        };
        let ring = &coordinates[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_export_carries_tile_properties() {
        let collection = to_feature_collection(&sample_registry());
        let feature = &collection.features[0];
        assert_eq!(feature.property_str("tile_name"), Some("32_488_5478"));
        assert_eq!(feature.property_str("region"), Some("Hessen"));
        assert_eq!(feature.property_str("status"), Some("uploaded"));
        assert_eq!(
            feature.property_str("location"),
            Some("s3://bucket/dop/32_488_5478")
        );
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.geojson");
        export_geojson(&sample_registry(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let back: FeatureCollection = serde_json::from_str(&content).unwrap();
        assert_eq!(back.features.len(), 1);
    }
}
