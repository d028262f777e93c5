//! Region boundary catalog.
//!
//! Administrative boundaries come as two GeoJSON collections, one per UTM
//! zone, each feature carrying the region name. Boundaries stay in their
//! native zone; the seeding step re-projects the AOI instead.

use std::fs;
use std::path::Path;

use geo::MultiPolygon;
use harvest_common::geojson::FeatureCollection;
use harvest_common::{HarvestError, HarvestResult};
use projection::UtmZone;
use tracing::{debug, info};

/// One administrative region with its native zone and boundary polygon.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub zone: UtmZone,
    pub boundary: MultiPolygon<f64>,
}

/// All known regions, loaded from the two per-zone boundary files.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<Region>,
}

impl RegionCatalog {
    /// Load `regions_utm32.geojson` and `regions_utm33.geojson` from a
    /// boundaries directory. A missing file only skips that zone.
    pub fn load(boundaries_dir: &Path) -> HarvestResult<Self> {
        let mut catalog = Self::default();
        for (file, zone) in [
            ("regions_utm32.geojson", UtmZone::Utm32),
            ("regions_utm33.geojson", UtmZone::Utm33),
        ] {
            let path = boundaries_dir.join(file);
            if !path.exists() {
                debug!(path = %path.display(), "Boundary file not present, skipping zone");
                continue;
            }
            catalog.load_collection(&path, zone)?;
        }
        info!(count = catalog.regions.len(), "Loaded region boundaries");
        Ok(catalog)
    }

    fn load_collection(&mut self, path: &Path, zone: UtmZone) -> HarvestResult<()> {
        let content = fs::read_to_string(path)?;
        let collection: FeatureCollection = serde_json::from_str(&content)?;
        for feature in &collection.features {
            // Older boundary exports use the German "GEN" attribute.
            let Some(name) = feature
                .property_str("name")
                .or_else(|| feature.property_str("GEN"))
            else {
                return Err(HarvestError::Configuration(format!(
                    "boundary feature without a name in {}",
                    path.display()
                )));
            };
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            self.regions.push(Region {
                name: name.to_string(),
                zone,
                boundary: MultiPolygon(geometry.to_polygons()?),
            });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Used by tests and single-region flows.
    pub fn push(&mut self, region: Region) {
        self.regions.push(region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BOUNDARIES: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::25832"}},
        "features": [
            {
                "type": "Feature",
                "properties": {"GEN": "Nordstaat"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1000,0],[1000,1000],[0,1000],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Weststaat"},
                "geometry": {"type": "Polygon", "coordinates": [[[2000,0],[3000,0],[3000,1000],[2000,1000],[2000,0]]]}
            }
        ]
    }"#;

    #[test]
    fn test_load_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions_utm32.geojson");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(BOUNDARIES.as_bytes()).unwrap();

        let catalog = RegionCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("Nordstaat").is_some());
        assert_eq!(catalog.get("Weststaat").unwrap().zone, UtmZone::Utm32);
        assert!(catalog.get("Unbekannt").is_none());
    }

    #[test]
    fn test_missing_files_yield_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = RegionCatalog::load(dir.path()).unwrap();
        assert!(catalog.is_empty());
    }
}
