//! Area-of-interest loading.
//!
//! An AOI arrives either as a GeoJSON polygon file or as a flat list of tile
//! ids. Geometry is normalised to the UTM32 working CRS on load, so the rest
//! of the pipeline never has to ask which CRS an AOI is in.

use std::fs;
use std::path::Path;

use geo::{LineString, MultiPolygon, Polygon};
use harvest_common::geojson::FeatureCollection;
use harvest_common::{HarvestError, HarvestResult};
use projection::{reproject_multi_polygon, TransverseMercator, UtmZone};
use tracing::{debug, info};

/// An area of interest, normalised to UTM32.
#[derive(Debug, Clone)]
pub struct Aoi {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl Aoi {
    /// Load an AOI polygon from a GeoJSON file.
    ///
    /// The file's CRS decides the treatment: 25832 is taken as-is, 25833 is
    /// re-projected across the zone boundary, and geographic coordinates
    /// (EPSG:4326 or no CRS member at all) are forward-projected into UTM32.
    pub fn load(path: &Path) -> HarvestResult<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("aoi")
            .to_string();
        let content = fs::read_to_string(path)?;
        let collection: FeatureCollection = serde_json::from_str(&content)?;

        let mut polygons = Vec::new();
        for feature in &collection.features {
            if let Some(geometry) = &feature.geometry {
                polygons.extend(geometry.to_polygons()?);
            }
        }
        if polygons.is_empty() {
            return Err(HarvestError::Configuration(format!(
                "AOI file {} contains no polygon geometry",
                path.display()
            )));
        }
        let raw = MultiPolygon(polygons);

        let geometry = match collection.epsg() {
            Some(25832) => raw,
            Some(25833) => {
                debug!("AOI is in UTM33, re-projecting to the working CRS");
                reproject_multi_polygon(UtmZone::Utm33, UtmZone::Utm32, &raw)
            }
            Some(4326) | None => {
                debug!("AOI is geographic, projecting to the working CRS");
                project_geographic(&raw)
            }
            Some(code) => {
                return Err(HarvestError::Configuration(format!(
                    "unsupported AOI CRS EPSG:{code}"
                )));
            }
        };

        info!(aoi = %name, polygons = geometry.0.len(), "Loaded area of interest");
        Ok(Self { name, geometry })
    }

    pub fn from_geometry(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }
}

/// Forward-project lon/lat geometry into UTM32.
fn project_geographic(area: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let tm = TransverseMercator::utm(UtmZone::Utm32.central_meridian());
    let project_ring = |ring: &LineString<f64>| {
        LineString::from(
            ring.coords()
                .map(|c| tm.forward(c.y, c.x))
                .collect::<Vec<_>>(),
        )
    };
    MultiPolygon(
        area.0
            .iter()
            .map(|poly| {
                Polygon::new(
                    project_ring(poly.exterior()),
                    poly.interiors().iter().map(project_ring).collect(),
                )
            })
            .collect(),
    )
}

/// Read an explicit tile-id list: one id per line, blank lines and `#`
/// comments ignored.
pub fn load_tile_list(path: &Path) -> HarvestResult<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let ids: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(HarvestError::Configuration(format!(
            "tile list {} is empty",
            path.display()
        )));
    }
    Ok(ids)
}
