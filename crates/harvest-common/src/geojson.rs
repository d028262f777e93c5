//! GeoJSON document types for AOI input, boundary catalogs and registry
//! export.
//!
//! Only the geometry types the pipeline deals with (Polygon, MultiPolygon)
//! are modelled; anything else in an input file is a document error.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HarvestError, HarvestResult};

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    /// Optional named CRS (legacy GeoJSON member; absent means WGS84).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,

    /// Array of features.
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            crs: None,
            features: Vec::new(),
        }
    }

    pub fn with_epsg(mut self, code: u32) -> Self {
        self.crs = Some(Crs::epsg(code));
        self
    }

    /// EPSG code declared by the document, if any.
    pub fn epsg(&self) -> Option<u32> {
        self.crs.as_ref().and_then(Crs::epsg_code)
    }

    /// Collect every polygon in the collection into one MultiPolygon.
    pub fn to_multi_polygon(&self) -> HarvestResult<MultiPolygon<f64>> {
        let mut polygons = Vec::new();
        for feature in &self.features {
            if let Some(geometry) = &feature.geometry {
                polygons.extend(geometry.to_polygons()?);
            }
        }
        Ok(MultiPolygon(polygons))
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// A named coordinate reference system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crs {
    #[serde(rename = "type")]
    pub type_: String,
    pub properties: CrsProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrsProperties {
    pub name: String,
}

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self {
            type_: "name".to_string(),
            properties: CrsProperties {
                name: format!("urn:ogc:def:crs:EPSG::{code}"),
            },
        }
    }

    /// Parse the EPSG code out of either `EPSG:25832` or the URN form.
    pub fn epsg_code(&self) -> Option<u32> {
        let name = &self.properties.name;
        name.rsplit(':').next().and_then(|tail| tail.parse().ok())
    }
}

/// A GeoJSON Feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub properties: Map<String, Value>,

    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            type_: "Feature".to_string(),
            properties,
            geometry: Some(geometry),
        }
    }

    /// String property lookup.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// GeoJSON geometry, restricted to the polygonal types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon {
        /// Rings: exterior first, then holes. Rings are closed.
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Geometry {
    /// Convert to geo polygons (one for Polygon, several for MultiPolygon).
    pub fn to_polygons(&self) -> HarvestResult<Vec<Polygon<f64>>> {
        match self {
            Geometry::Polygon { coordinates } => Ok(vec![rings_to_polygon(coordinates)?]),
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().map(|rings| rings_to_polygon(rings)).collect()
            }
        }
    }

    pub fn from_polygon(polygon: &Polygon<f64>) -> Self {
        Geometry::Polygon {
            coordinates: polygon_to_rings(polygon),
        }
    }

    pub fn from_multi_polygon(multi: &MultiPolygon<f64>) -> Self {
        Geometry::MultiPolygon {
            coordinates: multi.0.iter().map(polygon_to_rings).collect(),
        }
    }
}

fn rings_to_polygon(rings: &[Vec<[f64; 2]>]) -> HarvestResult<Polygon<f64>> {
    let mut iter = rings.iter().map(|ring| {
        LineString::from(
            ring.iter()
                .map(|&[x, y]| Coord { x, y })
                .collect::<Vec<_>>(),
        )
    });
    let exterior = iter
        .next()
        .ok_or_else(|| HarvestError::Format("polygon with no rings".to_string()))?;
    Ok(Polygon::new(exterior, iter.collect()))
}

fn polygon_to_rings(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    let ring = |ls: &LineString<f64>| ls.coords().map(|c| [c.x, c.y]).collect::<Vec<_>>();
    let mut rings = vec![ring(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring));
    rings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_collection_with_crs() {
        let json = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::25832"}},
            "features": [{
                "type": "Feature",
                "properties": {"name": "Brandenburg"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
                }
            }]
        }"#;

        let fc: FeatureCollection = serde_json::from_str(json).unwrap();
        assert_eq!(fc.epsg(), Some(25832));
        assert_eq!(fc.features[0].property_str("name"), Some("Brandenburg"));

        let multi = fc.to_multi_polygon().unwrap();
        assert_eq!(multi.0.len(), 1);
    }

    #[test]
    fn test_epsg_short_form() {
        let crs = Crs {
            type_: "name".to_string(),
            properties: CrsProperties {
                name: "EPSG:25833".to_string(),
            },
        };
        assert_eq!(crs.epsg_code(), Some(25833));
    }

    #[test]
    fn test_geometry_roundtrip_with_hole() {
        let json = r#"{
            "type": "Polygon",
            "coordinates": [
                [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0], [0.0, 0.0]],
                [[40.0, 40.0], [60.0, 40.0], [60.0, 60.0], [40.0, 60.0], [40.0, 40.0]]
            ]
        }"#;
        let geometry: Geometry = serde_json::from_str(json).unwrap();
        let polygons = geometry.to_polygons().unwrap();
        assert_eq!(polygons[0].interiors().len(), 1);

        let back = Geometry::from_polygon(&polygons[0]);
        assert_eq!(back, geometry);
    }

    #[test]
    fn test_point_geometry_rejected() {
        let json = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(serde_json::from_str::<Geometry>(json).is_err());
    }
}
