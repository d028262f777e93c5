//! The tile record: the atomic unit of acquisition work.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pipeline state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileStatus {
    #[default]
    Pending,
    Fetched,
    Uploaded,
    Skipped,
    Failed,
}

impl TileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Uploaded => "uploaded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// A single grid tile tracked by the registry.
///
/// `id` is a pure function of the coordinate-system code and the grid cell
/// indices (`{zone}_{x_km:03}_{y_km:04}`), so re-running grid generation for
/// the same AOI reproduces identical ids and an existing registry can be
/// reused instead of duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: String,
    /// Square footprint in the output coordinate system: 4 corners, open
    /// ring (last point not repeated).
    pub footprint: Vec<(f64, f64)>,
    /// Acquisition/creation date of the upstream asset, if known.
    pub timestamp: Option<NaiveDate>,
    #[serde(default)]
    pub status: TileStatus,
    /// Local path or remote URI once the tile has been retrieved.
    pub location: Option<String>,
    /// Lowercase file extension of the retrieved payload.
    pub format: Option<String>,
}

impl Tile {
    pub fn new(id: impl Into<String>, footprint: Vec<(f64, f64)>) -> Self {
        Self {
            id: id.into(),
            footprint,
            timestamp: None,
            status: TileStatus::Pending,
            location: None,
            format: None,
        }
    }

    /// A tile with a recorded location is never re-downloaded.
    pub fn is_retrieved(&self) -> bool {
        self.location.is_some()
    }

    /// Tile id with the zone separator removed: `32_488_5478` -> `32488_5478`.
    ///
    /// Several upstream catalogs key their metadata this way.
    pub fn id_compact(&self) -> String {
        self.id.replacen('_', "", 1)
    }

    /// Tile id in the dashed upstream convention: `32_488_5478` -> `32488-5478`.
    pub fn id_dashed(&self) -> String {
        self.id_compact().replace('_', "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_variants() {
        let tile = Tile::new("32_488_5478", vec![]);
        assert_eq!(tile.id_compact(), "32488_5478");
        assert_eq!(tile.id_dashed(), "32488-5478");
    }

    #[test]
    fn test_status_serde_roundtrip() {
        let tile = Tile::new("33_401_5802", vec![(401000.0, 5802000.0)]);
        let json = serde_json::to_string(&tile).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        let back: Tile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tile);
    }

    #[test]
    fn test_status_defaults_to_pending() {
        // Registries written before the status field existed must still load.
        let json = r#"{"id":"32_001_0001","footprint":[],"timestamp":null,"location":null,"format":null}"#;
        let tile: Tile = serde_json::from_str(json).unwrap();
        assert_eq!(tile.status, TileStatus::Pending);
    }
}
