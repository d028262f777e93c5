//! Configuration loading for region acquisition endpoints.
//!
//! Loads region configurations from YAML files in config/regions/

use std::collections::BTreeMap;
use std::path::Path;

use harvest_common::{HarvestError, HarvestResult};
use projection::UtmZone;
use serde::Deserialize;
use tile_grid::TilingConvention;
use tracing::{debug, info, warn};

/// Root configuration loaded from a region YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub region: RegionInfo,
    /// Endpoint and grid parameters per data type (dop, dtm, dsm, ...).
    pub datasets: BTreeMap<String, DatasetConfig>,
}

/// Basic region identification.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionInfo {
    /// Short lowercase id used for adapter dispatch and helper files.
    pub id: String,
    /// Boundary-catalog name of the region.
    pub name: String,
    pub zone: UtmZone,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Acquisition endpoints and grid parameters for one data type.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Tile edge length in meters.
    pub tile_size: f64,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    /// Metadata endpoint, if the source publishes an index separate from the
    /// payloads. Templates use `{tile}`, `{id}` and `{year}` placeholders.
    #[serde(default)]
    pub metadata_url: Option<String>,
    /// Payload endpoint template.
    pub download_url: String,
    /// Remote key prefix used when uploading retrieved tiles.
    #[serde(default)]
    pub storage_prefix: Option<String>,
}

impl DatasetConfig {
    pub fn convention(&self) -> TilingConvention {
        TilingConvention::new(self.tile_size, self.origin_x, self.origin_y)
    }
}

impl RegionConfig {
    /// Load a region configuration from a YAML file.
    pub fn load(path: &Path) -> HarvestResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RegionConfig = serde_yaml::from_str(&content).map_err(|e| {
            HarvestError::Configuration(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        for (data_type, dataset) in &config.datasets {
            dataset.convention().validate().map_err(|e| {
                HarvestError::Configuration(format!(
                    "{}/{data_type}: {e}",
                    config.region.id
                ))
            })?;
        }
        debug!(region = %config.region.id, path = %path.display(), "Loaded region config");
        Ok(config)
    }

    /// Dataset lookup; a missing data type is a configuration error.
    pub fn dataset(&self, data_type: &str) -> HarvestResult<&DatasetConfig> {
        self.datasets.get(data_type).ok_or_else(|| {
            HarvestError::Configuration(format!(
                "region {} has no dataset '{data_type}'",
                self.region.id
            ))
        })
    }
}

/// Load all enabled region configurations from a directory.
pub fn load_region_configs(config_dir: &Path) -> HarvestResult<Vec<RegionConfig>> {
    let regions_dir = config_dir.join("regions");

    if !regions_dir.exists() {
        warn!(path = %regions_dir.display(), "Regions config directory not found");
        return Ok(Vec::new());
    }

    let mut configs = Vec::new();

    for entry in std::fs::read_dir(&regions_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml")
        {
            match RegionConfig::load(&path) {
                Ok(config) => {
                    if config.region.enabled {
                        info!(
                            region = %config.region.id,
                            name = %config.region.name,
                            "Loaded region configuration"
                        );
                        configs.push(config);
                    } else {
                        debug!(region = %config.region.id, "Skipping disabled region");
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load region config");
                }
            }
        }
    }

    configs.sort_by(|a, b| a.region.id.cmp(&b.region.id));
    info!(count = configs.len(), "Loaded region configurations");
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BB_YAML: &str = r#"
region:
  id: bb
  name: Brandenburg
  zone: utm33
  enabled: true

datasets:
  dop:
    tile_size: 1000
    metadata_url: "https://data.geobasis-bb.de/geobasis/daten/dop/meta/dop_meta.csv"
    download_url: "https://data.geobasis-bb.de/geobasis/daten/dop/rgb_tif/dop_{tile}.zip"
    storage_prefix: "bb/dop"
  dtm:
    tile_size: 1000
    metadata_url: "https://data.geobasis-bb.de/geobasis/daten/dgm/meta/dgm_meta.csv"
    download_url: "https://data.geobasis-bb.de/geobasis/daten/dgm/xyz/dgm_{tile}.zip"
"#;

    #[test]
    fn test_parse_region_config() {
        let config: RegionConfig = serde_yaml::from_str(BB_YAML).unwrap();
        assert_eq!(config.region.id, "bb");
        assert_eq!(config.region.zone, UtmZone::Utm33);
        assert!(config.region.enabled);

        let dop = config.dataset("dop").unwrap();
        assert_eq!(dop.tile_size, 1000.0);
        assert_eq!(dop.convention().origin_x, 0.0);
        assert!(config.dataset("lidar").is_err());
    }

    #[test]
    fn test_load_configs_skips_disabled_and_broken() {
        let dir = tempfile::tempdir().unwrap();
        let regions = dir.path().join("regions");
        std::fs::create_dir_all(&regions).unwrap();
        std::fs::write(regions.join("bb.yaml"), BB_YAML).unwrap();
        std::fs::write(
            regions.join("he.yaml"),
            BB_YAML.replace("id: bb", "id: he").replace("enabled: true", "enabled: false"),
        )
        .unwrap();
        std::fs::write(regions.join("broken.yaml"), "region: [not, a, map]").unwrap();

        let configs = load_region_configs(dir.path()).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].region.id, "bb");
    }

    #[test]
    fn test_invalid_tile_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, BB_YAML.replace("tile_size: 1000", "tile_size: 0")).unwrap();
        assert!(RegionConfig::load(&path).is_err());
    }
}
