//! Durable acquisition ledger.
//!
//! The registry is a single JSON document holding every tile of a run,
//! grouped by region. It is rewritten in full after each tile so a crashed
//! or interrupted run resumes from the last completed tile.

pub mod export;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use harvest_common::{HarvestResult, Tile};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Tiles of one region, with the data type recorded for provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionTiles {
    pub data_type: String,
    pub tile_list: Vec<Tile>,
}

/// The full ledger for one (AOI, data type) run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileRegistry {
    pub aoi_name: String,
    pub data_type: String,
    /// BTreeMap keeps region ordering stable across rewrites.
    pub regions: BTreeMap<String, RegionTiles>,
}

impl TileRegistry {
    /// Load an existing registry, `None` if the file does not exist yet.
    pub fn load(path: &Path) -> HarvestResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let registry = serde_json::from_str(&content)?;
        Ok(Some(registry))
    }

    /// Persist the whole document atomically: write a sibling temp file and
    /// rename it over the target, so a crash mid-write never leaves a
    /// truncated registry behind.
    pub fn save(&self, path: &Path) -> HarvestResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Saved tile registry");
        Ok(())
    }

    /// Load-or-create: when a registry for the same AOI and data type already
    /// exists at `path` it is reused as-is (the run resumes); anything else
    /// starts a fresh ledger from the freshly generated grid.
    pub fn seed(
        path: &Path,
        aoi_name: &str,
        data_type: &str,
        regions: BTreeMap<String, Vec<Tile>>,
    ) -> HarvestResult<Self> {
        if let Some(existing) = Self::load(path)? {
            if existing.aoi_name == aoi_name && existing.data_type == data_type {
                info!(
                    path = %path.display(),
                    tiles = existing.total(),
                    "Resuming from existing registry"
                );
                return Ok(existing);
            }
            info!(
                path = %path.display(),
                "Existing registry is for a different run, starting fresh"
            );
        }

        let registry = Self {
            aoi_name: aoi_name.to_string(),
            data_type: data_type.to_string(),
            regions: regions
                .into_iter()
                .map(|(region, tile_list)| {
                    (
                        region,
                        RegionTiles {
                            data_type: data_type.to_string(),
                            tile_list,
                        },
                    )
                })
                .collect(),
        };
        registry.save(path)?;
        Ok(registry)
    }

    /// Per-region (retrieved, total) counts.
    pub fn counts(&self) -> Vec<(String, usize, usize)> {
        self.regions
            .iter()
            .map(|(name, region)| {
                let retrieved = region.tile_list.iter().filter(|t| t.is_retrieved()).count();
                (name.clone(), retrieved, region.tile_list.len())
            })
            .collect()
    }

    pub fn total(&self) -> usize {
        self.regions.values().map(|r| r.tile_list.len()).sum()
    }
}
