//! Per (region, data-type) tiling conventions.

use harvest_common::{HarvestError, HarvestResult};
use serde::{Deserialize, Serialize};

/// Lattice parameters of a region's native tiling scheme.
///
/// `origin_x`/`origin_y` shift the lattice so that tiles generated for
/// different AOIs align to the same global grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TilingConvention {
    /// Tile edge length in meters.
    pub tile_size: f64,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
}

impl TilingConvention {
    pub fn new(tile_size: f64, origin_x: f64, origin_y: f64) -> Self {
        Self {
            tile_size,
            origin_x,
            origin_y,
        }
    }

    /// Validate before any network activity happens.
    pub fn validate(&self) -> HarvestResult<()> {
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return Err(HarvestError::Configuration(format!(
                "tile_size must be positive, got {}",
                self.tile_size
            )));
        }
        Ok(())
    }
}
