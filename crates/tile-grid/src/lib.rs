//! Tile grid generation over an area of interest.
//!
//! Partitions an AOI/region intersection into a canonical lattice of square
//! tiles aligned to each region's native tiling convention, with stable,
//! re-computable tile ids.

pub mod aoi;
pub mod catalog;
pub mod convention;
pub mod partition;

pub use aoi::{load_tile_list, Aoi};
pub use catalog::{Region, RegionCatalog};
pub use convention::TilingConvention;
pub use partition::{partition, tile_from_id, TileCandidate};
