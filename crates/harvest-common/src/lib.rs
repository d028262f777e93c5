//! Shared types for the geoharvest services.
//!
//! Holds the error taxonomy, the tile record (the atomic unit of work),
//! date-window admission rules, and GeoJSON document types.

pub mod dates;
pub mod error;
pub mod geojson;
pub mod tile;

pub use dates::{parse_flexible_date, DateWindow};
pub use error::{HarvestError, HarvestResult};
pub use tile::{Tile, TileStatus};
