//! Map projection support for the two UTM zones the regional sources use.

pub mod utm;
pub mod zone;

pub use utm::TransverseMercator;
pub use zone::{reproject_multi_polygon, reproject_point, reproject_polygon, UtmZone};
