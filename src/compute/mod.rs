//! Pure computation used by the build phases and the serving queries.
//!
//! - `quadkey`: point → quadkey encoding and cell reconstruction
//! - `centroid`: mean-position accumulation for bucket reduction
//! - `validation`: boundary checks for externally supplied input
//! - `geojson`: export of aggregates for map clients

pub mod centroid;
#[cfg(feature = "geojson")]
pub mod geojson;
pub mod quadkey;
pub mod validation;
