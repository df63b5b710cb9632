//! # quadcluster-types
//!
//! Core geographic and quadkey types shared by the `quadcluster` index
//! builder and the layers that serve its results.
//!
//! - **Point types**: `GeoPoint`, `Bounds`
//! - **Quadkey types**: `Quadrant`, `QuadKey`, `BucketKey`
//! - **Cluster types**: `ClusterAggregate`
//!
//! All types are serializable with Serde and interoperate with the `geo`
//! crate's geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use quadcluster_types::point::{Bounds, GeoPoint};
//! use quadcluster_types::quadkey::Quadrant;
//!
//! let moscow = GeoPoint::new(1, 37.61776, 55.75577);
//! assert_eq!(Bounds::WORLD.quadrant(&moscow), Quadrant::NorthEast);
//! ```

pub mod cluster;
pub mod point;
pub mod quadkey;

pub use cluster::ClusterAggregate;
pub use point::{Bounds, GeoPoint, PointId};
pub use quadkey::{BucketKey, QuadKey, QuadKeyError, Quadrant, Zoom};
