//! Multi-resolution spatial cluster index built from quadkey buckets.
//!
//! Points are assigned to one bucket per zoom level by a pool of worker
//! threads, then every bucket is reduced into a centroid aggregate that a map
//! client can render in place of the individual points.
//!
//! ```rust
//! use quadcluster::{ClusterConfig, ClusterIndexBuilder, VecSource};
//! use quadcluster::types::GeoPoint;
//!
//! let config = ClusterConfig::default().with_zoom_range(0, 4).with_workers(2);
//! let builder = ClusterIndexBuilder::in_memory(config)?;
//! builder.build(&mut VecSource::new(vec![
//!     GeoPoint::new(1, 0.0, 0.0),
//!     GeoPoint::new(2, 2.0, 0.0),
//!     GeoPoint::new(3, 1.0, 3.0),
//! ]))?;
//!
//! let root = builder.query().cluster("3")?;
//! assert_eq!(root.size, 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aggregate;
pub mod builder;
pub mod compute;
pub mod config;
pub mod error;
pub mod index;
pub mod partition;
pub mod query;
pub mod source;
pub mod storage;

pub use quadcluster_types as types;

pub use aggregate::{AggregationReport, Aggregator, AggregatorConfig};
pub use builder::{BuildReport, ClusterIndexBuilder};
pub use config::{AggregationStrategy, ClusterConfig};
pub use error::{ClusterError, LookupError, Phase, Result, StoreError};
pub use index::GeoIndex;
pub use partition::{AssignmentReport, MembershipEvent};
pub use query::ClusterQuery;
pub use source::{IterSource, JsonLinesSource, PointSource, VecSource};
pub use storage::{ClusterStore, MemoryStore, Reducer, ReducerHandle, StoreStats};

#[cfg(feature = "snapshot")]
pub use storage::{IndexSnapshot, SnapshotFile};

pub use quadcluster_types::{
    Bounds, BucketKey, ClusterAggregate, GeoPoint, PointId, QuadKey, QuadKeyError, Zoom,
};

pub use geo::{Point, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{ClusterConfig, ClusterIndexBuilder, ClusterQuery, Result};

    pub use crate::{ClusterError, LookupError};

    pub use crate::{ClusterStore, MemoryStore};

    pub use crate::{PointSource, VecSource};

    pub use quadcluster_types::{Bounds, ClusterAggregate, GeoPoint, QuadKey};

    pub use geo::{Point, Rect};
}
