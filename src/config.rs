//! Build configuration for the cluster index.
//!
//! Every value has a default matching the production batch job, so an empty
//! JSON object is a valid configuration:
//!
//! ```rust
//! use quadcluster::ClusterConfig;
//!
//! let config = ClusterConfig::from_json_str("{}").unwrap();
//! assert_eq!(config.min_zoom, 10);
//! assert_eq!(config.max_zoom, 16);
//! assert_eq!(config.workers, 4);
//!
//! let json = r#"{ "workers": 8, "strategy": "bottom_up" }"#;
//! let config = ClusterConfig::from_json_str(json).unwrap();
//! assert_eq!(config.workers, 8);
//! ```

use crate::error::{ClusterError, Result};
use quadcluster_types::{Bounds, Zoom};
use serde::{Deserialize, Serialize};

/// Deepest zoom the encoder is allowed to produce.
pub const MAX_SUPPORTED_ZOOM: Zoom = 32;

/// How the aggregation phase derives each bucket's centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Reduce every bucket independently from its full member set.
    #[default]
    FullReduction,
    /// Reduce only the deepest level from members; derive each coarser bucket
    /// as the size-weighted mean of its children.
    BottomUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Rectangle the quadkeys subdivide.
    #[serde(default)]
    pub bounds: Bounds,

    /// First zoom level that produces buckets (inclusive).
    #[serde(default = "ClusterConfig::default_min_zoom")]
    pub min_zoom: Zoom,

    /// Zoom level at which subdivision stops (exclusive).
    #[serde(default = "ClusterConfig::default_max_zoom")]
    pub max_zoom: Zoom,

    /// Number of partition workers.
    #[serde(default = "ClusterConfig::default_workers")]
    pub workers: usize,

    /// Capacity of each worker's input and output queue.
    #[serde(default = "ClusterConfig::default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the merged output queue; `queue_capacity * 4` when unset.
    #[serde(default)]
    pub merged_queue_capacity: Option<usize>,

    #[serde(default)]
    pub strategy: AggregationStrategy,

    /// Emit a progress line every this many processed items.
    #[serde(default = "ClusterConfig::default_progress_interval")]
    pub progress_interval: usize,
}

impl ClusterConfig {
    const fn default_min_zoom() -> Zoom {
        10
    }

    const fn default_max_zoom() -> Zoom {
        16
    }

    const fn default_workers() -> usize {
        4
    }

    const fn default_queue_capacity() -> usize {
        512
    }

    const fn default_progress_interval() -> usize {
        500
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: Zoom, max_zoom: Zoom) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        assert!(workers > 0, "Worker count must be greater than zero");
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be greater than zero");
        self.queue_capacity = capacity;
        self
    }

    pub fn with_merged_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be greater than zero");
        self.merged_queue_capacity = Some(capacity);
        self
    }

    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn merged_capacity(&self) -> usize {
        self.merged_queue_capacity
            .unwrap_or_else(|| self.queue_capacity.saturating_mul(4))
    }

    /// Number of zoom levels that produce buckets.
    pub fn zoom_levels(&self) -> usize {
        usize::from(self.max_zoom.saturating_sub(self.min_zoom))
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_zoom >= self.max_zoom {
            return Err(ClusterError::InvalidConfig(format!(
                "min_zoom ({}) must be less than max_zoom ({})",
                self.min_zoom, self.max_zoom
            )));
        }

        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(ClusterError::InvalidConfig(format!(
                "max_zoom must be at most {}, got {}",
                MAX_SUPPORTED_ZOOM, self.max_zoom
            )));
        }

        if self.workers == 0 {
            return Err(ClusterError::InvalidConfig(
                "workers must be greater than zero".to_string(),
            ));
        }

        if self.queue_capacity == 0 || self.merged_capacity() == 0 {
            return Err(ClusterError::InvalidConfig(
                "queue capacities must be greater than zero".to_string(),
            ));
        }

        if self.progress_interval == 0 {
            return Err(ClusterError::InvalidConfig(
                "progress_interval must be greater than zero".to_string(),
            ));
        }

        let b = &self.bounds;
        if ![b.min_lon, b.max_lon, b.min_lat, b.max_lat]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ClusterError::InvalidConfig(
                "bounds must be finite".to_string(),
            ));
        }
        if b.min_lon >= b.max_lon || b.min_lat >= b.max_lat {
            return Err(ClusterError::InvalidConfig(format!(
                "bounds are degenerate: lon [{}, {}], lat [{}, {}]",
                b.min_lon, b.max_lon, b.min_lat, b.max_lat
            )));
        }

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClusterError::InvalidConfig(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ClusterError::InvalidConfig(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ClusterError::Serialization(e.to_string()))
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::WORLD,
            min_zoom: Self::default_min_zoom(),
            max_zoom: Self::default_max_zoom(),
            workers: Self::default_workers(),
            queue_capacity: Self::default_queue_capacity(),
            merged_queue_capacity: None,
            strategy: AggregationStrategy::default(),
            progress_interval: Self::default_progress_interval(),
        }
    }
}
