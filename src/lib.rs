#![forbid(unsafe_code)]

//! Hierarchical geographic point clustering for interactive maps.
//!
//! Given a static set of longitude/latitude points, [`ClusterIndex::load`]
//! precomputes, for every integer zoom level in a configured range, a
//! partitioning of those points into clusters and unclustered points. After
//! loading, viewport queries and cluster drill-down (children, leaves,
//! expansion zoom) are pure reads and safe to issue from multiple threads.
//!
//! ```rust
//! use geocluster::{ClusterIndex, NodeKind, Options};
//!
//! let mut index = ClusterIndex::new(Options::default());
//! index.load(vec![(13.38, 52.52), (13.39, 52.51), (-74.0, 40.7)])?;
//!
//! // Everything on screen at zoom 10: one Berlin cluster, one NYC point.
//! let nodes = index.get_clusters([-180.0, -90.0, 180.0, 90.0], 10);
//! assert_eq!(nodes.len(), 2);
//!
//! for node in nodes {
//!     match node.kind {
//!         NodeKind::Cluster { id, count } => {
//!             assert_eq!(count, 2);
//!             assert_eq!(index.get_leaves(id, 10, 0)?.len(), 2);
//!         }
//!         NodeKind::Point { index } => assert_eq!(index, 2),
//!     }
//! }
//! # Ok::<(), geocluster::Error>(())
//! ```

mod index;
mod kdtree;
mod node;
pub mod projection;

pub use index::ClusterIndex;
pub use node::{ClusterId, Node, NodeKind};
pub use projection::{lat_y, lng_x, x_lng, y_lat};

use serde::{Deserialize, Serialize};

/// Clustering configuration options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Min zoom level to generate clusters on.
    pub min_zoom: u8,

    /// Max zoom level to cluster the points on. The level above it holds
    /// the raw points, so `max_zoom + 1` must stay below 32 for the
    /// cluster id encoding.
    pub max_zoom: u8,

    /// Minimum aggregate count required to form a cluster. A value of 1
    /// clusters whenever any neighbor is in range.
    pub min_points: usize,

    /// Cluster radius in pixels at tile `extent`.
    pub radius: f64,

    /// Tile extent in pixels the radius is measured against.
    pub extent: f64,

    /// Size of the KD-tree leaf node; affects performance.
    pub node_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            min_zoom: 0,
            max_zoom: 16,
            min_points: 2,
            radius: 40.0,
            extent: 512.0,
            node_size: 64,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_zoom > 30 {
            return Err(Error::InvalidConfiguration(format!(
                "max_zoom must be at most 30, got {}",
                self.max_zoom
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(Error::InvalidConfiguration(format!(
                "min_zoom ({}) must not exceed max_zoom ({})",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.min_points == 0 {
            return Err(Error::InvalidConfiguration(
                "min_points must be at least 1".to_string(),
            ));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "radius must be a positive finite number, got {}",
                self.radius
            )));
        }
        if !self.extent.is_finite() || self.extent <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "extent must be a positive finite number, got {}",
                self.extent
            )));
        }
        if self.node_size == 0 {
            return Err(Error::InvalidConfiguration(
                "node_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime failure modes of the index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The supplied id does not decode to a cluster present in the index.
    #[error("no cluster with id {0}")]
    ClusterNotFound(ClusterId),

    /// The configuration cannot produce a valid index.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coordinate accessors for input points.
///
/// The index never inspects the points themselves; it only asks each one
/// for its longitude and latitude in degrees. A point that answers `None`
/// for either coordinate is dropped during [`ClusterIndex::load`] and
/// never appears in any tree.
pub trait Position {
    /// Longitude in degrees, if present.
    fn lng(&self) -> Option<f64>;

    /// Latitude in degrees, if present.
    fn lat(&self) -> Option<f64>;
}

impl Position for (f64, f64) {
    fn lng(&self) -> Option<f64> {
        Some(self.0)
    }

    fn lat(&self) -> Option<f64> {
        Some(self.1)
    }
}

impl Position for [f64; 2] {
    fn lng(&self) -> Option<f64> {
        Some(self[0])
    }

    fn lat(&self) -> Option<f64> {
        Some(self[1])
    }
}
