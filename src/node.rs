//! The tagged entity stored in every zoom-level tree: either an input
//! point or an aggregate cluster.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zoom mark for nodes that no zoom level has visited yet. Build zooms are
/// capped far below this, so it acts as the "not absorbed" sentinel.
pub(crate) const ZOOM_UNVISITED: u8 = u8::MAX;

/// Opaque identifier of a cluster.
///
/// The raw value packs the zoom level the cluster originated on and the
/// array slot of its pivot in the tree one level below, offset past the
/// number of indexed points so cluster ids never collide with point
/// indices. Treat it as a handle; the packing is an internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a [`Node`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// An input point that was not merged at this zoom level. `index` is
    /// the point's position in the originally loaded slice.
    Point { index: usize },

    /// An aggregate standing in for `count` input points.
    Cluster { id: ClusterId, count: usize },
}

/// A single entry of a zoom-level tree.
///
/// `(x, y)` are unit-square mercator coordinates: the projected position
/// for a point, the weighted centroid of all merged members for a cluster.
/// Convert back to degrees with [`crate::x_lng`] and [`crate::y_lat`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Projected X in the unit square.
    pub x: f64,

    /// Projected Y in the unit square.
    pub y: f64,

    /// The zoom level this node was absorbed or carried forward at.
    /// Mutated only while the index is being built.
    #[serde(skip)]
    pub(crate) zoom: u8,

    /// Id of the cluster that absorbed this node, if any.
    #[serde(rename = "parent_id")]
    pub(crate) parent: Option<ClusterId>,

    /// Point or cluster payload.
    pub kind: NodeKind,
}

impl Node {
    pub(crate) fn point(x: f64, y: f64, index: usize) -> Self {
        Node {
            x,
            y,
            zoom: ZOOM_UNVISITED,
            parent: None,
            kind: NodeKind::Point { index },
        }
    }

    pub(crate) fn cluster(x: f64, y: f64, id: ClusterId, count: usize) -> Self {
        Node {
            x,
            y,
            zoom: ZOOM_UNVISITED,
            parent: None,
            kind: NodeKind::Cluster { id, count },
        }
    }

    /// Number of input points this node stands for; 1 for a point.
    pub fn count(&self) -> usize {
        match self.kind {
            NodeKind::Point { .. } => 1,
            NodeKind::Cluster { count, .. } => count,
        }
    }

    /// Whether this node is an aggregate cluster.
    pub fn is_cluster(&self) -> bool {
        matches!(self.kind, NodeKind::Cluster { .. })
    }

    /// The cluster id, if this node is a cluster.
    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self.kind {
            NodeKind::Cluster { id, .. } => Some(id),
            NodeKind::Point { .. } => None,
        }
    }

    /// Id of the cluster this node was merged into one zoom level up,
    /// if it was merged at all.
    pub fn parent_id(&self) -> Option<ClusterId> {
        self.parent
    }
}
