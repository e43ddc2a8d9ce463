//! The clustering index: hierarchical build over descending zoom levels
//! plus the viewport and drill-down queries.

use log::{debug, trace};
use std::time::Instant;

use crate::kdtree::KdTree;
use crate::node::{ClusterId, Node, NodeKind};
use crate::projection::{lat_y, lng_x};
use crate::{Error, Options, Position, Result};

/// One zoom level: the node array and the KD-tree indexing it.
#[derive(Clone, Debug)]
struct Tree {
    index: KdTree,
    nodes: Vec<Node>,
}

impl Tree {
    fn build(nodes: Vec<Node>, node_size: usize) -> Self {
        let index = KdTree::build(nodes.iter().map(|n| (n.x, n.y)), node_size);

        Tree { index, nodes }
    }
}

/// A hierarchical point clustering index.
///
/// [`load`](ClusterIndex::load) is the only mutating operation; once it
/// returns, every query is a pure read over frozen trees.
#[derive(Clone, Debug)]
pub struct ClusterIndex<P> {
    /// Configuration settings.
    options: Options,

    /// Input points, in load order. Dropped points keep their slot so
    /// node indices stay stable.
    points: Vec<P>,

    /// One optional tree per zoom level, indices `0..=max_zoom + 1`.
    /// Slots below `min_zoom` stay empty.
    trees: Vec<Option<Tree>>,

    /// Number of points with valid coordinates; cluster ids are offset
    /// past it so they never collide with point indices.
    point_count: usize,
}

impl<P: Position> ClusterIndex<P> {
    /// Create an empty index with the given configuration. The
    /// configuration is checked when points are loaded.
    pub fn new(options: Options) -> Self {
        let capacity = options.max_zoom as usize + 2;

        ClusterIndex {
            options,
            points: Vec::new(),
            trees: (0..capacity).map(|_| None).collect(),
            point_count: 0,
        }
    }

    /// Load the input points and cluster them on every zoom level from
    /// `max_zoom` down to `min_zoom`.
    ///
    /// Points whose [`Position`] accessors return `None` for either
    /// coordinate are silently excluded from the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the options are
    /// unusable or the input is too large for the cluster id encoding.
    pub fn load(&mut self, points: Vec<P>) -> Result<&mut Self> {
        self.options.validate()?;

        let started = Instant::now();
        let min_zoom = self.options.min_zoom as usize;
        let max_zoom = self.options.max_zoom as usize;

        self.points = points;
        self.trees = (0..max_zoom + 2).map(|_| None).collect();

        // Generate a leaf node for every input with usable coordinates.
        let mut leaves = Vec::with_capacity(self.points.len());

        for (i, point) in self.points.iter().enumerate() {
            let (Some(lng), Some(lat)) = (point.lng(), point.lat()) else {
                continue;
            };

            leaves.push(Node::point(lng_x(lng), lat_y(lat), i));
        }

        let dropped = self.points.len() - leaves.len();
        if dropped > 0 {
            debug!("dropped {dropped} points with missing coordinates");
        }

        self.point_count = leaves.len();

        // Ids are (index << 5) + zoom + point_count, so the largest one is
        // just below 33 * point_count; refuse inputs that would wrap.
        if self.point_count as u64 > (u64::MAX - 31) / 33 {
            return Err(Error::InvalidConfiguration(format!(
                "{} points exceed the cluster id capacity",
                self.point_count
            )));
        }

        let leaf_tree = Tree::build(leaves, self.options.node_size);

        debug!("indexing {} points", leaf_tree.index.len());

        self.trees[max_zoom + 1] = Some(leaf_tree);

        // Cluster the points on max zoom, then cluster the results on the
        // zoom below, and so on down to min zoom, producing the cluster
        // hierarchy across levels.
        for zoom in (min_zoom..=max_zoom).rev() {
            let level_started = Instant::now();
            let next = self.cluster_zoom(zoom as u8);

            trace!(
                "z{zoom}: {} nodes in {:?}",
                next.len(),
                level_started.elapsed()
            );

            self.trees[zoom] = Some(Tree::build(next, self.options.node_size));
        }

        debug!(
            "built zoom levels {min_zoom}..={} in {:?}",
            max_zoom + 1,
            started.elapsed()
        );

        Ok(self)
    }

    /// The loaded input points, in load order.
    pub fn points(&self) -> &[P] {
        &self.points
    }

    /// The configuration this index was created with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Resolve a point node back to the loaded input it stands for.
    pub fn point(&self, node: &Node) -> Option<&P> {
        match node.kind {
            NodeKind::Point { index } => self.points.get(index),
            NodeKind::Cluster { .. } => None,
        }
    }

    /// Retrieve the clusters and unclustered points inside the given
    /// viewport at a zoom level.
    ///
    /// # Arguments
    ///
    /// - `bbox`: `[west_lng, south_lat, east_lng, north_lat]` in degrees.
    ///   Longitudes may exceed `[-180, 180]` and are normalised; a
    ///   viewport crossing the antimeridian is split and queried in two
    ///   parts, eastern hemisphere first.
    /// - `zoom`: the zoom level, clamped to `min_zoom..=max_zoom + 1`.
    pub fn get_clusters(&self, bbox: [f64; 4], zoom: u8) -> Vec<&Node> {
        let mut min_lng = ((bbox[0] + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;
        let min_lat = bbox[1].clamp(-90.0, 90.0);
        let mut max_lng = if bbox[2] == 180.0 {
            180.0
        } else {
            ((bbox[2] + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
        };
        let max_lat = bbox[3].clamp(-90.0, 90.0);

        if bbox[2] - bbox[0] >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let eastern = self.get_clusters([min_lng, min_lat, 180.0, max_lat], zoom);
            let western = self.get_clusters([-180.0, min_lat, max_lng, max_lat], zoom);

            return eastern.into_iter().chain(western).collect();
        }

        let Some(tree) = self.trees[self.limit_zoom(zoom)].as_ref() else {
            return Vec::new();
        };

        // Mercator Y grows southward, so the north edge is the smaller Y.
        tree.index
            .within_bounds(lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat))
            .into_iter()
            .map(|i| &tree.nodes[i])
            .collect()
    }

    /// Retrieve the direct children of a cluster: the nodes it merged on
    /// the zoom level it was created from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterNotFound`] if the id does not decode to a
    /// live cluster.
    pub fn get_children(&self, cluster_id: ClusterId) -> Result<Vec<&Node>> {
        let (origin_zoom, origin_index) = self
            .decode(cluster_id)
            .ok_or(Error::ClusterNotFound(cluster_id))?;
        let tree = self
            .trees
            .get(origin_zoom)
            .and_then(Option::as_ref)
            .ok_or(Error::ClusterNotFound(cluster_id))?;
        let origin = tree
            .nodes
            .get(origin_index)
            .ok_or(Error::ClusterNotFound(cluster_id))?;

        // The merge happened one level up, so its radius applies here.
        let r = self.options.radius
            / (self.options.extent * f64::powi(2.0, origin_zoom as i32 - 1));

        let children: Vec<&Node> = tree
            .index
            .within_radius(origin.x, origin.y, r)
            .into_iter()
            .map(|i| &tree.nodes[i])
            .filter(|node| node.parent == Some(cluster_id))
            .collect();

        if children.is_empty() {
            return Err(Error::ClusterNotFound(cluster_id));
        }

        Ok(children)
    }

    /// Retrieve up to `limit` leaf points of a cluster, skipping the
    /// first `offset` of them, in depth-first child order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterNotFound`] if the id does not decode to a
    /// live cluster.
    pub fn get_leaves(
        &self,
        cluster_id: ClusterId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<&Node>> {
        let mut leaves = Vec::new();

        self.append_leaves(&mut leaves, cluster_id, limit, offset, 0)?;

        Ok(leaves)
    }

    /// Determine the zoom level at which the cluster first breaks apart
    /// into more than one node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterNotFound`] if the id does not decode to a
    /// live cluster.
    pub fn get_cluster_expansion_zoom(&self, cluster_id: ClusterId) -> Result<u8> {
        let mut children = self.get_children(cluster_id)?;
        let (origin_zoom, _) = self
            .decode(cluster_id)
            .ok_or(Error::ClusterNotFound(cluster_id))?;

        // One level below the merge zoom the cluster exists; the first
        // fetch above already looked one level past that.
        let mut expansion_zoom = origin_zoom;

        while expansion_zoom <= self.options.max_zoom as usize && children.len() == 1 {
            let NodeKind::Cluster { id, .. } = children[0].kind else {
                break;
            };

            children = self.get_children(id)?;
            expansion_zoom += 1;
        }

        Ok(expansion_zoom as u8)
    }

    /// Depth-first leaf collection, counting skipped leaves so whole
    /// child clusters can be stepped over without descending.
    fn append_leaves<'a>(
        &'a self,
        leaves: &mut Vec<&'a Node>,
        cluster_id: ClusterId,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize> {
        for child in self.get_children(cluster_id)? {
            if leaves.len() >= limit {
                break;
            }

            match child.kind {
                NodeKind::Cluster { id, count } => {
                    if skipped + count <= offset {
                        // The whole subtree falls before the offset.
                        skipped += count;
                    } else {
                        skipped = self.append_leaves(leaves, id, limit, offset, skipped)?;
                    }
                }
                NodeKind::Point { .. } => {
                    if skipped < offset {
                        skipped += 1;
                    } else {
                        leaves.push(child);
                    }
                }
            }
        }

        Ok(skipped)
    }

    /// Merge step: fold the nodes of `tree[zoom + 1]` into the node array
    /// for `zoom` by greedily absorbing in-radius neighbors, in array
    /// order.
    fn cluster_zoom(&mut self, zoom: u8) -> Vec<Node> {
        let r = self.options.radius / (self.options.extent * f64::powi(2.0, zoom as i32));
        let min_points = self.options.min_points;
        let base = self.point_count as u64;

        let source = self.trees[zoom as usize + 1]
            .as_mut()
            .expect("source tree is built before clustering");
        let mut next = Vec::new();

        for i in 0..source.nodes.len() {
            // A node already absorbed by an earlier pivot on this level is
            // settled; skip it.
            if source.nodes[i].zoom <= zoom {
                continue;
            }

            // Mark the pivot visited before filtering neighbors so the
            // radius query returning the pivot itself is harmless.
            source.nodes[i].zoom = zoom;

            let x = source.nodes[i].x;
            let y = source.nodes[i].y;
            let neighbors = source.index.within_radius(x, y, r);

            let origin_count = source.nodes[i].count();
            let mut count = origin_count;

            for &neighbor in &neighbors {
                if source.nodes[neighbor].zoom > zoom {
                    count += source.nodes[neighbor].count();
                }
            }

            if count > origin_count && count >= min_points {
                // Absorb the neighbors into a new cluster placed at the
                // count-weighted centroid.
                let id = ClusterId(((i as u64) << 5) + (zoom as u64 + 1) + base);
                let mut wx = x * origin_count as f64;
                let mut wy = y * origin_count as f64;

                for neighbor in neighbors {
                    let node = &mut source.nodes[neighbor];

                    if node.zoom <= zoom {
                        continue;
                    }
                    node.zoom = zoom;

                    wx += node.x * node.count() as f64;
                    wy += node.y * node.count() as f64;
                    node.parent = Some(id);
                }

                source.nodes[i].parent = Some(id);
                next.push(Node::cluster(wx / count as f64, wy / count as f64, id, count));
            } else {
                // No merge; the pivot moves down unchanged.
                next.push(source.nodes[i].clone());

                if count > 1 {
                    // The threshold failed even though unabsorbed neighbors
                    // exist (the pivot is a cluster outweighing them).
                    // Carry them forward as-is so no later pivot revisits
                    // them on this level.
                    for neighbor in neighbors {
                        let node = &mut source.nodes[neighbor];

                        if node.zoom <= zoom {
                            continue;
                        }
                        node.zoom = zoom;

                        next.push(node.clone());
                    }
                }
            }
        }

        next
    }

    /// Clamp a requested zoom into the range of built trees.
    fn limit_zoom(&self, zoom: u8) -> usize {
        (zoom as usize)
            .max(self.options.min_zoom as usize)
            .min(self.options.max_zoom as usize + 1)
    }

    /// Split a cluster id into the zoom level it originated on and the
    /// array slot of its pivot in the tree of that level. `None` if the
    /// id is below the point-count offset.
    fn decode(&self, id: ClusterId) -> Option<(usize, usize)> {
        let offset = id.0.checked_sub(self.point_count as u64)?;

        Some(((offset % 32) as usize, (offset >> 5) as usize))
    }
}
