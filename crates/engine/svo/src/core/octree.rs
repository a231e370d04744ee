//! Arena-backed sparse voxel octree
//!
//! All nodes live in one `Vec`, children of a parent form a contiguous sibling
//! block addressed by [`NodeId`]. The root is always at index 0.

use super::node::{NodeId, NodeKind, OctreeNode};
use super::region::Region;
use super::sample::VoxelSample;
use crate::config::{Discipline, SvoConfig};
use crate::error::{Result, SvoError};
use rayon::prelude::*;
use std::fmt::Write;
use tracing::{debug, error, info, warn};

/// Outcome of a batch insertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Samples stored in the tree
    pub inserted: usize,
    /// Samples carrying the empty color
    pub skipped_empty: usize,
    /// Samples outside the root region
    pub out_of_bounds: usize,
}

/// Sparse voxel octree built from a stream of [`VoxelSample`]s
#[derive(Debug, Clone)]
pub struct Octree {
    config: SvoConfig,
    nodes: Vec<OctreeNode>,
}

impl Octree {
    /// Empty tree over the configured root region
    pub fn new(config: SvoConfig) -> Result<Self> {
        config.validate()?;
        let region = Region::new(config.origin(), config.scale);
        Self::with_root(config, region)
    }

    /// Empty tree over `region`, which may be smaller than the leaf size
    fn with_root(config: SvoConfig, region: Region) -> Result<Self> {
        let is_leaf = match config.discipline {
            Discipline::FixedFanout => region.scale <= config.leaf_size,
            Discipline::BoundsSplitting => true,
        };
        let root = OctreeNode::new(region.origin, region.scale, is_leaf, config.leaf_size)?;
        Ok(Self {
            config,
            nodes: vec![root],
        })
    }

    /// Build a tree from `samples`, skipping empty and out-of-bounds samples
    pub fn build<I>(config: SvoConfig, samples: I) -> Result<Self>
    where
        I: IntoIterator<Item = VoxelSample>,
    {
        let mut tree = Self::new(config)?;
        let report = tree.insert_all(samples)?;
        info!(
            "Built octree: {} samples inserted, {} nodes",
            report.inserted,
            tree.nodes.len()
        );
        Ok(tree)
    }

    /// Build a fixed-fanout tree by constructing each root child's subtree in parallel.
    ///
    /// The stream is partitioned by root child slot, keeping stream order within
    /// each partition, so the result flattens identically to [`Octree::build`].
    /// Bounds-splitting trees and roots that are already leaves are built sequentially.
    pub fn build_parallel<I>(config: SvoConfig, samples: I) -> Result<Self>
    where
        I: IntoIterator<Item = VoxelSample>,
    {
        let mut tree = Self::new(config)?;
        if tree.config.discipline != Discipline::FixedFanout || tree.root().is_leaf() {
            debug!("Parallel build not applicable, building sequentially");
            tree.insert_all(samples)?;
            return Ok(tree);
        }

        let fanout = tree.config.fanout;
        let region = tree.region();
        let mut report = InsertReport::default();
        let mut partitions: Vec<Vec<VoxelSample>> = vec![Vec::new(); fanout.count()];

        for sample in samples {
            if sample.is_empty() {
                report.skipped_empty += 1;
            } else if !region.contains(sample.position) {
                report.out_of_bounds += 1;
            } else {
                partitions[region.child_slot(sample.position, fanout)].push(sample);
            }
        }

        report.inserted = partitions.iter().map(Vec::len).sum();
        if report.inserted == 0 {
            tree.log_report(&report);
            return Ok(tree);
        }

        let first = tree.allocate_children(NodeId::ROOT)?;
        let config = &tree.config;
        let subtrees = partitions
            .into_par_iter()
            .enumerate()
            .map(|(slot, samples)| {
                if samples.is_empty() {
                    return Ok(None);
                }
                let mut subtree = Self::with_root(config.clone(), region.child(slot, fanout))?;
                for sample in samples {
                    subtree.insert(sample)?;
                }
                Ok(Some(subtree))
            })
            .collect::<Result<Vec<Option<Octree>>>>()?;

        for (slot, subtree) in subtrees.into_iter().enumerate() {
            if let Some(subtree) = subtree {
                tree.graft(first.offset(slot), subtree);
                tree.nodes[0].mark_child(slot);
            }
        }
        tree.nodes[0].occupied = true;

        tree.log_report(&report);
        info!(
            "Built octree in parallel: {} samples inserted, {} nodes",
            report.inserted,
            tree.nodes.len()
        );
        Ok(tree)
    }

    pub fn config(&self) -> &SvoConfig {
        &self.config
    }

    /// Region covered by the root
    #[inline]
    pub fn region(&self) -> Region {
        self.nodes[0].region
    }

    #[inline]
    pub fn root(&self) -> &OctreeNode {
        &self.nodes[0]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id.index()]
    }

    /// All arena nodes, root first
    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    /// Ids of the children of `id`, empty for leaves and childless internal nodes
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> {
        let count = match self.node(id).first_child() {
            Some(_) => self.config.fanout.count(),
            None => 0,
        };
        let first = self.node(id).first_child().unwrap_or(NodeId::ROOT);
        (0..count).map(move |slot| first.offset(slot))
    }

    /// Whether `sample` lies inside the root region
    #[inline]
    pub fn contains(&self, sample: &VoxelSample) -> bool {
        self.root().contains(sample)
    }

    /// Whether the tree received no samples
    pub fn is_empty(&self) -> bool {
        !self.root().occupied
    }

    /// Insert one sample. Identical positions are last-write-wins; samples with
    /// the empty color are ignored.
    ///
    /// Fails with [`SvoError::OutOfBounds`] when the sample lies outside the root
    /// region, and with [`SvoError::InvariantViolation`] when routing finds no
    /// child region for a contained sample.
    pub fn insert(&mut self, sample: VoxelSample) -> Result<()> {
        if sample.is_empty() {
            return Ok(());
        }
        let region = self.region();
        if !region.contains(sample.position) {
            return Err(SvoError::OutOfBounds {
                position: sample.position,
                origin: region.origin,
                scale: region.scale,
            });
        }

        match self.config.discipline {
            Discipline::FixedFanout => self.insert_fixed(sample),
            Discipline::BoundsSplitting => {
                let depth = self.depth_budget();
                self.insert_split(NodeId::ROOT, sample, depth)
            }
        }
    }

    /// Insert every sample, skipping empty and out-of-bounds ones.
    ///
    /// Any other error aborts the batch.
    pub fn insert_all<I>(&mut self, samples: I) -> Result<InsertReport>
    where
        I: IntoIterator<Item = VoxelSample>,
    {
        let mut report = InsertReport::default();
        for sample in samples {
            if sample.is_empty() {
                report.skipped_empty += 1;
                continue;
            }
            match self.insert(sample) {
                Ok(()) => report.inserted += 1,
                Err(SvoError::OutOfBounds { position, .. }) => {
                    debug!("Skipping sample outside root region at {}", position);
                    report.out_of_bounds += 1;
                }
                Err(e) => return Err(e),
            }
        }
        self.log_report(&report);
        Ok(report)
    }

    /// Split a bucket leaf at its midpoint into 8 children and move its samples
    /// into them.
    ///
    /// Only valid on leaves larger than the leaf size.
    pub fn subdivide(&mut self, id: NodeId) -> Result<()> {
        let leaf_size = self.config.leaf_size;
        let node = &mut self.nodes[id.index()];
        let region = node.region;
        if !node.is_leaf() {
            return Err(SvoError::InvalidNode(format!(
                "cannot subdivide internal node at {}",
                region.origin
            )));
        }
        if region.scale <= leaf_size {
            return Err(SvoError::InvalidNode(format!(
                "cannot subdivide leaf at {} with scale {} <= leaf size {}",
                region.origin, region.scale, leaf_size
            )));
        }
        if self.config.fanout.count() != 8 {
            return Err(SvoError::InvalidNode(
                "subdivision splits into exactly 8 children".to_string(),
            ));
        }

        let previous = std::mem::replace(
            &mut node.kind,
            NodeKind::Internal {
                first_child: None,
                child_mask: 0,
            },
        );
        let samples = match previous {
            NodeKind::Leaf(voxels) => voxels.into_samples(),
            NodeKind::Internal { .. } => Vec::new(),
        };

        let first = self.allocate_children(id)?;
        debug!(
            "Subdivided node at {} scale {}, redistributing {} samples",
            region.origin,
            region.scale,
            samples.len()
        );

        for sample in samples {
            let slot = self.claiming_child(id, first, &sample)?;
            self.nodes[id.index()].mark_child(slot);
            self.insert_split(first.offset(slot), sample, 0)?;
        }
        Ok(())
    }

    /// Number of nodes reachable from the root, root included
    pub fn node_count(&self) -> usize {
        self.count_from(NodeId::ROOT)
    }

    fn count_from(&self, id: NodeId) -> usize {
        1 + self
            .children(id)
            .map(|child| self.count_from(child))
            .sum::<usize>()
    }

    /// Samples stored in all leaves
    pub fn stored_samples(&self) -> usize {
        self.nodes.iter().map(OctreeNode::voxel_count).sum()
    }

    /// Indented text rendering of the tree, one line per node and stored sample
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(NodeId::ROOT, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, level: usize, out: &mut String) {
        let node = self.node(id);
        let indent = "    ".repeat(level);
        let region = node.region;
        match &node.kind {
            NodeKind::Leaf(voxels) => {
                let _ = writeln!(
                    out,
                    "{indent}Leaf origin={} scale={} voxels={}",
                    region.origin,
                    region.scale,
                    voxels.len()
                );
                for sample in voxels.iter() {
                    let _ = writeln!(
                        out,
                        "{indent}  Voxel {} #{:08X}",
                        sample.position, sample.color
                    );
                }
            }
            NodeKind::Internal { child_mask, .. } => {
                let _ = writeln!(
                    out,
                    "{indent}Internal origin={} scale={} mask={:#x}",
                    region.origin, region.scale, child_mask
                );
                for child in self.children(id) {
                    self.dump_node(child, level + 1, out);
                }
            }
        }
    }

    fn insert_fixed(&mut self, sample: VoxelSample) -> Result<()> {
        let fanout = self.config.fanout;
        let leaf_size = self.config.leaf_size;
        let pos = sample.position;
        let mut id = NodeId::ROOT;

        loop {
            let node = &mut self.nodes[id.index()];
            let region = node.region;
            node.occupied = true;

            let first_child = match &mut node.kind {
                NodeKind::Leaf(voxels) => return voxels.store(region, leaf_size, sample),
                NodeKind::Internal { first_child, .. } => *first_child,
            };

            let slot = region.child_slot(pos, fanout);
            let first = match first_child {
                Some(first) => first,
                None => self.allocate_children(id)?,
            };
            self.nodes[id.index()].mark_child(slot);

            let child = first.offset(slot);
            if !self.nodes[child.index()].region.contains(pos) {
                return Err(self.invariant_violation(region, pos));
            }
            id = child;
        }
    }

    fn insert_split(&mut self, id: NodeId, sample: VoxelSample, depth: u32) -> Result<()> {
        let leaf_size = self.config.leaf_size;
        let capacity = self.config.bucket_capacity;
        let node = &mut self.nodes[id.index()];
        let region = node.region;
        if !region.contains(sample.position) {
            return Err(SvoError::OutOfBounds {
                position: sample.position,
                origin: region.origin,
                scale: region.scale,
            });
        }
        node.occupied = true;

        if let NodeKind::Leaf(voxels) = &mut node.kind {
            let can_split = region.scale > leaf_size;
            if depth == 0
                || !can_split
                || voxels.len() < capacity
                || voxels.holds(sample.position)
            {
                return voxels.store(region, leaf_size, sample);
            }
            self.subdivide(id)?;
        }

        let first = self.nodes[id.index()]
            .first_child()
            .ok_or_else(|| self.invariant_violation(region, sample.position))?;
        let slot = self.claiming_child(id, first, &sample)?;
        self.nodes[id.index()].mark_child(slot);
        self.insert_split(first.offset(slot), sample, depth.saturating_sub(1))
    }

    /// Slot of the single child of `parent` whose region holds `sample`
    fn claiming_child(&self, parent: NodeId, first: NodeId, sample: &VoxelSample) -> Result<usize> {
        (0..self.config.fanout.count())
            .find(|&slot| self.nodes[first.offset(slot).index()].contains(sample))
            .ok_or_else(|| self.invariant_violation(self.node(parent).region, sample.position))
    }

    /// Append a full sibling block for `parent` and return its first id
    fn allocate_children(&mut self, parent: NodeId) -> Result<NodeId> {
        let fanout = self.config.fanout;
        let leaf_size = self.config.leaf_size;
        let discipline = self.config.discipline;
        let region = self.nodes[parent.index()].region;
        let first = NodeId(self.nodes.len() as u32);

        for child in region.children(fanout) {
            let is_leaf = match discipline {
                Discipline::FixedFanout => child.scale <= leaf_size,
                Discipline::BoundsSplitting => true,
            };
            self.nodes
                .push(OctreeNode::new(child.origin, child.scale, is_leaf, leaf_size)?);
        }

        if let NodeKind::Internal { first_child, .. } = &mut self.nodes[parent.index()].kind {
            *first_child = Some(first);
        }
        debug!(
            "Allocated {} children for node at {} scale {}",
            fanout.count(),
            region.origin,
            region.scale
        );
        Ok(first)
    }

    /// Replace node `target` with the root of `subtree`, appending the rest of
    /// its arena
    fn graft(&mut self, target: NodeId, subtree: Octree) {
        let base = self.nodes.len() as u32;
        let remap = |id: NodeId| -> NodeId {
            if id == NodeId::ROOT {
                target
            } else {
                NodeId(base + id.0 - 1)
            }
        };

        for (index, mut node) in subtree.nodes.into_iter().enumerate() {
            if let NodeKind::Internal { first_child, .. } = &mut node.kind {
                *first_child = first_child.map(remap);
            }
            if index == 0 {
                self.nodes[target.index()] = node;
            } else {
                self.nodes.push(node);
            }
        }
    }

    /// Remaining-depth budget of the root: levels until the leaf size is reached
    fn depth_budget(&self) -> u32 {
        let ratio = (self.region().scale / self.config.leaf_size).max(1) as u32;
        ratio.trailing_zeros()
    }

    fn invariant_violation(&self, region: Region, position: glam::IVec3) -> SvoError {
        error!(
            "No child of node at {} scale {} claims sample at {}",
            region.origin, region.scale, position
        );
        SvoError::InvariantViolation {
            position,
            node_origin: region.origin,
            node_scale: region.scale,
        }
    }

    fn log_report(&self, report: &InsertReport) {
        if report.out_of_bounds > 0 {
            warn!(
                "Skipped {} samples outside root region origin={} scale={}",
                report.out_of_bounds,
                self.region().origin,
                self.region().scale
            );
        }
        if report.skipped_empty > 0 {
            debug!("Skipped {} empty samples", report.skipped_empty);
        }
    }
}
