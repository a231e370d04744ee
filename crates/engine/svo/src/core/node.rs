use super::region::Region;
use super::sample::VoxelSample;
use crate::config::{dense_capacity, is_power_of_two};
use crate::error::{Result, SvoError};
use glam::IVec3;

/// Index of a node inside the octree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The root always lives at arena index 0
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Id of the `slot`-th node of a sibling block starting at `self`
    #[inline]
    pub(crate) fn offset(self, slot: usize) -> NodeId {
        NodeId(self.0 + slot as u32)
    }
}

/// Voxel storage of a leaf
#[derive(Debug, Clone)]
pub enum LeafVoxels {
    /// Fixed-capacity store addressed by local offset, used once a region is
    /// no larger than the leaf size. `slots` stays empty until the first store.
    Dense {
        slots: Box<[VoxelSample]>,
        count: usize,
    },
    /// Unordered list of a bounds-splitting leaf that may still subdivide
    Bucket(Vec<VoxelSample>),
}

impl LeafVoxels {
    /// Empty dense store; its `leaf_size³` slots are allocated on first write
    pub fn dense() -> Self {
        LeafVoxels::Dense {
            slots: Box::default(),
            count: 0,
        }
    }

    /// Whether slot storage has been allocated
    pub fn is_allocated(&self) -> bool {
        match self {
            LeafVoxels::Dense { slots, .. } => !slots.is_empty(),
            LeafVoxels::Bucket(_) => true,
        }
    }

    /// Number of occupied samples
    pub fn len(&self) -> usize {
        match self {
            LeafVoxels::Dense { count, .. } => *count,
            LeafVoxels::Bucket(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied samples; dense stores yield them in slot order
    pub fn iter(&self) -> impl Iterator<Item = &VoxelSample> + '_ {
        let samples: &[VoxelSample] = match self {
            LeafVoxels::Dense { slots, .. } => &slots[..],
            LeafVoxels::Bucket(samples) => &samples[..],
        };
        samples.iter().filter(|sample| !sample.is_empty())
    }

    /// Whether a sample at `pos` is already stored
    pub fn holds(&self, pos: IVec3) -> bool {
        self.iter().any(|sample| sample.position == pos)
    }

    /// Store `sample`, replacing any sample already at the same position
    pub(crate) fn store(&mut self, region: Region, leaf_size: i32, sample: VoxelSample) -> Result<()> {
        match self {
            LeafVoxels::Dense { slots, count } => {
                let capacity = dense_capacity(leaf_size).ok_or_else(|| {
                    SvoError::InvalidNode(format!("dense store of leaf size {leaf_size} overflows"))
                })?;
                let index = region
                    .local_index(sample.position, leaf_size)
                    .filter(|&index| index < capacity)
                    .ok_or(SvoError::OutOfBounds {
                        position: sample.position,
                        origin: region.origin,
                        scale: region.scale,
                    })?;
                if slots.is_empty() {
                    *slots = vec![VoxelSample::EMPTY; capacity].into_boxed_slice();
                }
                if slots[index].is_empty() {
                    *count += 1;
                }
                slots[index] = sample;
            }
            LeafVoxels::Bucket(samples) => {
                match samples.iter_mut().find(|s| s.position == sample.position) {
                    Some(existing) => *existing = sample,
                    None => samples.push(sample),
                }
            }
        }
        Ok(())
    }

    pub(crate) fn into_samples(self) -> Vec<VoxelSample> {
        match self {
            LeafVoxels::Dense { slots, .. } => {
                slots.into_vec().into_iter().filter(|s| !s.is_empty()).collect()
            }
            LeafVoxels::Bucket(samples) => samples,
        }
    }
}

/// Internal or leaf payload of a node
#[derive(Debug, Clone)]
pub enum NodeKind {
    Internal {
        /// First node of the contiguous sibling block, once allocated
        first_child: Option<NodeId>,
        /// Bit `i` set once child `i` received a sample
        child_mask: u64,
    },
    Leaf(LeafVoxels),
}

/// A node covering a cubic region of the voxel grid
#[derive(Debug, Clone)]
pub struct OctreeNode {
    pub region: Region,
    /// False until an insertion passed through this node
    pub occupied: bool,
    pub kind: NodeKind,
}

impl OctreeNode {
    /// Create a node. `scale` must be a positive power of two, and internal
    /// nodes must be larger than `leaf_size`.
    ///
    /// Leaves no larger than `leaf_size` get a dense store, sized `leaf_size³`
    /// on first write; larger leaves start out as buckets.
    pub fn new(origin: IVec3, scale: i32, is_leaf: bool, leaf_size: i32) -> Result<Self> {
        if !is_power_of_two(scale) {
            return Err(SvoError::InvalidNode(format!(
                "scale must be a positive power of two, got {scale}"
            )));
        }
        if !is_leaf && scale <= leaf_size {
            return Err(SvoError::InvalidNode(format!(
                "internal node at {origin} has scale {scale} <= leaf size {leaf_size}"
            )));
        }

        let kind = if !is_leaf {
            NodeKind::Internal {
                first_child: None,
                child_mask: 0,
            }
        } else if scale <= leaf_size {
            NodeKind::Leaf(LeafVoxels::dense())
        } else {
            NodeKind::Leaf(LeafVoxels::Bucket(Vec::new()))
        };

        Ok(Self {
            region: Region::new(origin, scale),
            occupied: false,
            kind,
        })
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    #[inline]
    pub fn first_child(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Internal { first_child, .. } => first_child,
            NodeKind::Leaf(_) => None,
        }
    }

    #[inline]
    pub fn child_mask(&self) -> u64 {
        match self.kind {
            NodeKind::Internal { child_mask, .. } => child_mask,
            NodeKind::Leaf(_) => 0,
        }
    }

    /// Leaf storage, `None` for internal nodes
    #[inline]
    pub fn voxels(&self) -> Option<&LeafVoxels> {
        match &self.kind {
            NodeKind::Leaf(voxels) => Some(voxels),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Samples stored directly in this node
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxels().map_or(0, LeafVoxels::len)
    }

    #[inline]
    pub fn contains(&self, sample: &VoxelSample) -> bool {
        self.region.contains(sample.position)
    }

    pub(crate) fn mark_child(&mut self, slot: usize) {
        if let NodeKind::Internal { child_mask, .. } = &mut self.kind {
            *child_mask |= 1u64 << slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_leaf_is_dense_at_leaf_size() {
        let node = OctreeNode::new(IVec3::ZERO, 8, true, 8).unwrap();
        assert!(node.is_leaf());
        assert!(!node.occupied);
        match node.voxels().unwrap() {
            LeafVoxels::Dense { slots, count } => {
                assert!(slots.is_empty());
                assert_eq!(*count, 0);
            }
            other => panic!("Expected dense store, got {:?}", other),
        }
    }

    #[test]
    fn test_dense_store_allocates_on_first_write() {
        let region = Region::new(IVec3::ZERO, 8);
        let mut store = LeafVoxels::dense();
        assert!(!store.is_allocated());
        assert_eq!(store.iter().count(), 0);
        assert!(store.clone().into_samples().is_empty());

        store.store(region, 8, VoxelSample::colored(IVec3::new(1, 2, 3), 4)).unwrap();
        assert!(store.is_allocated());
        match &store {
            LeafVoxels::Dense { slots, count } => {
                assert_eq!(slots.len(), 512);
                assert_eq!(*count, 1);
            }
            other => panic!("Expected dense store, got {:?}", other),
        }
    }

    #[test]
    fn test_rejected_write_leaves_store_unallocated() {
        let region = Region::new(IVec3::ZERO, 8);
        let mut store = LeafVoxels::dense();
        let result = store.store(region, 8, VoxelSample::colored(IVec3::new(-1, 0, 0), 1));
        assert!(matches!(result, Err(SvoError::OutOfBounds { .. })));
        assert!(!store.is_allocated());
    }

    #[test]
    fn test_new_large_leaf_is_bucket() {
        let node = OctreeNode::new(IVec3::ZERO, 64, true, 8).unwrap();
        assert!(matches!(node.voxels(), Some(LeafVoxels::Bucket(_))));
    }

    #[test]
    fn test_new_internal() {
        let node = OctreeNode::new(IVec3::ZERO, 16, false, 8).unwrap();
        assert!(!node.is_leaf());
        assert_eq!(node.first_child(), None);
        assert_eq!(node.child_mask(), 0);
        assert_eq!(node.voxel_count(), 0);
    }

    #[test]
    fn test_internal_at_leaf_size_rejected() {
        let result = OctreeNode::new(IVec3::ZERO, 8, false, 8);
        assert!(matches!(result, Err(SvoError::InvalidNode(_))));
    }

    #[test]
    fn test_non_power_of_two_rejected() {
        assert!(OctreeNode::new(IVec3::ZERO, 12, true, 8).is_err());
        assert!(OctreeNode::new(IVec3::ZERO, 0, true, 8).is_err());
    }

    #[test]
    fn test_dense_store_last_write_wins() {
        let region = Region::new(IVec3::new(8, 0, 0), 8);
        let mut store = LeafVoxels::dense();
        let pos = IVec3::new(9, 2, 3);
        store.store(region, 8, VoxelSample::colored(pos, 1)).unwrap();
        store.store(region, 8, VoxelSample::colored(pos, 2)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().unwrap().color, 2);
    }

    #[test]
    fn test_dense_store_rejects_outside_offset() {
        let region = Region::new(IVec3::ZERO, 8);
        let mut store = LeafVoxels::dense();
        let result = store.store(region, 8, VoxelSample::colored(IVec3::new(8, 0, 0), 1));
        assert!(matches!(result, Err(SvoError::OutOfBounds { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_bucket_store_replaces_same_position() {
        let region = Region::new(IVec3::ZERO, 64);
        let mut store = LeafVoxels::Bucket(Vec::new());
        store.store(region, 8, VoxelSample::colored(IVec3::ONE, 1)).unwrap();
        store.store(region, 8, VoxelSample::colored(IVec3::splat(2), 5)).unwrap();
        store.store(region, 8, VoxelSample::colored(IVec3::ONE, 3)).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.holds(IVec3::ONE));
        let colors: Vec<u32> = store.iter().map(|s| s.color).collect();
        assert_eq!(colors, vec![3, 5]);
    }
}
