// Pointer-free octree representation for GPU upload

mod flatten;
pub mod layout;

pub use layout::{encode_nodes, encode_voxels, BufferLayout, RecordLayout};

use crate::config::Fanout;
use crate::core::Region;
use glam::{IVec3, Vec3};

/// Serialized node. Children of an internal node occupy
/// `child_offset..child_offset + fanout`, slot `i` at `child_offset + i`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlatNode {
    pub origin: IVec3,
    pub scale: i32,
    /// Bit `i` set iff child slot `i` holds samples
    pub child_mask: u64,
    pub child_offset: u32,
    pub voxel_index: u32,
    pub voxel_count: u32,
}

impl FlatNode {
    #[inline]
    pub fn region(&self) -> Region {
        Region::new(self.origin, self.scale)
    }

    #[inline]
    pub fn has_child(&self, slot: usize) -> bool {
        self.child_mask & (1u64 << slot) != 0
    }
}

/// Serialized voxel with accumulation fields reserved for the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlatVoxel {
    pub position: IVec3,
    pub color: u32,
    pub normal: Vec3,
    pub light: [u32; 3],
    pub accum_count: u32,
}

/// Flat node and voxel arrays produced by [`crate::Octree::flatten`]
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSvo {
    pub nodes: Vec<FlatNode>,
    pub voxels: Vec<FlatVoxel>,
    pub fanout: Fanout,
}

/// Sizes of a flattened tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatStats {
    pub nodes: usize,
    /// Nodes referencing at least one voxel
    pub leaves: usize,
    pub voxels: usize,
    pub node_bytes: usize,
    pub voxel_bytes: usize,
}

impl FlatSvo {
    /// Look up the voxel stored at `pos` by walking the flat arrays from the root,
    /// following `child_mask`/`child_offset` and scanning the leaf's voxel range.
    pub fn find_voxel(&self, pos: IVec3) -> Option<&FlatVoxel> {
        let mut index = 0usize;
        loop {
            let node = self.nodes.get(index)?;
            let region = node.region();
            if !region.contains(pos) {
                return None;
            }

            if node.voxel_count > 0 {
                let start = node.voxel_index as usize;
                let end = start + node.voxel_count as usize;
                return self
                    .voxels
                    .get(start..end)?
                    .iter()
                    .find(|voxel| voxel.position == pos);
            }

            let slot = region.child_slot(pos, self.fanout);
            if !node.has_child(slot) {
                return None;
            }
            index = node.child_offset as usize + slot;
        }
    }

    pub fn stats(&self, layout: &BufferLayout) -> FlatStats {
        FlatStats {
            nodes: self.nodes.len(),
            leaves: self.nodes.iter().filter(|n| n.voxel_count > 0).count(),
            voxels: self.voxels.len(),
            node_bytes: self.nodes.len() * layout.node_record().stride,
            voxel_bytes: self.voxels.len() * layout.voxel_record().stride,
        }
    }

    /// Encoded node buffer
    pub fn encode_nodes(&self, layout: &BufferLayout) -> Vec<u8> {
        encode_nodes(&self.nodes, layout)
    }

    /// Encoded voxel buffer
    pub fn encode_voxels(&self, layout: &BufferLayout) -> Vec<u8> {
        encode_voxels(&self.voxels, layout)
    }
}
