//! Typed GPU mirrors of the flat records in the `std430` layout
//!
//! `bytemuck::cast_slice` over these yields the same bytes as
//! [`FlatSvo::encode_nodes`](crate::FlatSvo::encode_nodes) with
//! [`BufferLayout::STD430`](crate::BufferLayout::STD430).

use crate::flat::{FlatNode, FlatSvo, FlatVoxel};
use bytemuck::{Pod, Zeroable};

/// GPU octree node (48 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuNode {
    pub origin: [i32; 3],
    pub scale: i32,
    pub child_mask: u64,
    pub child_offset: u32,
    pub voxel_index: u32,
    pub voxel_count: u32,
    pub _pad: [u32; 3],
}

/// GPU voxel (48 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuVoxel {
    pub position: [i32; 3],
    pub color: u32,
    pub normal: [f32; 3],
    pub light: [u32; 3],
    pub accum_count: u32,
    pub _pad: [u32; 1],
}

impl From<&FlatNode> for GpuNode {
    fn from(node: &FlatNode) -> Self {
        Self {
            origin: node.origin.to_array(),
            scale: node.scale,
            child_mask: node.child_mask,
            child_offset: node.child_offset,
            voxel_index: node.voxel_index,
            voxel_count: node.voxel_count,
            _pad: [0; 3],
        }
    }
}

impl From<&FlatVoxel> for GpuVoxel {
    fn from(voxel: &FlatVoxel) -> Self {
        Self {
            position: voxel.position.to_array(),
            color: voxel.color,
            normal: voxel.normal.to_array(),
            light: voxel.light,
            accum_count: voxel.accum_count,
            _pad: [0; 1],
        }
    }
}

impl FlatSvo {
    pub fn gpu_nodes(&self) -> Vec<GpuNode> {
        self.nodes.iter().map(GpuNode::from).collect()
    }

    pub fn gpu_voxels(&self) -> Vec<GpuVoxel> {
        self.voxels.iter().map(GpuVoxel::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SvoConfig;
    use crate::core::{Octree, VoxelSample};
    use crate::flat::BufferLayout;
    use glam::{IVec3, Vec3};

    #[test]
    fn test_gpu_struct_sizes_match_std430_strides() {
        assert_eq!(
            std::mem::size_of::<GpuNode>(),
            BufferLayout::STD430.node_record().stride
        );
        assert_eq!(
            std::mem::size_of::<GpuVoxel>(),
            BufferLayout::STD430.voxel_record().stride
        );
    }

    #[test]
    fn test_cast_slice_equals_std430_encoding() {
        let mut tree = Octree::new(SvoConfig::new(32, 8)).unwrap();
        tree.insert(VoxelSample::new(
            IVec3::new(3, 20, 31),
            0x336699FF,
            Vec3::new(0.0, 0.0, 1.0),
        ))
        .unwrap();
        tree.insert(VoxelSample::colored(IVec3::new(30, 1, 2), 0x10203040))
            .unwrap();
        let flat = tree.flatten();

        let nodes = flat.gpu_nodes();
        let voxels = flat.gpu_voxels();
        assert_eq!(
            bytemuck::cast_slice::<GpuNode, u8>(&nodes),
            flat.encode_nodes(&BufferLayout::STD430).as_slice()
        );
        assert_eq!(
            bytemuck::cast_slice::<GpuVoxel, u8>(&voxels),
            flat.encode_voxels(&BufferLayout::STD430).as_slice()
        );
    }
}
