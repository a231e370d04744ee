// Core octree data structures

pub mod node;
pub mod octree;
pub mod region;
pub mod sample;

// Re-export main types
pub use node::{LeafVoxels, NodeId, NodeKind, OctreeNode};
pub use octree::{InsertReport, Octree};
pub use region::{slot_index, slot_position, Region, OCTANT_POSITIONS};
pub use sample::{pack_rgba, unpack_rgba, VoxelSample, EMPTY_COLOR};
