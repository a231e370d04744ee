pub mod config;
pub mod core;
pub mod error;
pub mod field;
pub mod flat;
pub mod gpu;
pub mod io;

pub use config::{Discipline, Fanout, SvoConfig};
pub use crate::core::{
    pack_rgba, unpack_rgba, InsertReport, LeafVoxels, NodeId, NodeKind, Octree, OctreeNode,
    Region, VoxelSample, EMPTY_COLOR, OCTANT_POSITIONS,
};
pub use error::{Result, SvoError};
pub use field::{FieldOptions, Placement, VoxelField};
pub use flat::{
    encode_nodes, encode_voxels, BufferLayout, FlatNode, FlatStats, FlatSvo, FlatVoxel,
    RecordLayout,
};
pub use gpu::{GpuNode, GpuVoxel};
pub use io::{parse, parse_bytes, ParsedModel, VoxChunk, VoxError};

// Re-export glam for convenience
pub use glam;
