// Input: voxel model decoding

pub mod vox;

// Re-export main types and functions
pub use vox::{parse, parse_bytes, ParsedModel, VoxChunk, VoxError};
