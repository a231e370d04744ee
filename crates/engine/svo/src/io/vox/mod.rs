// MagicaVoxel .vox decoding

mod loader;

pub use loader::{parse, parse_bytes, ParsedModel, VoxChunk, VoxError};

#[cfg(test)]
pub(crate) use loader::tests::VoxBuilder;
