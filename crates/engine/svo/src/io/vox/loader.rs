use crate::core::pack_rgba;
use dot_vox::{DotVoxData, SceneNode};
use glam::{IVec3, UVec3};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Scene graphs nested deeper than this are rejected as malformed
const MAX_SCENE_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum VoxError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse .vox data: {0}")]
    Parse(String),

    #[error("No models found in .vox data")]
    NoModels,

    #[error("Scene references missing model {0}")]
    ModelNotFound(u32),
}

/// One placed model of a `.vox` file, in Y-up coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct VoxChunk {
    /// Extent along x, y (up) and z
    pub size: UVec3,
    /// Minimum corner inside the model
    pub offset: IVec3,
    /// Palette index per cell, `x + y*size.x + z*size.x*size.y`
    pub cells: Vec<Option<u8>>,
}

impl VoxChunk {
    fn new(size: UVec3, offset: IVec3) -> Self {
        Self {
            size,
            offset,
            cells: vec![None; (size.x * size.y * size.z) as usize],
        }
    }

    #[inline]
    fn cell_index(&self, local: UVec3) -> Option<usize> {
        if local.x >= self.size.x || local.y >= self.size.y || local.z >= self.size.z {
            return None;
        }
        Some((local.x + local.y * self.size.x + local.z * self.size.x * self.size.y) as usize)
    }

    /// Palette index of the cell at `local`, `None` when inactive or outside
    pub fn get(&self, local: UVec3) -> Option<u8> {
        self.cell_index(local).and_then(|index| self.cells[index])
    }

    /// Active cells as (local position, palette index)
    pub fn iter_active(&self) -> impl Iterator<Item = (UVec3, u8)> + '_ {
        let (sx, sy) = (self.size.x, self.size.y);
        self.cells.iter().enumerate().filter_map(move |(index, cell)| {
            let index = index as u32;
            let local = UVec3::new(index % sx, (index / sx) % sy, index / (sx * sy));
            cell.map(|palette_index| (local, palette_index))
        })
    }

    /// Number of active cells
    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }
}

/// Decoded `.vox` file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModel {
    pub chunks: Vec<VoxChunk>,
    /// Packed RGBA per palette index
    pub palette: [u32; 256],
    /// Extent of all placed chunks
    pub size: UVec3,
}

impl ParsedModel {
    /// Packed color of a palette index
    #[inline]
    pub fn color(&self, palette_index: u8) -> u32 {
        self.palette[palette_index as usize]
    }
}

/// Read and decode a MagicaVoxel `.vox` file
pub fn parse<P: AsRef<Path>>(path: P) -> Result<ParsedModel, VoxError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| VoxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model = parse_bytes(&bytes)?;
    info!(
        "Loaded {}: {} chunks, size {}",
        path.display(),
        model.chunks.len(),
        model.size
    );
    Ok(model)
}

/// Decode a MagicaVoxel `.vox` file from memory
///
/// MagicaVoxel is Z-up; chunks are converted so that the file's Z axis
/// becomes our Y axis. Chunk offsets come from the scene graph translations and
/// are shifted so the smallest offset is zero on every axis. Files without a
/// scene graph place every model at the origin.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedModel, VoxError> {
    let data = dot_vox::load_bytes(bytes).map_err(|e| VoxError::Parse(e.to_string()))?;
    if data.models.is_empty() {
        return Err(VoxError::NoModels);
    }

    let palette = convert_palette(&data);
    let instances = if data.scenes.is_empty() {
        (0..data.models.len() as u32)
            .map(|model_id| (model_id, None))
            .collect()
    } else {
        let mut instances = Vec::new();
        collect_instances(&data, 0, IVec3::ZERO, 0, &mut instances)?;
        instances
    };

    let mut chunks = Vec::with_capacity(instances.len());
    for (model_id, translation) in instances {
        let model = data
            .models
            .get(model_id as usize)
            .ok_or(VoxError::ModelNotFound(model_id))?;

        // MagicaVoxel (x, y, z) -> ours (x, z, y)
        let size = UVec3::new(model.size.x, model.size.z, model.size.y);
        // Translations name the model's center
        let offset = translation.map_or(IVec3::ZERO, |t| t - (size / 2).as_ivec3());

        let mut chunk = VoxChunk::new(size, offset);
        for voxel in &model.voxels {
            let local = UVec3::new(voxel.x as u32, voxel.z as u32, voxel.y as u32);
            if let Some(index) = chunk.cell_index(local) {
                chunk.cells[index] = Some(voxel.i);
            }
        }
        debug!(
            "Model {} placed at {} with size {} and {} voxels",
            model_id,
            offset,
            size,
            model.voxels.len()
        );
        chunks.push(chunk);
    }

    let min = chunks
        .iter()
        .map(|chunk| chunk.offset)
        .reduce(IVec3::min)
        .unwrap_or(IVec3::ZERO);
    let mut size = UVec3::ZERO;
    for chunk in &mut chunks {
        chunk.offset -= min;
        size = size.max((chunk.offset + chunk.size.as_ivec3()).as_uvec3());
    }

    Ok(ParsedModel {
        chunks,
        palette,
        size,
    })
}

/// Pack the file palette, padding missing entries with a gray ramp
fn convert_palette(data: &DotVoxData) -> [u32; 256] {
    let mut palette = [0u32; 256];
    for (index, entry) in palette.iter_mut().enumerate() {
        *entry = match data.palette.get(index) {
            Some(color) => pack_rgba(color.r, color.g, color.b, color.a),
            None => {
                let level = index as u8;
                pack_rgba(level, level, level, 255)
            }
        };
    }
    palette
}

/// Walk the scene graph accumulating transform translations, collecting
/// `(model id, translation)` for every shape
fn collect_instances(
    data: &DotVoxData,
    node: u32,
    translation: IVec3,
    depth: usize,
    out: &mut Vec<(u32, Option<IVec3>)>,
) -> Result<(), VoxError> {
    if depth > MAX_SCENE_DEPTH {
        return Err(VoxError::Parse(format!(
            "scene graph deeper than {MAX_SCENE_DEPTH} levels"
        )));
    }
    let scene = data
        .scenes
        .get(node as usize)
        .ok_or_else(|| VoxError::Parse(format!("scene references missing node {node}")))?;

    match scene {
        SceneNode::Transform { frames, child, .. } => {
            let local = match frames.first().and_then(|frame| frame.attributes.get("_t")) {
                Some(value) => parse_translation(value)?,
                None => IVec3::ZERO,
            };
            collect_instances(data, *child, translation + local, depth + 1, out)
        }
        SceneNode::Group { children, .. } => {
            for child in children {
                collect_instances(data, *child, translation, depth + 1, out)?;
            }
            Ok(())
        }
        SceneNode::Shape { models, .. } => {
            for shape in models {
                out.push((shape.model_id, Some(translation)));
            }
            Ok(())
        }
    }
}

/// Parse a `"x y z"` translation attribute into Y-up coordinates
fn parse_translation(value: &str) -> Result<IVec3, VoxError> {
    let parts = value
        .split_whitespace()
        .map(str::parse::<i32>)
        .collect::<Result<Vec<i32>, _>>()
        .map_err(|e| VoxError::Parse(format!("invalid translation {value:?}: {e}")))?;
    match parts.as_slice() {
        [x, y, z] => Ok(IVec3::new(*x, *z, *y)),
        _ => Err(VoxError::Parse(format!(
            "translation {value:?} does not have 3 components"
        ))),
    }
}
