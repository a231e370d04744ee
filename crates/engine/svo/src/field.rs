//! Voxel field: decoded models placed into a bounded volume
//!
//! The field resolves palette indices to packed colors, estimates surface
//! normals and produces the deterministic sample stream fed to the octree.

use crate::core::VoxelSample;
use crate::io::ParsedModel;
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Default edge length of the field volume
pub const DEFAULT_DIM: i32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    /// Edge length of the volume `[0, dim)³`
    pub dim: i32,
    /// Drop voxels whose 6 face neighbours are all solid
    pub cull_interior: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            cull_interior: false,
        }
    }
}

/// Outcome of placing a model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    pub placed: usize,
    /// Voxels that landed outside the volume
    pub clipped: usize,
    /// Voxels whose palette color is the empty sentinel
    pub transparent: usize,
}

/// Sparse voxel volume keyed by position
#[derive(Debug, Clone, Default)]
pub struct VoxelField {
    options: FieldOptions,
    cells: HashMap<IVec3, u32>,
}

impl VoxelField {
    pub fn new(options: FieldOptions) -> Self {
        Self {
            options,
            cells: HashMap::new(),
        }
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, pos: IVec3) -> bool {
        pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(self.options.dim)).all()
    }

    /// Set a voxel, overwriting any previous color. Returns false when `pos`
    /// lies outside the volume or `color` is empty.
    pub fn set(&mut self, pos: IVec3, color: u32) -> bool {
        if !self.in_bounds(pos) || color == 0 {
            return false;
        }
        self.cells.insert(pos, color);
        true
    }

    pub fn get(&self, pos: IVec3) -> Option<u32> {
        self.cells.get(&pos).copied()
    }

    /// Place every chunk of `model` with its minimum corner at `offset`.
    ///
    /// Overlapping chunks are last-write-wins in chunk order.
    pub fn place_model(&mut self, model: &ParsedModel, offset: IVec3) -> Placement {
        let mut placement = Placement::default();
        for chunk in &model.chunks {
            let base = offset + chunk.offset;
            for (local, palette_index) in chunk.iter_active() {
                let pos = base + local.as_ivec3();
                let color = model.color(palette_index);
                if color == 0 {
                    placement.transparent += 1;
                } else if self.set(pos, color) {
                    placement.placed += 1;
                } else {
                    placement.clipped += 1;
                }
            }
        }

        if placement.clipped > 0 {
            warn!(
                "Clipped {} voxels outside the {}³ volume",
                placement.clipped, self.options.dim
            );
        }
        debug!(
            "Placed {} voxels at offset {} ({} transparent)",
            placement.placed, offset, placement.transparent
        );
        placement
    }

    #[inline]
    fn is_solid(&self, pos: IVec3) -> bool {
        self.cells.contains_key(&pos)
    }

    /// Whether every face neighbour of `pos` is solid
    pub fn is_interior(&self, pos: IVec3) -> bool {
        FACE_NEIGHBORS
            .iter()
            .all(|offset| self.is_solid(pos + *offset))
    }

    /// Surface normal estimated as the normalized sum of directions towards
    /// empty neighbours among the 26 surrounding cells. Cells outside the
    /// volume count as empty. Zero when the neighbourhood is balanced.
    pub fn normal_at(&self, pos: IVec3) -> Vec3 {
        let mut sum = IVec3::ZERO;
        for z in -1..=1 {
            for y in -1..=1 {
                for x in -1..=1 {
                    let offset = IVec3::new(x, y, z);
                    if offset != IVec3::ZERO && !self.is_solid(pos + offset) {
                        sum += offset;
                    }
                }
            }
        }
        sum.as_vec3().normalize_or_zero()
    }

    /// Sample stream ordered by z, then y, then x
    pub fn samples(&self) -> Vec<VoxelSample> {
        let mut positions: Vec<IVec3> = self.cells.keys().copied().collect();
        positions.sort_unstable_by_key(|pos| (pos.z, pos.y, pos.x));

        let total = positions.len();
        let samples: Vec<VoxelSample> = positions
            .into_iter()
            .filter(|pos| !(self.options.cull_interior && self.is_interior(*pos)))
            .map(|pos| VoxelSample::new(pos, self.cells[&pos], self.normal_at(pos)))
            .collect();

        if samples.len() < total {
            debug!("Culled {} interior voxels", total - samples.len());
        }
        samples
    }
}

const FACE_NEIGHBORS: [IVec3; 6] = [
    IVec3::new(-1, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, -1),
    IVec3::new(0, 0, 1),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_bytes;
    use crate::io::vox::VoxBuilder;

    fn solid_cube(field: &mut VoxelField, min: i32, max: i32, color: u32) {
        for z in min..max {
            for y in min..max {
                for x in min..max {
                    field.set(IVec3::new(x, y, z), color);
                }
            }
        }
    }

    #[test]
    fn test_set_bounds() {
        let mut field = VoxelField::new(FieldOptions {
            dim: 8,
            cull_interior: false,
        });
        assert!(field.set(IVec3::new(7, 7, 7), 1));
        assert!(!field.set(IVec3::new(8, 0, 0), 1));
        assert!(!field.set(IVec3::new(-1, 0, 0), 1));
        assert!(!field.set(IVec3::new(1, 1, 1), 0));
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn test_place_model_offsets_and_clips() {
        let bytes = VoxBuilder::default()
            .model([2, 2, 2], &[[0, 0, 0, 1], [1, 1, 1, 2]])
            .palette(&[[255, 0, 0, 255], [0, 0, 255, 255]])
            .build();
        let model = parse_bytes(&bytes).unwrap();

        let mut field = VoxelField::new(FieldOptions {
            dim: 4,
            cull_interior: false,
        });
        let placement = field.place_model(&model, IVec3::new(3, 0, 0));
        assert_eq!(placement.placed, 1);
        assert_eq!(placement.clipped, 1);
        assert_eq!(field.get(IVec3::new(3, 0, 0)), Some(0xFF0000FF));
    }

    #[test]
    fn test_place_model_skips_transparent_palette_entries() {
        let bytes = VoxBuilder::default()
            .model([1, 1, 1], &[[0, 0, 0, 1]])
            .palette(&[[0, 0, 0, 0]])
            .build();
        let model = parse_bytes(&bytes).unwrap();
        let mut field = VoxelField::new(FieldOptions::default());
        let placement = field.place_model(&model, IVec3::ZERO);
        assert_eq!(placement.transparent, 1);
        assert!(field.is_empty());
    }

    #[test]
    fn test_normal_of_isolated_voxel_is_zero() {
        let mut field = VoxelField::new(FieldOptions::default());
        field.set(IVec3::splat(5), 1);
        assert_eq!(field.normal_at(IVec3::splat(5)), Vec3::ZERO);
    }

    #[test]
    fn test_normal_points_away_from_slab() {
        let mut field = VoxelField::new(FieldOptions::default());
        for z in 0..5 {
            for x in 0..5 {
                field.set(IVec3::new(x, 1, z), 1);
                field.set(IVec3::new(x, 2, z), 1);
            }
        }
        let normal = field.normal_at(IVec3::new(2, 2, 2));
        assert!((normal - Vec3::Y).length() < 1e-6, "{normal}");
        let normal = field.normal_at(IVec3::new(2, 1, 2));
        assert!((normal + Vec3::Y).length() < 1e-6, "{normal}");
    }

    #[test]
    fn test_samples_sorted_z_y_x() {
        let mut field = VoxelField::new(FieldOptions::default());
        field.set(IVec3::new(5, 0, 1), 1);
        field.set(IVec3::new(0, 3, 0), 2);
        field.set(IVec3::new(1, 0, 0), 3);
        let order: Vec<IVec3> = field.samples().iter().map(|s| s.position).collect();
        assert_eq!(
            order,
            vec![IVec3::new(1, 0, 0), IVec3::new(0, 3, 0), IVec3::new(5, 0, 1)]
        );
    }

    #[test]
    fn test_cull_interior() {
        let mut field = VoxelField::new(FieldOptions {
            dim: 16,
            cull_interior: true,
        });
        solid_cube(&mut field, 1, 4, 7);
        assert_eq!(field.len(), 27);
        assert!(field.is_interior(IVec3::splat(2)));

        let samples = field.samples();
        assert_eq!(samples.len(), 26);
        assert!(samples.iter().all(|s| s.position != IVec3::splat(2)));
    }

    #[test]
    fn test_volume_border_is_not_interior() {
        let mut field = VoxelField::new(FieldOptions {
            dim: 3,
            cull_interior: true,
        });
        solid_cube(&mut field, 0, 3, 7);
        // The center is interior; corners touch the outside of the volume
        assert!(field.is_interior(IVec3::ONE));
        assert!(!field.is_interior(IVec3::ZERO));
        assert_eq!(field.samples().len(), 26);
    }
}
