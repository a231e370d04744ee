use glam::{IVec3, Vec3};

/// Packed color value reserved for "no voxel"
pub const EMPTY_COLOR: u32 = 0;

/// One voxel handed to the octree: grid position, packed color and surface normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelSample {
    pub position: IVec3,
    /// Packed RGBA (`r << 24 | g << 16 | b << 8 | a`); 0 means empty
    pub color: u32,
    /// Unit length, or zero when no direction could be estimated
    pub normal: Vec3,
}

impl VoxelSample {
    pub fn new(position: IVec3, color: u32, normal: Vec3) -> Self {
        Self {
            position,
            color,
            normal,
        }
    }

    /// Sample without normal information
    pub fn colored(position: IVec3, color: u32) -> Self {
        Self::new(position, color, Vec3::ZERO)
    }

    /// Unoccupied slot placeholder
    pub const EMPTY: Self = Self {
        position: IVec3::ZERO,
        color: EMPTY_COLOR,
        normal: Vec3::ZERO,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color == EMPTY_COLOR
    }
}

impl Default for VoxelSample {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Pack 8-bit channels into the color layout used by [`VoxelSample::color`]
#[inline]
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32
}

/// Inverse of [`pack_rgba`]
#[inline]
pub fn unpack_rgba(color: u32) -> [u8; 4] {
    color.to_be_bytes()
}
