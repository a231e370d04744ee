//! Byte encoding of flat records for GPU storage buffers
//!
//! Field offsets and record stride follow a [`BufferLayout`], so the same flat
//! arrays can feed consumers with different alignment rules. All values are
//! written little-endian; padding bytes are zero.

use super::{FlatNode, FlatVoxel};
use crate::error::{Result, SvoError};
use serde::{Deserialize, Serialize};

/// Alignment rules of the consuming buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLayout {
    /// Alignment of 3-component vectors in bytes
    pub vec3_align: usize,
    /// Whether 3-component vectors occupy 16 bytes instead of 12
    pub vec3_as_vec4: bool,
    /// Minimum alignment of a whole record; the stride is rounded up to it
    pub struct_align: usize,
}

impl BufferLayout {
    /// GLSL `std430` storage buffer rules
    pub const STD430: BufferLayout = BufferLayout {
        vec3_align: 16,
        vec3_as_vec4: false,
        struct_align: 16,
    };

    /// Tight packing with scalars at their natural alignment
    pub const SCALAR: BufferLayout = BufferLayout {
        vec3_align: 4,
        vec3_as_vec4: false,
        struct_align: 4,
    };

    pub fn validate(&self) -> Result<()> {
        if !self.vec3_align.is_power_of_two() || self.vec3_align < 4 {
            return Err(SvoError::InvalidConfig(format!(
                "vec3_align must be a power of two >= 4, got {}",
                self.vec3_align
            )));
        }
        if !self.struct_align.is_power_of_two() {
            return Err(SvoError::InvalidConfig(format!(
                "struct_align must be a power of two, got {}",
                self.struct_align
            )));
        }
        Ok(())
    }

    /// Byte layout of one [`FlatNode`] record
    pub fn node_record(&self) -> RecordLayout {
        RecordLayout::new(&NODE_FIELDS, self)
    }

    /// Byte layout of one [`FlatVoxel`] record
    pub fn voxel_record(&self) -> RecordLayout {
        RecordLayout::new(&VOXEL_FIELDS, self)
    }
}

impl Default for BufferLayout {
    fn default() -> Self {
        Self::STD430
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Vec3,
    U32,
    U64,
    U32Array(usize),
}

impl Field {
    /// (size, alignment) in bytes
    fn size_align(self, layout: &BufferLayout) -> (usize, usize) {
        match self {
            Field::Vec3 if layout.vec3_as_vec4 => (16, layout.vec3_align),
            Field::Vec3 => (12, layout.vec3_align),
            Field::U32 => (4, 4),
            Field::U64 => (8, 8),
            Field::U32Array(len) => (4 * len, 4),
        }
    }
}

// origin, scale, child_mask, child_offset, voxel_index, voxel_count
const NODE_FIELDS: [Field; 6] = [
    Field::Vec3,
    Field::U32,
    Field::U64,
    Field::U32,
    Field::U32,
    Field::U32,
];

// position, color, normal, light, accum_count
const VOXEL_FIELDS: [Field; 5] = [
    Field::Vec3,
    Field::U32,
    Field::Vec3,
    Field::U32Array(3),
    Field::U32,
];

/// Field offsets and stride of one record type under a layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub offsets: Vec<usize>,
    pub stride: usize,
}

impl RecordLayout {
    fn new(fields: &[Field], layout: &BufferLayout) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut cursor = 0;
        let mut max_align = layout.struct_align.max(1);

        for field in fields {
            let (size, align) = field.size_align(layout);
            cursor = align_up(cursor, align);
            offsets.push(cursor);
            cursor += size;
            max_align = max_align.max(align);
        }

        Self {
            offsets,
            stride: align_up(cursor, max_align),
        }
    }
}

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Writes fields of consecutive records into a zero-filled buffer
struct RecordWriter<'a> {
    buffer: Vec<u8>,
    record: &'a RecordLayout,
    base: usize,
}

impl<'a> RecordWriter<'a> {
    fn new(record: &'a RecordLayout, count: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(record.stride * count),
            record,
            base: 0,
        }
    }

    fn begin(&mut self) {
        self.base = self.buffer.len();
        self.buffer.resize(self.base + self.record.stride, 0);
    }

    fn put(&mut self, field: usize, bytes: &[u8]) {
        let start = self.base + self.record.offsets[field];
        self.buffer[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn put_u32s(&mut self, field: usize, values: &[u32]) {
        let start = self.base + self.record.offsets[field];
        for (i, value) in values.iter().enumerate() {
            let at = start + i * 4;
            self.buffer[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Encode flat nodes as consecutive records of `layout.node_record().stride` bytes
pub fn encode_nodes(nodes: &[FlatNode], layout: &BufferLayout) -> Vec<u8> {
    let record = layout.node_record();
    let mut writer = RecordWriter::new(&record, nodes.len());
    for node in nodes {
        writer.begin();
        writer.put_u32s(0, &node.origin.to_array().map(|v| v as u32));
        writer.put(1, &node.scale.to_le_bytes());
        writer.put(2, &node.child_mask.to_le_bytes());
        writer.put(3, &node.child_offset.to_le_bytes());
        writer.put(4, &node.voxel_index.to_le_bytes());
        writer.put(5, &node.voxel_count.to_le_bytes());
    }
    writer.finish()
}

/// Encode flat voxels as consecutive records of `layout.voxel_record().stride` bytes
pub fn encode_voxels(voxels: &[FlatVoxel], layout: &BufferLayout) -> Vec<u8> {
    let record = layout.voxel_record();
    let mut writer = RecordWriter::new(&record, voxels.len());
    for voxel in voxels {
        writer.begin();
        writer.put_u32s(0, &voxel.position.to_array().map(|v| v as u32));
        writer.put(1, &voxel.color.to_le_bytes());
        writer.put_u32s(2, &voxel.normal.to_array().map(f32::to_bits));
        writer.put_u32s(3, &voxel.light);
        writer.put(4, &voxel.accum_count.to_le_bytes());
    }
    writer.finish()
}
