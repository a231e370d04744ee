use super::{FlatNode, FlatSvo, FlatVoxel};
use crate::core::{NodeId, Octree};
use std::collections::VecDeque;
use tracing::info;

impl Octree {
    /// Serialize the tree breadth-first into flat node and voxel arrays.
    ///
    /// The root is written at index 0. Each internal node with allocated
    /// children reserves a block of `fanout` records at the current end of the
    /// node array, so siblings are contiguous and slot `i` sits at
    /// `child_offset + i` whether or not its mask bit is set.
    pub fn flatten(&self) -> FlatSvo {
        let fanout = self.config().fanout;
        let root = self.root();
        let mut nodes = vec![FlatNode {
            origin: root.region.origin,
            scale: root.region.scale,
            ..Default::default()
        }];
        let mut voxels = Vec::new();
        let mut queue = VecDeque::from([(NodeId::ROOT, 0usize)]);

        while let Some((id, flat_index)) = queue.pop_front() {
            let node = self.node(id);

            if let Some(store) = node.voxels() {
                let start = voxels.len();
                voxels.extend(store.iter().map(|sample| FlatVoxel {
                    position: sample.position,
                    color: sample.color,
                    normal: sample.normal,
                    ..Default::default()
                }));
                if voxels.len() > start {
                    let record = &mut nodes[flat_index];
                    record.voxel_index = start as u32;
                    record.voxel_count = (voxels.len() - start) as u32;
                }
                continue;
            }

            if node.first_child().is_none() {
                continue;
            }

            let child_offset = nodes.len();
            nodes.resize(child_offset + fanout.count(), FlatNode::default());

            let mut child_mask = 0u64;
            for (slot, child_id) in self.children(id).enumerate() {
                let child = self.node(child_id);
                if child.occupied {
                    child_mask |= 1u64 << slot;
                }
                let record = &mut nodes[child_offset + slot];
                record.origin = child.region.origin;
                record.scale = child.region.scale;
                queue.push_back((child_id, child_offset + slot));
            }

            let record = &mut nodes[flat_index];
            record.child_mask = child_mask;
            record.child_offset = child_offset as u32;
        }

        info!(
            "Flattened octree: {} nodes, {} voxels",
            nodes.len(),
            voxels.len()
        );
        FlatSvo {
            nodes,
            voxels,
            fanout,
        }
    }
}
