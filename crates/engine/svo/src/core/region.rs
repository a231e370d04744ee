// Axis-aligned cubic regions and child slot arithmetic

use crate::config::Fanout;
use glam::IVec3;

/// Pre-computed octant positions for 8-way fan-out
/// Octant indexing: index = x + y*2 + z*4
pub const OCTANT_POSITIONS: [IVec3; 8] = [
    IVec3::new(0, 0, 0), // 0: x=0,y=0,z=0
    IVec3::new(1, 0, 0), // 1: x=1,y=0,z=0
    IVec3::new(0, 1, 0), // 2: x=0,y=1,z=0
    IVec3::new(1, 1, 0), // 3: x=1,y=1,z=0
    IVec3::new(0, 0, 1), // 4: x=0,y=0,z=1
    IVec3::new(1, 0, 1), // 5: x=1,y=0,z=1
    IVec3::new(0, 1, 1), // 6: x=0,y=1,z=1
    IVec3::new(1, 1, 1), // 7: x=1,y=1,z=1
];

/// Cubic region `[origin, origin + scale)` of the voxel grid
///
/// Every slot computation in the crate goes through [`Region::child_slot`] and
/// [`Region::child`], so insertion, flattening and flat lookups agree on the
/// spatial meaning of a child index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Minimum corner
    pub origin: IVec3,
    /// Edge length
    pub scale: i32,
}

impl Region {
    pub fn new(origin: IVec3, scale: i32) -> Self {
        Self { origin, scale }
    }

    /// Maximum corner (exclusive)
    #[inline]
    pub fn max(&self) -> IVec3 {
        self.origin + IVec3::splat(self.scale)
    }

    /// Half-open containment test on every axis
    #[inline]
    pub fn contains(&self, pos: IVec3) -> bool {
        let max = self.max();
        pos.x >= self.origin.x
            && pos.x < max.x
            && pos.y >= self.origin.y
            && pos.y < max.y
            && pos.z >= self.origin.z
            && pos.z < max.z
    }

    /// Edge length of each child under the given fan-out
    #[inline]
    pub fn child_scale(&self, fanout: Fanout) -> i32 {
        self.scale / fanout.per_axis()
    }

    /// Child slot holding `pos`: `x + y*k + z*k*k` with `k` children per axis.
    ///
    /// Components are clamped into `[0, k)` so positions on the region boundary
    /// never produce an out-of-range slot.
    #[inline]
    pub fn child_slot(&self, pos: IVec3, fanout: Fanout) -> usize {
        let k = fanout.per_axis();
        let local = ((pos - self.origin) / self.child_scale(fanout)).clamp(
            IVec3::ZERO,
            IVec3::splat(k - 1),
        );
        slot_index(local, k)
    }

    /// Region covered by child `slot`
    #[inline]
    pub fn child(&self, slot: usize, fanout: Fanout) -> Region {
        let child_scale = self.child_scale(fanout);
        let cell = match fanout {
            Fanout::Octants => OCTANT_POSITIONS[slot & 7],
            Fanout::Quartics => slot_position(slot, 4),
        };
        Region::new(self.origin + cell * child_scale, child_scale)
    }

    /// Iterate over all child regions in slot order
    pub fn children(&self, fanout: Fanout) -> impl Iterator<Item = Region> + '_ {
        (0..fanout.count()).map(move |slot| self.child(slot, fanout))
    }

    /// Flat index of `pos` inside a dense leaf store with `leaf_size` stride.
    ///
    /// Returns `None` when the offset falls outside `[0, leaf_size)` on any axis.
    #[inline]
    pub fn local_index(&self, pos: IVec3, leaf_size: i32) -> Option<usize> {
        let local = pos - self.origin;
        let in_range = |v: i32| (0..leaf_size).contains(&v);
        if !(in_range(local.x) && in_range(local.y) && in_range(local.z)) {
            return None;
        }
        Some((local.x + local.y * leaf_size + local.z * leaf_size * leaf_size) as usize)
    }
}

/// Combine per-axis cell coordinates into a slot index
#[inline]
pub fn slot_index(cell: IVec3, per_axis: i32) -> usize {
    (cell.x + cell.y * per_axis + cell.z * per_axis * per_axis) as usize
}

/// Inverse of [`slot_index`]
#[inline]
pub fn slot_position(slot: usize, per_axis: i32) -> IVec3 {
    let slot = slot as i32;
    IVec3::new(
        slot % per_axis,
        (slot / per_axis) % per_axis,
        slot / (per_axis * per_axis),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_half_open() {
        let region = Region::new(IVec3::ZERO, 16);
        assert!(region.contains(IVec3::new(0, 0, 0)));
        assert!(region.contains(IVec3::new(15, 15, 15)));
        assert!(!region.contains(IVec3::new(16, 0, 0)));
        assert!(!region.contains(IVec3::new(0, 16, 0)));
        assert!(!region.contains(IVec3::new(0, 0, 16)));
        assert!(!region.contains(IVec3::new(-1, 0, 0)));
    }

    #[test]
    fn test_octant_children_follow_octant_positions() {
        let region = Region::new(IVec3::new(-8, 0, 16), 16);
        for (slot, offset) in OCTANT_POSITIONS.iter().enumerate() {
            let child = region.child(slot, Fanout::Octants);
            assert_eq!(child.origin, region.origin + *offset * 8);
            assert_eq!(child.scale, 8);
            assert_eq!(region.child_slot(child.origin, Fanout::Octants), slot);
        }
    }

    #[test]
    fn test_octant_positions_match_slot_position() {
        for (slot, expected) in OCTANT_POSITIONS.iter().enumerate() {
            assert_eq!(slot_position(slot, 2), *expected);
            assert_eq!(slot_index(*expected, 2), slot);
        }
    }

    #[test]
    fn test_child_regions_octants() {
        let region = Region::new(IVec3::new(16, 0, 32), 16);
        assert_eq!(region.child(0, Fanout::Octants), Region::new(IVec3::new(16, 0, 32), 8));
        assert_eq!(region.child(1, Fanout::Octants), Region::new(IVec3::new(24, 0, 32), 8));
        assert_eq!(region.child(2, Fanout::Octants), Region::new(IVec3::new(16, 8, 32), 8));
        assert_eq!(region.child(4, Fanout::Octants), Region::new(IVec3::new(16, 0, 40), 8));
        assert_eq!(region.child(7, Fanout::Octants), Region::new(IVec3::new(24, 8, 40), 8));
    }

    #[test]
    fn test_child_regions_quartics() {
        let region = Region::new(IVec3::ZERO, 64);
        assert_eq!(region.child_scale(Fanout::Quartics), 16);
        assert_eq!(region.child(0, Fanout::Quartics).origin, IVec3::ZERO);
        assert_eq!(region.child(3, Fanout::Quartics).origin, IVec3::new(48, 0, 0));
        assert_eq!(region.child(4, Fanout::Quartics).origin, IVec3::new(0, 16, 0));
        assert_eq!(region.child(16, Fanout::Quartics).origin, IVec3::new(0, 0, 16));
        assert_eq!(region.child(63, Fanout::Quartics).origin, IVec3::new(48, 48, 48));
    }

    #[test]
    fn test_boundary_routes_to_upper_child() {
        let region = Region::new(IVec3::ZERO, 16);
        let slot = region.child_slot(IVec3::new(8, 8, 8), Fanout::Octants);
        assert_eq!(slot, 7);
        assert_eq!(region.child(slot, Fanout::Octants).origin, IVec3::splat(8));

        let slot = region.child_slot(IVec3::new(7, 7, 7), Fanout::Octants);
        assert_eq!(slot, 0);
    }

    #[test]
    fn test_child_slot_clamps() {
        let region = Region::new(IVec3::ZERO, 16);
        assert_eq!(region.child_slot(IVec3::new(16, 16, 16), Fanout::Octants), 7);
        assert_eq!(region.child_slot(IVec3::new(-3, 0, 0), Fanout::Octants), 0);
    }

    #[test]
    fn test_children_partition_parent() {
        // Every grid point of the parent maps to exactly one child, and that
        // child is the one child_slot selects.
        for fanout in [Fanout::Octants, Fanout::Quartics] {
            let region = Region::new(IVec3::new(-8, 4, 0), 16);
            let children: Vec<Region> = region.children(fanout).collect();
            assert_eq!(children.len(), fanout.count());

            for z in region.origin.z..region.max().z {
                for y in region.origin.y..region.max().y {
                    for x in region.origin.x..region.max().x {
                        let pos = IVec3::new(x, y, z);
                        let owners: Vec<usize> = children
                            .iter()
                            .enumerate()
                            .filter(|(_, child)| child.contains(pos))
                            .map(|(slot, _)| slot)
                            .collect();
                        assert_eq!(owners.len(), 1, "{pos} owned by {owners:?}");
                        assert_eq!(owners[0], region.child_slot(pos, fanout));
                    }
                }
            }
        }
    }

    #[test]
    fn test_local_index() {
        let leaf = Region::new(IVec3::new(8, 8, 8), 8);
        assert_eq!(leaf.local_index(IVec3::new(8, 8, 8), 8), Some(0));
        assert_eq!(leaf.local_index(IVec3::new(9, 8, 8), 8), Some(1));
        assert_eq!(leaf.local_index(IVec3::new(8, 9, 8), 8), Some(8));
        assert_eq!(leaf.local_index(IVec3::new(8, 8, 9), 8), Some(64));
        assert_eq!(leaf.local_index(IVec3::new(15, 15, 15), 8), Some(511));
        assert_eq!(leaf.local_index(IVec3::new(16, 8, 8), 8), None);
        assert_eq!(leaf.local_index(IVec3::new(7, 8, 8), 8), None);
    }
}
