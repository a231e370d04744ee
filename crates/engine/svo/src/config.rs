//! Octree build configuration
//!
//! Loaded from RON files, e.g.
//!
//! ```ron
//! (
//!     origin: (0, 0, 0),
//!     scale: 512,
//!     leaf_size: 8,
//!     fanout: Octants,
//!     discipline: FixedFanout,
//! )
//! ```

use crate::error::{Result, SvoError};
use crate::flat::BufferLayout;
use glam::IVec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Children per internal node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fanout {
    /// 2x2x2 split, 8 children
    #[default]
    Octants,
    /// 4x4x4 split, 64 children
    Quartics,
}

impl Fanout {
    /// Children along one axis
    #[inline]
    pub fn per_axis(self) -> i32 {
        match self {
            Fanout::Octants => 2,
            Fanout::Quartics => 4,
        }
    }

    /// Total number of child slots
    #[inline]
    pub fn count(self) -> usize {
        match self {
            Fanout::Octants => 8,
            Fanout::Quartics => 64,
        }
    }
}

/// How samples are routed down the tree. One discipline is used for a whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Discipline {
    /// Child slot computed arithmetically; dense leaves at `leaf_size`.
    #[default]
    FixedFanout,
    /// Bucket leaves that split at their midpoint once they overflow.
    BoundsSplitting,
}

/// Root configuration of an octree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvoConfig {
    /// Minimum corner of the root region
    pub origin: [i32; 3],
    /// Root edge length, power of two
    pub scale: i32,
    /// Edge length at which subdivision stops, power of two
    pub leaf_size: i32,
    pub fanout: Fanout,
    pub discipline: Discipline,
    /// Samples a bucket leaf holds before it splits (bounds-splitting only)
    pub bucket_capacity: usize,
    /// Byte layout used when encoding the flat arrays
    pub layout: BufferLayout,
}

impl Default for SvoConfig {
    fn default() -> Self {
        Self {
            origin: [0, 0, 0],
            scale: 512,
            leaf_size: 8,
            fanout: Fanout::default(),
            discipline: Discipline::default(),
            bucket_capacity: 8,
            layout: BufferLayout::default(),
        }
    }
}

impl SvoConfig {
    /// Config for a root region at the origin
    pub fn new(scale: i32, leaf_size: i32) -> Self {
        Self {
            scale,
            leaf_size,
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin: IVec3) -> Self {
        self.origin = origin.to_array();
        self
    }

    pub fn with_fanout(mut self, fanout: Fanout) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_bucket_capacity(mut self, bucket_capacity: usize) -> Self {
        self.bucket_capacity = bucket_capacity;
        self
    }

    pub fn with_layout(mut self, layout: BufferLayout) -> Self {
        self.layout = layout;
        self
    }

    #[inline]
    pub fn origin(&self) -> IVec3 {
        IVec3::from_array(self.origin)
    }

    /// Load and validate a configuration from a RON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SvoConfig = ron::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty RON representation of this configuration
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Check sizes and layout for consistency
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.scale) {
            return Err(SvoError::InvalidConfig(format!(
                "scale must be a positive power of two, got {}",
                self.scale
            )));
        }
        if !is_power_of_two(self.leaf_size) {
            return Err(SvoError::InvalidConfig(format!(
                "leaf_size must be a positive power of two, got {}",
                self.leaf_size
            )));
        }
        if self.leaf_size > self.scale {
            return Err(SvoError::InvalidConfig(format!(
                "leaf_size {} exceeds scale {}",
                self.leaf_size, self.scale
            )));
        }
        if self.discipline == Discipline::BoundsSplitting && self.fanout != Fanout::Octants {
            return Err(SvoError::InvalidConfig(
                "bounds-splitting discipline only supports 8-way fan-out".to_string(),
            ));
        }
        // A 4-way split of a node twice the leaf size must still yield whole voxels
        if self.fanout == Fanout::Quartics && self.leaf_size < 2 {
            return Err(SvoError::InvalidConfig(
                "64-way fan-out needs leaf_size >= 2".to_string(),
            ));
        }
        if self.leaf_size > MAX_LEAF_SIZE {
            return Err(SvoError::InvalidConfig(format!(
                "leaf_size {} exceeds the maximum of {}",
                self.leaf_size, MAX_LEAF_SIZE
            )));
        }
        if self.origin.iter().any(|&o| o.checked_add(self.scale).is_none()) {
            return Err(SvoError::InvalidConfig(format!(
                "root region origin {:?} + scale {} overflows i32",
                self.origin, self.scale
            )));
        }
        if self.discipline == Discipline::BoundsSplitting && self.bucket_capacity == 0 {
            return Err(SvoError::InvalidConfig(
                "bucket_capacity must be at least 1".to_string(),
            ));
        }
        self.layout.validate()
    }
}

/// Largest accepted leaf edge; a dense leaf holds `leaf_size³` slots
pub const MAX_LEAF_SIZE: i32 = 64;

#[inline]
pub(crate) fn is_power_of_two(value: i32) -> bool {
    value > 0 && (value as u32).is_power_of_two()
}

/// Slot count of a dense leaf store, `None` when it does not fit in `usize`
#[inline]
pub(crate) fn dense_capacity(leaf_size: i32) -> Option<usize> {
    usize::try_from(leaf_size).ok()?.checked_pow(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SvoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scale, 512);
        assert_eq!(config.leaf_size, 8);
        assert_eq!(config.fanout.count(), 8);
    }

    #[test]
    fn test_fanout_sizes() {
        assert_eq!(Fanout::Octants.per_axis(), 2);
        assert_eq!(Fanout::Quartics.per_axis(), 4);
        assert_eq!(Fanout::Quartics.count(), 64);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(SvoConfig::new(100, 8).validate().is_err());
        assert!(SvoConfig::new(64, 6).validate().is_err());
        assert!(SvoConfig::new(0, 8).validate().is_err());
        assert!(SvoConfig::new(-16, 8).validate().is_err());
    }

    #[test]
    fn test_rejects_leaf_larger_than_root() {
        assert!(SvoConfig::new(8, 16).validate().is_err());
        assert!(SvoConfig::new(8, 8).validate().is_ok());
    }

    #[test]
    fn test_rejects_oversized_leaf() {
        let config = SvoConfig::new(2048, 2048);
        assert!(matches!(config.validate(), Err(SvoError::InvalidConfig(_))));
        assert!(SvoConfig::new(4096, MAX_LEAF_SIZE).validate().is_ok());
        assert!(SvoConfig::new(4096, MAX_LEAF_SIZE * 2).validate().is_err());
    }

    #[test]
    fn test_rejects_overflowing_origin() {
        let config = SvoConfig::new(16, 8).with_origin(IVec3::new(i32::MAX - 4, 0, 0));
        assert!(matches!(config.validate(), Err(SvoError::InvalidConfig(_))));

        let config = SvoConfig::new(16, 8).with_origin(IVec3::new(0, 0, i32::MAX - 15));
        assert!(config.validate().is_ok());
        let config = SvoConfig::new(16, 8).with_origin(IVec3::new(0, 0, i32::MAX - 14));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dense_capacity() {
        assert_eq!(dense_capacity(8), Some(512));
        assert_eq!(dense_capacity(-1), None);
    }

    #[test]
    fn test_rejects_bounds_splitting_with_wide_fanout() {
        let config = SvoConfig::new(64, 8)
            .with_discipline(Discipline::BoundsSplitting)
            .with_fanout(Fanout::Quartics);
        assert!(matches!(config.validate(), Err(SvoError::InvalidConfig(_))));
    }

    #[test]
    fn test_ron_round_trip() {
        let config = SvoConfig::new(64, 4)
            .with_origin(IVec3::new(-32, 0, 16))
            .with_fanout(Fanout::Quartics)
            .with_layout(BufferLayout::SCALAR);
        let text = config.to_ron().unwrap();
        let parsed: SvoConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed: SvoConfig = ron::from_str("(scale: 32, discipline: BoundsSplitting)").unwrap();
        assert_eq!(parsed.scale, 32);
        assert_eq!(parsed.leaf_size, 8);
        assert_eq!(parsed.discipline, Discipline::BoundsSplitting);
        assert_eq!(parsed.bucket_capacity, 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svo.ron");
        fs::write(&path, "(scale: 16, leaf_size: 4)").unwrap();

        let config = SvoConfig::load_from_file(&path).unwrap();
        assert_eq!(config.scale, 16);
        assert_eq!(config.leaf_size, 4);

        fs::write(&path, "(scale: 12)").unwrap();
        assert!(matches!(
            SvoConfig::load_from_file(&path),
            Err(SvoError::InvalidConfig(_))
        ));

        fs::write(&path, "(scale: ").unwrap();
        assert!(matches!(
            SvoConfig::load_from_file(&path),
            Err(SvoError::ConfigParse(_))
        ));
    }
}
