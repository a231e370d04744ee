use glam::IVec3;
use thiserror::Error;

/// Errors raised while configuring, building or flattening an octree
#[derive(Error, Debug)]
pub enum SvoError {
    #[error("Sample at {position} lies outside region origin={origin} scale={scale}")]
    OutOfBounds {
        position: IVec3,
        origin: IVec3,
        scale: i32,
    },

    #[error(
        "No child of node origin={node_origin} scale={node_scale} claims sample at {position}"
    )]
    InvariantViolation {
        position: IVec3,
        node_origin: IVec3,
        node_scale: i32,
    },

    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] ron::Error),
}

pub type Result<T> = std::result::Result<T, SvoError>;
