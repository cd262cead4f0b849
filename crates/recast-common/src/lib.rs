//! Common utilities and data structures used by both Recast and Detour

mod chunky_tri_mesh;
mod mesh;

pub use chunky_tri_mesh::{ChunkyTriMesh, ChunkyTriMeshNode};
pub use mesh::{calc_bounds, TriMesh};

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("recast error: {0}")]
    Recast(String),

    #[cfg(feature = "std")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mesh and geometry operations
pub type Result<T> = std::result::Result<T, Error>;
