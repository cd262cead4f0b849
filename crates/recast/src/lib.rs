//! Recast build-side collaborators of the navigation mesh runtime
//!
//! This crate holds what a navigation mesh build consumes: the input geometry
//! (triangle mesh, chunked partition, off-mesh connections, convex volumes,
//! build settings) and the build context that collects categorized log
//! messages and performance timers.

mod config;
mod context;
mod convex_volume;
mod input_geom;

pub use config::{BuildSettings, PartitionType};
pub use context::{BuildContext, LogCategory, TimerLabel, MAX_MESSAGES};
pub use convex_volume::{ConvexVolume, MAX_CONVEX_VOLUME_PTS};
pub use input_geom::{
    InputGeom, OffMeshConnection, MAX_OFF_MESH_CONNECTIONS, MAX_VOLUMES, TRIS_PER_CHUNK,
};
