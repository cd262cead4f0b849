//! Build settings stored alongside input geometry

use glam::Vec3;
use recast_common::{Error, Result};

/// Region partitioning method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionType {
    #[default]
    Watershed,
    Monotone,
    Layers,
}

/// Settings used to build a navigation mesh from input geometry
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct BuildSettings {
    /// Cell size in world units
    pub cell_size: f32,
    /// Cell height in world units
    pub cell_height: f32,
    /// Agent height in world units
    pub agent_height: f32,
    /// Agent radius in world units
    pub agent_radius: f32,
    /// Agent max climb in world units
    pub agent_max_climb: f32,
    /// Agent max slope in degrees
    pub agent_max_slope: f32,
    /// Region minimum size in voxels
    pub region_min_size: f32,
    /// Region merge size in voxels
    pub region_merge_size: f32,
    /// Edge max length in world units
    pub edge_max_len: f32,
    /// Edge max error in voxels
    pub edge_max_error: f32,
    pub verts_per_poly: f32,
    /// Detail sample distance in voxels
    pub detail_sample_dist: f32,
    /// Detail sample max error in voxel heights
    pub detail_sample_max_error: f32,
    pub partition_type: PartitionType,
    /// Bounds of the area to mesh
    pub nav_mesh_bmin: Vec3,
    pub nav_mesh_bmax: Vec3,
    /// Tile size in voxels
    pub tile_size: f32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0,
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6.0,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            partition_type: PartitionType::Watershed,
            nav_mesh_bmin: Vec3::ZERO,
            nav_mesh_bmax: Vec3::ZERO,
            tile_size: 32.0,
        }
    }
}

impl BuildSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the settings
    pub fn validate(&self) -> Result<()> {
        if self.cell_size <= 0.0 || self.cell_height <= 0.0 {
            return Err(Error::Recast("invalid cell size or height".to_string()));
        }

        if !(0.0..=90.0).contains(&self.agent_max_slope) {
            return Err(Error::Recast(format!(
                "invalid agent max slope {}",
                self.agent_max_slope
            )));
        }

        if self.agent_height <= 0.0 || self.agent_radius < 0.0 || self.agent_max_climb < 0.0 {
            return Err(Error::Recast("invalid agent dimensions".to_string()));
        }

        if !(3.0..=6.0).contains(&self.verts_per_poly) {
            return Err(Error::Recast(format!(
                "vertices per polygon must be 3..=6, got {}",
                self.verts_per_poly
            )));
        }

        if self.nav_mesh_bmin.cmpgt(self.nav_mesh_bmax).any() {
            return Err(Error::Recast("navmesh bounds are inverted".to_string()));
        }

        Ok(())
    }

    /// Parses settings from JSON, missing fields keep their defaults
    #[cfg(feature = "serialization")]
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| Error::UnsupportedFormat(format!("build settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    #[cfg(feature = "serialization")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::UnsupportedFormat(format!("build settings: {}", e)))
    }
}
