//! Input geometry for navigation mesh builds
//!
//! Holds the loaded triangle mesh with its bounds and chunked partition, the
//! optional build settings, and the user-placed off-mesh connections and
//! convex volumes.

use crate::config::BuildSettings;
use crate::context::{BuildContext, TimerLabel};
use crate::convex_volume::ConvexVolume;
use glam::Vec3;
use recast_common::{ChunkyTriMesh, Error, Result, TriMesh};
use std::path::Path;

/// Maximum number of off-mesh connections per geometry
pub const MAX_OFF_MESH_CONNECTIONS: usize = 256;
/// Maximum number of convex volumes per geometry
pub const MAX_VOLUMES: usize = 256;
/// Triangles per chunk of the spatial partition
pub const TRIS_PER_CHUNK: usize = 256;

/// Off-mesh connection placed on the input geometry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct OffMeshConnection {
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
    /// 1 when traversable in both directions
    pub dir: u8,
    pub area: u8,
    pub flags: u16,
    pub user_id: u32,
}

impl OffMeshConnection {
    pub fn is_bidirectional(&self) -> bool {
        self.dir & 1 != 0
    }
}

/// Source geometry and annotations of a navigation mesh build
#[derive(Debug, Clone, Default)]
pub struct InputGeom {
    mesh: Option<TriMesh>,
    chunky_mesh: Option<ChunkyTriMesh>,
    mesh_bmin: Vec3,
    mesh_bmax: Vec3,
    build_settings: Option<BuildSettings>,
    off_mesh_cons: Vec<OffMeshConnection>,
    volumes: Vec<ConvexVolume>,
    next_user_id: u32,
}

impl InputGeom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads geometry from a file, dispatching on its extension
    ///
    /// Only `.obj` meshes are supported; `.gset` geometry sets are recognized
    /// but not implemented.
    pub fn load(&mut self, ctx: &mut BuildContext, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let result = match path.extension().and_then(|e| e.to_str()) {
            Some("obj") => self.load_mesh(ctx, path),
            Some("gset") => Err(Error::UnsupportedFormat(
                "gset input geometry not implemented".to_string(),
            )),
            _ => Err(Error::UnsupportedFormat(format!(
                "couldn't recognize input geometry file extension: '{}'",
                path.display()
            ))),
        };
        if let Err(e) = &result {
            ctx.error(e);
        }
        result
    }

    fn load_mesh(&mut self, ctx: &mut BuildContext, path: &Path) -> Result<()> {
        ctx.start_timer(TimerLabel::LoadGeometry);
        let mesh = TriMesh::from_obj(path);
        ctx.stop_timer(TimerLabel::LoadGeometry);

        match mesh {
            Ok(mesh) => {
                ctx.progress(format_args!(
                    "loaded '{}': {} verts, {} tris",
                    path.display(),
                    mesh.vert_count,
                    mesh.tri_count
                ));
                self.set_mesh(mesh)
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Replaces the geometry with an already loaded mesh
    ///
    /// Off-mesh connections and convex volumes are discarded.
    pub fn set_mesh(&mut self, mesh: TriMesh) -> Result<()> {
        self.clear();
        let chunky = ChunkyTriMesh::new(&mesh.vertices, &mesh.indices, TRIS_PER_CHUNK)?;
        let (bmin, bmax) = mesh.calculate_bounds();
        self.mesh_bmin = bmin;
        self.mesh_bmax = bmax;
        self.mesh = Some(mesh);
        self.chunky_mesh = Some(chunky);
        Ok(())
    }

    fn clear(&mut self) {
        self.mesh = None;
        self.chunky_mesh = None;
        self.mesh_bmin = Vec3::ZERO;
        self.mesh_bmax = Vec3::ZERO;
        self.off_mesh_cons.clear();
        self.volumes.clear();
    }

    pub fn mesh(&self) -> Option<&TriMesh> {
        self.mesh.as_ref()
    }

    pub fn chunky_mesh(&self) -> Option<&ChunkyTriMesh> {
        self.chunky_mesh.as_ref()
    }

    pub fn mesh_bounds_min(&self) -> Vec3 {
        self.mesh_bmin
    }

    pub fn mesh_bounds_max(&self) -> Vec3 {
        self.mesh_bmax
    }

    /// Navmesh bounds from the build settings, else the mesh bounds
    pub fn nav_mesh_bounds_min(&self) -> Vec3 {
        self.build_settings
            .as_ref()
            .map_or(self.mesh_bmin, |s| s.nav_mesh_bmin)
    }

    pub fn nav_mesh_bounds_max(&self) -> Vec3 {
        self.build_settings
            .as_ref()
            .map_or(self.mesh_bmax, |s| s.nav_mesh_bmax)
    }

    pub fn build_settings(&self) -> Option<&BuildSettings> {
        self.build_settings.as_ref()
    }

    pub fn set_build_settings(&mut self, settings: Option<BuildSettings>) -> Result<()> {
        if let Some(settings) = &settings {
            settings.validate()?;
        }
        self.build_settings = settings;
        Ok(())
    }

    pub fn off_mesh_connections(&self) -> &[OffMeshConnection] {
        &self.off_mesh_cons
    }

    /// Adds an off-mesh connection and returns its index
    pub fn add_off_mesh_connection(
        &mut self,
        start: Vec3,
        end: Vec3,
        radius: f32,
        bidirectional: bool,
        area: u8,
        flags: u16,
    ) -> Result<usize> {
        if self.off_mesh_cons.len() >= MAX_OFF_MESH_CONNECTIONS {
            return Err(Error::Recast(format!(
                "too many off-mesh connections (max: {})",
                MAX_OFF_MESH_CONNECTIONS
            )));
        }
        if radius <= 0.0 {
            return Err(Error::Recast(format!(
                "off-mesh connection radius must be positive, got {}",
                radius
            )));
        }

        let user_id = self.next_user_id;
        self.next_user_id = self.next_user_id.wrapping_add(1);
        self.off_mesh_cons.push(OffMeshConnection {
            start,
            end,
            radius,
            dir: u8::from(bidirectional),
            area,
            flags,
            user_id,
        });
        Ok(self.off_mesh_cons.len() - 1)
    }

    /// Removes an off-mesh connection, the last one takes its index
    pub fn delete_off_mesh_connection(&mut self, index: usize) -> Option<OffMeshConnection> {
        (index < self.off_mesh_cons.len()).then(|| self.off_mesh_cons.swap_remove(index))
    }

    pub fn convex_volumes(&self) -> &[ConvexVolume] {
        &self.volumes
    }

    /// Adds a convex volume and returns its index
    pub fn add_convex_volume(
        &mut self,
        verts: &[Vec3],
        hmin: f32,
        hmax: f32,
        area: u8,
    ) -> Result<usize> {
        if self.volumes.len() >= MAX_VOLUMES {
            return Err(Error::Recast(format!(
                "too many convex volumes (max: {})",
                MAX_VOLUMES
            )));
        }
        self.volumes
            .push(ConvexVolume::new(verts.to_vec(), hmin, hmax, area)?);
        Ok(self.volumes.len() - 1)
    }

    /// Removes a convex volume, the last one takes its index
    pub fn delete_convex_volume(&mut self, index: usize) -> Option<ConvexVolume> {
        (index < self.volumes.len()).then(|| self.volumes.swap_remove(index))
    }

    /// Area of the last volume containing `point`, if any
    pub fn area_at(&self, point: Vec3) -> Option<u8> {
        self.volumes
            .iter()
            .rev()
            .find(|v| v.contains_point(point))
            .map(|v| v.area)
    }
}
