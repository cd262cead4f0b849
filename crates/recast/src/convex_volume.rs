//! Convex volumes marking areas of the input geometry
//!
//! A volume is a convex polygon on the xz-plane extruded between two heights.
//! Every point inside it is tagged with the volume's area type.

use glam::Vec3;
use recast_common::{Error, Result};

/// Maximum number of points in a convex volume
pub const MAX_CONVEX_VOLUME_PTS: usize = 12;

/// Area-marking volume of the input geometry
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexVolume {
    /// Hull points, only x and z are used for containment
    pub verts: Vec<Vec3>,
    pub hmin: f32,
    pub hmax: f32,
    /// Area type applied inside the volume
    pub area: u8,
}

impl ConvexVolume {
    pub fn new(verts: Vec<Vec3>, hmin: f32, hmax: f32, area: u8) -> Result<Self> {
        if verts.len() < 3 {
            return Err(Error::InvalidMesh(
                "convex volume requires at least 3 points".to_string(),
            ));
        }
        if verts.len() > MAX_CONVEX_VOLUME_PTS {
            return Err(Error::InvalidMesh(format!(
                "convex volume has {} points (max: {})",
                verts.len(),
                MAX_CONVEX_VOLUME_PTS
            )));
        }
        if hmin > hmax {
            return Err(Error::InvalidMesh(format!(
                "convex volume min height {} above max height {}",
                hmin, hmax
            )));
        }
        if !is_convex(&verts) {
            return Err(Error::InvalidMesh(
                "convex volume points do not form a convex polygon".to_string(),
            ));
        }

        Ok(Self {
            verts,
            hmin,
            hmax,
            area,
        })
    }

    /// Box-shaped volume centred at `center`
    pub fn from_box(center: Vec3, half_extents: Vec3, area: u8) -> Result<Self> {
        let (x0, x1) = (center.x - half_extents.x, center.x + half_extents.x);
        let (z0, z1) = (center.z - half_extents.z, center.z + half_extents.z);
        let verts = vec![
            Vec3::new(x0, center.y, z0),
            Vec3::new(x0, center.y, z1),
            Vec3::new(x1, center.y, z1),
            Vec3::new(x1, center.y, z0),
        ];
        Self::new(
            verts,
            center.y - half_extents.y,
            center.y + half_extents.y,
            area,
        )
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        if point.y < self.hmin || point.y > self.hmax {
            return false;
        }

        // Crossing test on the xz-plane
        let mut inside = false;
        let n = self.verts.len();
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.verts[i];
            let vj = self.verts[j];
            if (vi.z > point.z) != (vj.z > point.z)
                && point.x < (vj.x - vi.x) * (point.z - vi.z) / (vj.z - vi.z) + vi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Bounding box spanning the hull and the height range
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut bmin = Vec3::new(f32::MAX, self.hmin, f32::MAX);
        let mut bmax = Vec3::new(f32::MIN, self.hmax, f32::MIN);
        for v in &self.verts {
            bmin.x = bmin.x.min(v.x);
            bmin.z = bmin.z.min(v.z);
            bmax.x = bmax.x.max(v.x);
            bmax.z = bmax.z.max(v.z);
        }
        (bmin, bmax)
    }
}

fn is_convex(verts: &[Vec3]) -> bool {
    let n = verts.len();
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = verts[i];
        let b = verts[(i + 1) % n];
        let c = verts[(i + 2) % n];
        let cross = (b.x - a.x) * (c.z - b.z) - (b.z - a.z) * (c.x - b.x);
        if cross != 0.0 {
            if sign == 0.0 {
                sign = cross;
            } else if (cross > 0.0) != (sign > 0.0) {
                return false;
            }
        }
    }
    true
}
