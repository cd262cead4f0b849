//! Triangle mesh loaded from Wavefront OBJ data

use crate::{Error, Result};
use glam::Vec3;

#[cfg(feature = "std")]
use std::path::Path;

/// Indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    /// Vertex positions as a flat array of [x, y, z]
    pub vertices: Vec<f32>,
    /// Vertex indices, 3 per triangle
    pub indices: Vec<i32>,
    /// Unit normal per triangle
    pub normals: Vec<f32>,
    pub vert_count: usize,
    pub tri_count: usize,
}

fn parse_coord<'a>(tokens: &mut impl Iterator<Item = &'a str>, axis: char, line: usize) -> Result<f32> {
    let token = tokens
        .next()
        .ok_or_else(|| Error::InvalidMesh(format!("line {}: vertex is missing {}", line, axis)))?;
    token.parse::<f32>().map_err(|_| {
        Error::InvalidMesh(format!(
            "line {}: vertex {} '{}' is not a number",
            line, axis, token
        ))
    })
}

impl TriMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a mesh from an OBJ file
    #[cfg(feature = "std")]
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_obj_str(&content)
    }

    /// Parses OBJ content from a string
    ///
    /// Only `v` and `f` records are read. Polygonal faces are fan
    /// triangulated, and negative face indices count back from the last
    /// vertex read so far.
    ///
    /// ```
    /// use recast_common::TriMesh;
    ///
    /// let mesh = TriMesh::from_obj_str("v 0 0 0\nv 1 0 0\nv 0 0 1\nf 1 2 3\n").unwrap();
    /// assert_eq!(mesh.vert_count, 3);
    /// assert_eq!(mesh.tri_count, 1);
    /// ```
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::new();
        for (number, line) in content.lines().enumerate() {
            mesh.parse_line(line, number + 1)?;
        }
        mesh.compute_normals();
        Ok(mesh)
    }

    fn parse_line(&mut self, line: &str, number: usize) -> Result<()> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let x = parse_coord(&mut tokens, 'x', number)?;
                let y = parse_coord(&mut tokens, 'y', number)?;
                let z = parse_coord(&mut tokens, 'z', number)?;
                self.vertices.extend_from_slice(&[x, y, z]);
                self.vert_count += 1;
            }
            Some("f") => {
                let face = tokens
                    .map(|token| self.parse_face_index(token, number))
                    .collect::<Result<Vec<i32>>>()?;
                if face.len() < 3 {
                    return Err(Error::InvalidMesh(format!(
                        "line {}: face has {} vertices",
                        number,
                        face.len()
                    )));
                }
                for pair in face[1..].windows(2) {
                    self.indices.extend_from_slice(&[face[0], pair[0], pair[1]]);
                    self.tri_count += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_face_index(&self, token: &str, number: usize) -> Result<i32> {
        let raw = token.split('/').next().unwrap_or_default();
        let index = raw.parse::<i32>().map_err(|_| {
            Error::InvalidMesh(format!("line {}: face index '{}' is not a number", number, raw))
        })?;

        let resolved = if index < 0 {
            self.vert_count as i32 + index
        } else {
            index - 1
        };
        if resolved < 0 || resolved as usize >= self.vert_count {
            return Err(Error::InvalidMesh(format!(
                "line {}: face index {} out of range ({} vertices)",
                number, index, self.vert_count
            )));
        }
        Ok(resolved)
    }

    /// Vertex position
    pub fn vertex(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * 3..index * 3 + 3])
    }

    fn compute_normals(&mut self) {
        self.normals.clear();
        for tri in self.indices.chunks_exact(3) {
            let v0 = self.vertex(tri[0] as usize);
            let v1 = self.vertex(tri[1] as usize);
            let v2 = self.vertex(tri[2] as usize);
            let n = (v1 - v0).cross(v2 - v0).normalize_or_zero();
            self.normals.extend_from_slice(&n.to_array());
        }
    }

    /// Axis-aligned bounds of the mesh vertices
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        calc_bounds(&self.vertices)
    }
}

/// Axis-aligned bounds of a flat [x, y, z] vertex array, zero when empty
pub fn calc_bounds(vertices: &[f32]) -> (Vec3, Vec3) {
    let mut points = vertices.chunks_exact(3).map(Vec3::from_slice);
    let Some(first) = points.next() else {
        return (Vec3::ZERO, Vec3::ZERO);
    };
    points.fold((first, first), |(bmin, bmax), v| (bmin.min(v), bmax.max(v)))
}
