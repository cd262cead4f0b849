//! Spatial partition of a triangle mesh on the xz-plane
//!
//! Triangles are split recursively along the longer axis of their combined
//! bounds until each leaf holds at most `tris_per_chunk` triangles. Nodes are
//! stored depth first; an internal node stores the negated size of its
//! subtree, so a query can skip a non-overlapping subtree in one step.

use crate::{Error, Result};

/// Node of the partition
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChunkyTriMeshNode {
    /// Minimum xz bounds
    pub bmin: [f32; 2],
    /// Maximum xz bounds
    pub bmax: [f32; 2],
    /// First triangle of a leaf, or negative escape offset of an internal node
    pub i: i32,
    /// Number of triangles in a leaf
    pub n: usize,
}

impl ChunkyTriMeshNode {
    pub fn is_leaf(&self) -> bool {
        self.i >= 0
    }
}

#[derive(Clone, Copy)]
struct BoundsItem {
    bmin: [f32; 2],
    bmax: [f32; 2],
    tri: usize,
}

/// Triangles of a mesh grouped into spatially coherent chunks
#[derive(Debug, Clone, Default)]
pub struct ChunkyTriMesh {
    nodes: Vec<ChunkyTriMeshNode>,
    /// Triangle vertex indices, reordered so each leaf is contiguous
    tris: Vec<i32>,
    max_tris_per_chunk: usize,
}

fn calc_extents(items: &[BoundsItem]) -> ([f32; 2], [f32; 2]) {
    items.iter().fold(
        ([f32::MAX; 2], [f32::MIN; 2]),
        |(bmin, bmax), it| {
            (
                [bmin[0].min(it.bmin[0]), bmin[1].min(it.bmin[1])],
                [bmax[0].max(it.bmax[0]), bmax[1].max(it.bmax[1])],
            )
        },
    )
}

fn overlap_rect(amin: [f32; 2], amax: [f32; 2], bmin: [f32; 2], bmax: [f32; 2]) -> bool {
    amin[0] <= bmax[0] && amax[0] >= bmin[0] && amin[1] <= bmax[1] && amax[1] >= bmin[1]
}

fn overlap_segment(p: [f32; 2], q: [f32; 2], bmin: [f32; 2], bmax: [f32; 2]) -> bool {
    const EPSILON: f32 = 1e-6;

    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    for axis in 0..2 {
        let d = q[axis] - p[axis];
        if d.abs() < EPSILON {
            // Parallel to the slab
            if p[axis] < bmin[axis] || p[axis] > bmax[axis] {
                return false;
            }
        } else {
            let ood = 1.0 / d;
            let mut t1 = (bmin[axis] - p[axis]) * ood;
            let mut t2 = (bmax[axis] - p[axis]) * ood;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            tmin = tmin.max(t1);
            tmax = tmax.min(t2);
            if tmin > tmax {
                return false;
            }
        }
    }
    true
}

impl ChunkyTriMesh {
    /// Partitions the triangles of a flat vertex array and index list
    pub fn new(verts: &[f32], tris: &[i32], tris_per_chunk: usize) -> Result<Self> {
        if tris_per_chunk == 0 {
            return Err(Error::Recast("chunk size must be positive".to_string()));
        }
        if tris.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "triangle index count {} is not a multiple of 3",
                tris.len()
            )));
        }

        let vert_count = verts.len() / 3;
        let mut items = Vec::with_capacity(tris.len() / 3);
        for (tri, idx) in tris.chunks_exact(3).enumerate() {
            let mut item = BoundsItem {
                bmin: [f32::MAX; 2],
                bmax: [f32::MIN; 2],
                tri,
            };
            for &v in idx {
                if v < 0 || v as usize >= vert_count {
                    return Err(Error::InvalidMesh(format!(
                        "triangle {} references vertex {} of {}",
                        tri, v, vert_count
                    )));
                }
                let x = verts[v as usize * 3];
                let z = verts[v as usize * 3 + 2];
                item.bmin = [item.bmin[0].min(x), item.bmin[1].min(z)];
                item.bmax = [item.bmax[0].max(x), item.bmax[1].max(z)];
            }
            items.push(item);
        }

        let mut mesh = Self {
            nodes: Vec::with_capacity(items.len().div_ceil(tris_per_chunk) * 4),
            tris: Vec::with_capacity(tris.len()),
            max_tris_per_chunk: 0,
        };
        if !items.is_empty() {
            mesh.subdivide(&mut items, tris, tris_per_chunk);
        }
        mesh.max_tris_per_chunk = mesh
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.n)
            .max()
            .unwrap_or(0);
        Ok(mesh)
    }

    fn subdivide(&mut self, items: &mut [BoundsItem], in_tris: &[i32], tris_per_chunk: usize) {
        let icur = self.nodes.len();
        let (bmin, bmax) = calc_extents(items);
        self.nodes.push(ChunkyTriMeshNode {
            bmin,
            bmax,
            i: 0,
            n: 0,
        });

        if items.len() <= tris_per_chunk {
            let node = &mut self.nodes[icur];
            node.i = (self.tris.len() / 3) as i32;
            node.n = items.len();
            for item in items.iter() {
                self.tris
                    .extend_from_slice(&in_tris[item.tri * 3..item.tri * 3 + 3]);
            }
            return;
        }

        let axis = if bmax[1] - bmin[1] > bmax[0] - bmin[0] { 1 } else { 0 };
        items.sort_by(|a, b| a.bmin[axis].total_cmp(&b.bmin[axis]));

        let split = items.len() / 2;
        let (left, right) = items.split_at_mut(split);
        self.subdivide(left, in_tris, tris_per_chunk);
        self.subdivide(right, in_tris, tris_per_chunk);

        let escape = self.nodes.len() - icur;
        self.nodes[icur].i = -(escape as i32);
    }

    pub fn nodes(&self) -> &[ChunkyTriMeshNode] {
        &self.nodes
    }

    /// Largest number of triangles in a leaf
    pub fn max_tris_per_chunk(&self) -> usize {
        self.max_tris_per_chunk
    }

    /// Vertex indices of the triangles in a leaf
    pub fn chunk_tris(&self, node: usize) -> &[i32] {
        let node = &self.nodes[node];
        if !node.is_leaf() {
            return &[];
        }
        let start = node.i as usize * 3;
        &self.tris[start..start + node.n * 3]
    }

    fn collect_leaves(&self, overlaps: impl Fn(&ChunkyTriMeshNode) -> bool) -> Vec<usize> {
        let mut ids = Vec::new();
        let mut i = 0;
        while i < self.nodes.len() {
            let node = &self.nodes[i];
            let overlap = overlaps(node);
            if node.is_leaf() && overlap {
                ids.push(i);
            }
            if overlap || node.is_leaf() {
                i += 1;
            } else {
                i += (-node.i) as usize;
            }
        }
        ids
    }

    /// Leaves whose bounds overlap the xz rectangle
    pub fn chunks_overlapping_rect(&self, bmin: [f32; 2], bmax: [f32; 2]) -> Vec<usize> {
        self.collect_leaves(|node| overlap_rect(bmin, bmax, node.bmin, node.bmax))
    }

    /// Leaves whose bounds intersect the xz segment p-q
    pub fn chunks_overlapping_segment(&self, p: [f32; 2], q: [f32; 2]) -> Vec<usize> {
        self.collect_leaves(|node| overlap_segment(p, q, node.bmin, node.bmax))
    }
}
