//! Builders for small serialized tiles used by the unit tests

use super::binary_format::{save_tile_to_binary, MeshHeader};
use super::nav_mesh::{BVNode, Link, MeshTile, OffMeshConnection, Poly, PolyDetail};
use super::{NavMeshParams, PolyFlags, PolyType, DT_EXT_LINK};

/// World size of a tile edge
pub const TILE_SIZE: f32 = 10.0;

/// Off-mesh connection placed into a test tile
#[derive(Debug, Clone)]
pub struct OffMeshSpec {
    start: [f32; 3],
    end: [f32; 3],
    radius: f32,
    bidirectional: bool,
    side: u8,
}

impl OffMeshSpec {
    pub fn new(start: [f32; 3], end: [f32; 3], radius: f32) -> Self {
        Self {
            start,
            end,
            radius,
            bidirectional: false,
            side: 0xff,
        }
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn with_side(mut self, side: u8) -> Self {
        self.side = side;
        self
    }
}

/// Flat tile covered by a grid of square-ish quads
///
/// Cell `(c, r)` is polygon `r * cols + c`. Quad edges are ordered -x, +z, +x,
/// -z, and border edges become portals when requested.
#[derive(Debug, Clone)]
pub struct GridTileSpec {
    x: i32,
    y: i32,
    layer: i32,
    cols: usize,
    rows: usize,
    portals: bool,
    bv_tree: bool,
    link_slots: Option<usize>,
    off_mesh: Vec<OffMeshSpec>,
    areas: Vec<(usize, u8)>,
    flags: Vec<(usize, PolyFlags)>,
}

impl GridTileSpec {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            layer: 0,
            cols: 1,
            rows: 1,
            portals: false,
            bv_tree: false,
            link_slots: None,
            off_mesh: Vec::new(),
            areas: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Parameters of a mesh whose tiles match [`TILE_SIZE`]
    pub fn default_params() -> NavMeshParams {
        NavMeshParams {
            origin: [0.0; 3],
            tile_width: TILE_SIZE,
            tile_height: TILE_SIZE,
            max_tiles: 16,
            max_polys_per_tile: 64,
        }
    }

    pub fn with_size(mut self, cols: usize, rows: usize) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_portals(mut self) -> Self {
        self.portals = true;
        self
    }

    pub fn with_bv_tree(mut self) -> Self {
        self.bv_tree = true;
        self
    }

    pub fn with_link_slots(mut self, slots: usize) -> Self {
        self.link_slots = Some(slots);
        self
    }

    pub fn with_off_mesh(mut self, con: OffMeshSpec) -> Self {
        self.off_mesh.push(con);
        self
    }

    pub fn with_poly_area(mut self, poly: usize, area: u8) -> Self {
        self.areas.push((poly, area));
        self
    }

    pub fn with_poly_flags(mut self, poly: usize, flags: PolyFlags) -> Self {
        self.flags.push((poly, flags));
        self
    }
}

/// Serializes the tile described by `spec`
pub fn build_grid_tile(spec: &GridTileSpec) -> Vec<u8> {
    let (cols, rows) = (spec.cols, spec.rows);
    let cw = TILE_SIZE / cols as f32;
    let ch = TILE_SIZE / rows as f32;
    let x0 = spec.x as f32 * TILE_SIZE;
    let z0 = spec.y as f32 * TILE_SIZE;

    let mut tile = MeshTile::new();
    for r in 0..=rows {
        for c in 0..=cols {
            tile.verts
                .extend_from_slice(&[x0 + c as f32 * cw, 0.0, z0 + r as f32 * ch]);
        }
    }

    let vi = |c: usize, r: usize| (r * (cols + 1) + c) as u16;
    let pi = |c: usize, r: usize| (r * cols + c) as u16;
    let portal = |dir: u16| if spec.portals { DT_EXT_LINK | dir } else { 0 };

    for r in 0..rows {
        for c in 0..cols {
            let index = pi(c, r) as usize;
            let area = spec
                .areas
                .iter()
                .find(|(p, _)| *p == index)
                .map_or(0, |&(_, a)| a);
            let flags = spec
                .flags
                .iter()
                .find(|(p, _)| *p == index)
                .map_or(PolyFlags::WALK, |&(_, f)| f);

            let mut poly = Poly::new(area, PolyType::Ground, flags);
            poly.vert_count = 4;
            poly.verts[..4].copy_from_slice(&[vi(c, r), vi(c, r + 1), vi(c + 1, r + 1), vi(c + 1, r)]);
            poly.neis[0] = if c > 0 { pi(c - 1, r) + 1 } else { portal(4) };
            poly.neis[1] = if r + 1 < rows { pi(c, r + 1) + 1 } else { portal(2) };
            poly.neis[2] = if c + 1 < cols { pi(c + 1, r) + 1 } else { portal(0) };
            poly.neis[3] = if r > 0 { pi(c, r - 1) + 1 } else { portal(6) };
            tile.polys.push(poly);

            tile.detail_meshes.push(PolyDetail {
                vert_base: 0,
                tri_base: index as u32 * 2,
                vert_count: 0,
                tri_count: 2,
            });
            tile.detail_tris.extend_from_slice(&[0, 1, 2, 0, 0, 2, 3, 0]);

            if spec.bv_tree {
                let quant = |v: f32| (v * 2.0) as u16;
                tile.bv_tree.push(BVNode {
                    bmin: [quant(c as f32 * cw), 0, quant(r as f32 * ch)],
                    bmax: [quant((c + 1) as f32 * cw), 0, quant((r + 1) as f32 * ch)],
                    i: index as i32,
                });
            }
        }
    }

    let ground = tile.polys.len();
    for (i, con) in spec.off_mesh.iter().enumerate() {
        let first = (tile.verts.len() / 3) as u16;
        tile.verts.extend_from_slice(&con.start);
        tile.verts.extend_from_slice(&con.end);

        let mut poly = Poly::new(0, PolyType::OffMeshConnection, PolyFlags::JUMP);
        poly.vert_count = 2;
        poly.verts[0] = first;
        poly.verts[1] = first + 1;
        tile.polys.push(poly);

        let mut pos = [0.0; 6];
        pos[..3].copy_from_slice(&con.start);
        pos[3..].copy_from_slice(&con.end);
        tile.off_mesh_cons.push(OffMeshConnection {
            pos,
            radius: con.radius,
            poly: (ground + i) as u16,
            flags: u8::from(con.bidirectional),
            side: con.side,
            user_id: i as u32,
        });
    }

    let link_slots = spec
        .link_slots
        .unwrap_or(tile.polys.len() * 8 + spec.off_mesh.len() * 4);
    tile.links = vec![Link::default(); link_slots];

    let mut header = MeshHeader::new(spec.x, spec.y, spec.layer);
    header.off_mesh_base = ground as i32;
    header.walkable_height = 2.0;
    header.walkable_radius = 0.6;
    header.walkable_climb = 0.9;
    header.bmin = [x0, -1.0, z0];
    header.bmax = [x0 + TILE_SIZE, 1.0, z0 + TILE_SIZE];
    header.bv_quant_factor = 2.0;
    tile.header = Some(header);

    save_tile_to_binary(&tile).expect("test tile serializes")
}
