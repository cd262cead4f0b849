//! Navigation mesh tile store
//!
//! A [`NavMesh`] owns a fixed arena of tile slots. Loading a tile decodes its
//! binary data into a [`MeshTile`], then stitches the tile's polygons into the
//! graph: internal links between polygons of the tile, links from off-mesh
//! connections to the polygons they land on, and portal links across the
//! edges shared with neighbouring tiles.

use glam::Vec3;

use super::binary_format::{load_tile_from_binary, MeshHeader};
use super::{
    NavMeshParams, PolyFlags, PolyRef, PolyType, Resource, Result, Status, TileFlags, TileRef,
    DT_EXT_LINK, DT_POLY_BITS, DT_SALT_MASK, DT_TILE_BITS, MAX_VERTS_PER_POLY,
};

/// Off-mesh connection flag: the connection can be traversed in both directions
const DT_OFFMESH_CON_BIDIR: u8 = 1;

/// Side value of links that do not cross a tile border
const DT_LINK_INTERNAL: u8 = 0xff;

/// Link between two polygons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Link {
    /// Reference to the connected polygon
    pub reference: PolyRef,
    /// Index of the next link of the owning polygon, or of the next free slot
    pub next: Option<u32>,
    /// Index of the polygon edge that owns this link
    pub edge: u8,
    /// Tile side of a portal link, 0xff for links inside the tile
    pub side: u8,
    /// Start of the shared portal range, quantized to 0..255
    pub bmin: u8,
    /// End of the shared portal range, quantized to 0..255
    pub bmax: u8,
}

impl Link {
    fn new(reference: PolyRef, edge: u8, side: u8) -> Self {
        Self {
            reference,
            next: None,
            edge,
            side,
            bmin: 0,
            bmax: 0,
        }
    }
}

/// Polygon in the navigation mesh
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Poly {
    /// Head of the polygon's link chain
    pub first_link: Option<u32>,
    /// Indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Neighbour code per edge: 0 for none, internal polygon index + 1, or
    /// `DT_EXT_LINK | side` for a tile portal
    pub neis: [u16; MAX_VERTS_PER_POLY],
    pub flags: PolyFlags,
    pub vert_count: u8,
    /// Area id, 6 bits
    pub area: u8,
    pub poly_type: PolyType,
}

impl Poly {
    /// Creates a polygon without vertices
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        Self {
            first_link: None,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags,
            vert_count: 0,
            area: area & 0x3f,
            poly_type,
        }
    }

    /// Checks if the polygon represents an off-mesh connection
    pub fn is_off_mesh_connection(&self) -> bool {
        self.poly_type == PolyType::OffMeshConnection
    }

    fn vert_indices(&self) -> &[u16] {
        &self.verts[..(self.vert_count as usize).min(MAX_VERTS_PER_POLY)]
    }
}

/// Detail sub-mesh of a polygon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyDetail {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
}

/// Bounding volume tree node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BVNode {
    /// Quantized minimum bounds
    pub bmin: [u16; 3],
    /// Quantized maximum bounds
    pub bmax: [u16; 3],
    /// Polygon index for a leaf, negative escape offset otherwise
    pub i: i32,
}

impl BVNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if the node is a leaf referencing a polygon
    pub fn is_leaf(&self) -> bool {
        self.i >= 0
    }
}

/// Off-mesh connection between two points
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshConnection {
    /// Start and end positions (x, y, z, x, y, z)
    pub pos: [f32; 6],
    /// Snap radius of the endpoints
    pub radius: f32,
    /// Index of the connection polygon inside the tile
    pub poly: u16,
    /// Connection flags, bit 0 marks a bidirectional connection
    pub flags: u8,
    /// Tile side the end point lies on, 0xff when inside the tile
    pub side: u8,
    pub user_id: u32,
}

impl OffMeshConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_pos(&self) -> Vec3 {
        Vec3::new(self.pos[0], self.pos[1], self.pos[2])
    }

    pub fn end_pos(&self) -> Vec3 {
        Vec3::new(self.pos[3], self.pos[4], self.pos[5])
    }

    pub fn is_bidirectional(&self) -> bool {
        self.flags & DT_OFFMESH_CON_BIDIR != 0
    }
}

/// Tile of a navigation mesh
///
/// An empty slot has no header. The salt survives while the slot is recycled.
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshTile {
    /// Generation counter of the slot
    pub salt: u32,
    /// Head of the free link slot chain
    pub links_free_list: Option<u32>,
    pub header: Option<MeshHeader>,
    pub polys: Vec<Poly>,
    /// Vertex positions (x, y, z) * vert_count
    pub verts: Vec<f32>,
    pub links: Vec<Link>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<f32>,
    /// Detail triangles, 3 vertex indices and one flags byte each
    pub detail_tris: Vec<u8>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
    /// Serialized form the tile was loaded from
    pub data: Vec<u8>,
    pub flags: TileFlags,
}

impl MeshTile {
    /// Creates an empty tile
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the serialized data the tile was loaded from
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Position of a tile vertex
    pub fn vert(&self, index: u16) -> Vec3 {
        let i = index as usize * 3;
        Vec3::new(self.verts[i], self.verts[i + 1], self.verts[i + 2])
    }

    /// Average of the polygon's vertices
    pub fn poly_center(&self, poly_index: usize) -> Vec3 {
        let poly = &self.polys[poly_index];
        let indices = poly.vert_indices();
        if indices.is_empty() {
            return Vec3::ZERO;
        }
        indices.iter().map(|&v| self.vert(v)).sum::<Vec3>() / indices.len() as f32
    }

    /// Takes a slot from the link free list
    pub fn alloc_link(&mut self) -> Result<u32> {
        let index = self.links_free_list.ok_or(Status::CapacityExceeded {
            resource: Resource::Links,
            capacity: self.links.len(),
        })?;
        self.links_free_list = self.links[index as usize].next;
        self.links[index as usize].next = None;
        Ok(index)
    }

    /// Returns a slot to the link free list
    pub fn free_link(&mut self, index: u32) {
        self.links[index as usize].next = self.links_free_list;
        self.links_free_list = Some(index);
    }

    /// Chains every link slot into the free list and detaches all polygons
    pub fn init_link_free_list(&mut self) {
        let count = self.links.len();
        for (i, link) in self.links.iter_mut().enumerate() {
            *link = Link {
                next: (i + 1 < count).then_some(i as u32 + 1),
                ..Link::default()
            };
        }
        self.links_free_list = (count > 0).then_some(0);
        for poly in &mut self.polys {
            poly.first_link = None;
        }
    }

    /// Iterates the links of a polygon of this tile
    pub fn poly_links(&self, poly: &Poly) -> LinkIter<'_> {
        LinkIter {
            links: &self.links,
            current: poly.first_link,
        }
    }

    fn push_link(&mut self, poly_index: usize, mut link: Link) -> Result<()> {
        let index = self.alloc_link()?;
        link.next = self.polys[poly_index].first_link;
        self.links[index as usize] = link;
        self.polys[poly_index].first_link = Some(index);
        Ok(())
    }

    /// Frees every link pointing into the tile slot `target_index`
    fn unlink_tile(&mut self, target_index: u32) {
        for poly_index in 0..self.polys.len() {
            let mut prev: Option<u32> = None;
            let mut current = self.polys[poly_index].first_link;
            while let Some(index) = current {
                let link = self.links[index as usize];
                if link.reference.tile_index() == target_index {
                    match prev {
                        Some(p) => self.links[p as usize].next = link.next,
                        None => self.polys[poly_index].first_link = link.next,
                    }
                    self.free_link(index);
                } else {
                    prev = Some(index);
                }
                current = link.next;
            }
        }
    }

    fn header_ref(&self) -> Result<&MeshHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| Status::invalid_param("tile slot is empty"))
    }

    fn walkable_climb(&self) -> f32 {
        self.header.as_ref().map_or(0.0, |h| h.walkable_climb)
    }

    /// Serializes the tile to JSON bytes
    #[cfg(feature = "serialization")]
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Status::Io(std::io::Error::from(e)))
    }

    /// Deserializes a tile from JSON bytes
    #[cfg(feature = "serialization")]
    pub fn from_json_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Status::Io(std::io::Error::from(e)))
    }
}

/// Iterator over a polygon's link chain
pub struct LinkIter<'a> {
    links: &'a [Link],
    current: Option<u32>,
}

impl<'a> Iterator for LinkIter<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.links.get(self.current? as usize)?;
        self.current = link.next;
        Some(link)
    }
}

/// Link computed against the current graph, applied once all reads are done
struct PendingLink {
    tile: usize,
    poly: usize,
    link: Link,
}

/// Vertex moved onto the polygon an off-mesh endpoint lands on
struct PendingSnap {
    tile: usize,
    vert: u16,
    pos: Vec3,
}

fn opposite_tile(side: i32) -> i32 {
    (side + 4) & 7
}

fn neighbour_offset(side: i32) -> (i32, i32) {
    match side {
        0 => (1, 0),
        1 => (1, 1),
        2 => (0, 1),
        3 => (-1, 1),
        4 => (-1, 0),
        5 => (-1, -1),
        6 => (0, -1),
        _ => (1, -1),
    }
}

fn compute_tile_hash(x: i32, y: i32, mask: usize) -> usize {
    let h1 = 0x8da6_b343u32;
    let h2 = 0xd816_3841u32;
    let n = h1.wrapping_mul(x as u32).wrapping_add(h2.wrapping_mul(y as u32));
    n as usize & mask
}

fn slab_coord(v: Vec3, side: i32) -> f32 {
    match side {
        0 | 4 => v.x,
        2 | 6 => v.z,
        _ => 0.0,
    }
}

/// Projects an edge onto the plane of a tile border as (along, height) end points
fn slab_end_points(va: Vec3, vb: Vec3, side: i32) -> ([f32; 2], [f32; 2]) {
    match side {
        0 | 4 => {
            if va.z < vb.z {
                ([va.z, va.y], [vb.z, vb.y])
            } else {
                ([vb.z, vb.y], [va.z, va.y])
            }
        }
        2 | 6 => {
            if va.x < vb.x {
                ([va.x, va.y], [vb.x, vb.y])
            } else {
                ([vb.x, vb.y], [va.x, va.y])
            }
        }
        _ => ([0.0; 2], [0.0; 2]),
    }
}

fn overlap_slabs(
    amin: [f32; 2],
    amax: [f32; 2],
    bmin: [f32; 2],
    bmax: [f32; 2],
    px: f32,
    py: f32,
) -> bool {
    // Segments must overlap along the border, shrunk by the tolerance
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let dmin = (bd * minx + bk) - (ad * minx + ak);
    let dmax = (bd * maxx + bk) - (ad * maxx + ak);

    // Crossing segments
    if dmin * dmax < 0.0 {
        return true;
    }

    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

fn point_in_poly_xz(pt: Vec3, verts: &[Vec3]) -> bool {
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > pt.z) != (vj.z > pt.z))
            && (pt.x < (vj.x - vi.x) * (pt.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn closest_point_on_segment_xz(pt: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    let len_sq = dx * dx + dz * dz;
    let t = if len_sq > 0.0 {
        (((pt.x - a.x) * dx + (pt.z - a.z) * dz) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    a.lerp(b, t)
}

/// Closest point on a ground polygon, with the height taken from the polygon
fn closest_point_on_poly(tile: &MeshTile, poly: &Poly, pos: Vec3) -> Vec3 {
    let verts: Vec<Vec3> = poly.vert_indices().iter().map(|&v| tile.vert(v)).collect();

    if point_in_poly_xz(pos, &verts) {
        let height = verts.iter().map(|v| v.y).sum::<f32>() / verts.len() as f32;
        return Vec3::new(pos.x, height, pos.z);
    }

    let mut best = verts[0];
    let mut best_dist = f32::MAX;
    for (i, &a) in verts.iter().enumerate() {
        let b = verts[(i + 1) % verts.len()];
        let candidate = closest_point_on_segment_xz(pos, a, b);
        let dist = candidate.distance_squared(pos);
        if dist < best_dist {
            best_dist = dist;
            best = candidate;
        }
    }
    best
}

/// Nearest ground polygon whose bounds overlap the query box
fn find_nearest_poly_in_tile(
    tile: &MeshTile,
    center: Vec3,
    half_extents: Vec3,
) -> Option<(usize, Vec3)> {
    let qmin = center - half_extents;
    let qmax = center + half_extents;

    let mut nearest = None;
    let mut nearest_dist = f32::MAX;
    for (index, poly) in tile.polys.iter().enumerate() {
        if poly.is_off_mesh_connection() || poly.vert_count < 3 {
            continue;
        }

        let (bmin, bmax) = poly
            .vert_indices()
            .iter()
            .map(|&v| tile.vert(v))
            .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if bmin.cmpgt(qmax).any() || bmax.cmplt(qmin).any() {
            continue;
        }

        let closest = closest_point_on_poly(tile, poly, center);
        let dist = closest.distance_squared(center);
        if dist < nearest_dist {
            nearest_dist = dist;
            nearest = Some((index, closest));
        }
    }
    nearest
}

fn within_radius_xz(a: Vec3, b: Vec3, radius: f32) -> bool {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz <= radius * radius
}

/// Tiled navigation mesh
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    /// Tile slots, `max_tiles` long
    tiles: Vec<MeshTile>,
    /// Free slot indices, the next slot to hand out on top
    free_tiles: Vec<usize>,
    /// Spatial hash buckets of occupied slot indices
    pos_lookup: Vec<Vec<usize>>,
    tile_lut_mask: usize,
}

impl NavMesh {
    /// Creates a navigation mesh with all tile slots free
    pub fn new(params: NavMeshParams) -> Result<Self> {
        crate::dtassert!(
            params.origin.iter().all(|v| v.is_finite()),
            "navmesh origin must be finite"
        );
        crate::dtassert!(
            params.tile_width > 0.0 && params.tile_height > 0.0,
            "tile size must be positive"
        );
        if params.max_tiles == 0 || params.max_tiles > 1 << DT_TILE_BITS {
            return Err(Status::invalid_param(format!(
                "max tiles {} outside 1..={}",
                params.max_tiles,
                1u32 << DT_TILE_BITS
            )));
        }
        if params.max_polys_per_tile == 0 || params.max_polys_per_tile > 1 << DT_POLY_BITS {
            return Err(Status::invalid_param(format!(
                "max polys per tile {} outside 1..={}",
                params.max_polys_per_tile,
                1u32 << DT_POLY_BITS
            )));
        }

        let max_tiles = params.max_tiles as usize;
        let lut_size = (max_tiles / 4).next_power_of_two().max(1);

        let tiles = (0..max_tiles)
            .map(|_| MeshTile {
                salt: 1,
                ..MeshTile::new()
            })
            .collect();

        Ok(Self {
            params,
            tiles,
            free_tiles: (0..max_tiles).rev().collect(),
            pos_lookup: vec![Vec::new(); lut_size],
            tile_lut_mask: lut_size - 1,
        })
    }

    pub fn get_params(&self) -> &NavMeshParams {
        &self.params
    }

    pub fn get_max_tiles(&self) -> u32 {
        self.params.max_tiles
    }

    /// Number of occupied tile slots
    pub fn tile_count(&self) -> usize {
        self.tiles.len() - self.free_tiles.len()
    }

    /// Iterates the occupied tiles with their handles
    pub fn tiles(&self) -> impl Iterator<Item = (TileRef, &MeshTile)> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.header.is_some())
            .map(|(index, tile)| (TileRef::new(index as u32, tile.salt), tile))
    }

    /// Gets the occupied tile in a slot
    pub fn get_tile_by_index(&self, index: usize) -> Option<&MeshTile> {
        self.tiles.get(index).filter(|tile| tile.header.is_some())
    }

    /// Handle of the occupied tile in a slot
    pub fn get_tile_ref(&self, index: usize) -> Option<TileRef> {
        self.get_tile_by_index(index)
            .map(|tile| TileRef::new(index as u32, tile.salt))
    }

    /// Reference of the first polygon of the occupied tile in a slot
    pub fn get_poly_ref_base(&self, index: usize) -> Option<PolyRef> {
        self.get_tile_ref(index).map(TileRef::poly_base)
    }

    /// Tile grid location containing a world position
    pub fn calc_tile_loc(&self, pos: Vec3) -> (i32, i32) {
        let tx = ((pos.x - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos.z - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    fn tile_indices_at(&self, x: i32, y: i32) -> Vec<usize> {
        let bucket = compute_tile_hash(x, y, self.tile_lut_mask);
        self.pos_lookup[bucket]
            .iter()
            .copied()
            .filter(|&index| {
                self.tiles[index]
                    .header
                    .as_ref()
                    .is_some_and(|h| h.x == x && h.y == y)
            })
            .collect()
    }

    fn tile_index_at(&self, x: i32, y: i32, layer: i32) -> Option<usize> {
        let bucket = compute_tile_hash(x, y, self.tile_lut_mask);
        self.pos_lookup[bucket].iter().copied().find(|&index| {
            self.tiles[index]
                .header
                .as_ref()
                .is_some_and(|h| h.x == x && h.y == y && h.layer == layer)
        })
    }

    /// Gets the tile at a grid location and layer
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.tile_index_at(x, y, layer).map(|index| &self.tiles[index])
    }

    /// Gets the handle of the tile at a grid location and layer
    pub fn get_tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef> {
        self.tile_index_at(x, y, layer)
            .and_then(|index| self.get_tile_ref(index))
    }

    /// Gets all layers at a grid location
    pub fn get_tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.tile_indices_at(x, y)
            .into_iter()
            .map(|index| &self.tiles[index])
            .collect()
    }

    fn check_handle(&self, tile_ref: TileRef) -> Result<usize> {
        let index = tile_ref.index() as usize;
        let tile = self.tiles.get(index).ok_or_else(|| {
            Status::invalid_param(format!(
                "tile index {} out of range (max {})",
                index,
                self.tiles.len()
            ))
        })?;
        if tile.salt != tile_ref.salt() {
            return Err(Status::StaleHandle {
                index: tile_ref.index(),
                salt: tile_ref.salt(),
                current: tile.salt,
            });
        }
        if tile.header.is_none() {
            return Err(Status::invalid_param(format!("tile slot {} is empty", index)));
        }
        Ok(index)
    }

    /// Resolves a tile handle to the live tile
    pub fn resolve(&self, tile_ref: TileRef) -> Result<&MeshTile> {
        let index = self.check_handle(tile_ref)?;
        Ok(&self.tiles[index])
    }

    /// Resolves a tile handle to the live tile for modification
    pub fn resolve_mut(&mut self, tile_ref: TileRef) -> Result<&mut MeshTile> {
        let index = self.check_handle(tile_ref)?;
        Ok(&mut self.tiles[index])
    }

    /// Gets the tile and polygon a polygon reference points to
    pub fn get_tile_and_poly_by_ref(&self, reference: PolyRef) -> Result<(&MeshTile, &Poly)> {
        if reference.is_null() {
            return Err(Status::invalid_param("null polygon reference"));
        }
        let tile = self.resolve(reference.tile_ref())?;
        let poly = tile
            .polys
            .get(reference.poly_index() as usize)
            .ok_or_else(|| {
                Status::invalid_param(format!(
                    "polygon {} out of range in tile {}",
                    reference.poly_index(),
                    reference.tile_index()
                ))
            })?;
        Ok((tile, poly))
    }

    /// Checks if a polygon reference points to a live polygon
    pub fn is_valid_poly_ref(&self, reference: PolyRef) -> bool {
        self.get_tile_and_poly_by_ref(reference).is_ok()
    }

    /// Iterates the links of a polygon
    pub fn links<'a>(&self, tile: &'a MeshTile, poly: &Poly) -> LinkIter<'a> {
        tile.poly_links(poly)
    }

    /// Adds a tile to the first free slot and connects it to its neighbours
    pub fn add_tile(&mut self, data: &[u8], flags: TileFlags) -> Result<TileRef> {
        let tile = self.decode_tile(data)?;

        let index = self.free_tiles.pop().ok_or(Status::CapacityExceeded {
            resource: Resource::Tiles,
            capacity: self.tiles.len(),
        })?;

        self.insert_tile(index, tile, flags)
    }

    /// Adds a tile to the free slot named by `tile_ref`, taking over its salt
    pub fn add_tile_at(
        &mut self,
        data: &[u8],
        flags: TileFlags,
        tile_ref: TileRef,
    ) -> Result<TileRef> {
        let index = tile_ref.index() as usize;
        if index >= self.tiles.len() {
            return Err(Status::invalid_param(format!(
                "tile index {} out of range (max {})",
                index,
                self.tiles.len()
            )));
        }
        if tile_ref.salt() == 0 {
            return Err(Status::invalid_param("tile salt must not be zero"));
        }
        let free_pos = self
            .free_tiles
            .iter()
            .position(|&i| i == index)
            .ok_or_else(|| Status::invalid_param(format!("tile slot {} is in use", index)))?;

        let tile = self.decode_tile(data)?;

        self.free_tiles.remove(free_pos);
        self.tiles[index].salt = tile_ref.salt();
        self.insert_tile(index, tile, flags)
    }

    fn decode_tile(&self, data: &[u8]) -> Result<MeshTile> {
        let tile = load_tile_from_binary(data)?;
        let header = *tile.header_ref()?;

        if header.poly_count as u32 > self.params.max_polys_per_tile {
            return Err(Status::CapacityExceeded {
                resource: Resource::Polys,
                capacity: self.params.max_polys_per_tile as usize,
            });
        }
        if self.tile_index_at(header.x, header.y, header.layer).is_some() {
            return Err(Status::AlreadyOccupied {
                x: header.x,
                y: header.y,
                layer: header.layer,
            });
        }
        Ok(tile)
    }

    fn insert_tile(&mut self, index: usize, mut tile: MeshTile, flags: TileFlags) -> Result<TileRef> {
        let header = *tile.header_ref()?;

        tile.salt = self.tiles[index].salt;
        tile.flags = flags;
        tile.init_link_free_list();
        self.tiles[index] = tile;

        let bucket = compute_tile_hash(header.x, header.y, self.tile_lut_mask);
        self.pos_lookup[bucket].push(index);

        if let Err(err) = self.connect_tile(index) {
            self.detach_tile(index);
            self.free_tiles.push(index);
            return Err(err);
        }

        let tile_ref = TileRef::new(index as u32, self.tiles[index].salt);
        log::debug!(
            "Added tile ({}, {}, {}) to slot {} with salt {}: {} polygons",
            header.x,
            header.y,
            header.layer,
            index,
            tile_ref.salt(),
            header.poly_count
        );
        Ok(tile_ref)
    }

    fn connect_tile(&mut self, index: usize) -> Result<()> {
        let header = *self.tiles[index].header_ref()?;

        // Vertex snaps are held back until every link is allocated
        let mut snaps = Vec::new();

        self.connect_int_links(index)?;
        self.base_off_mesh_links(index, &mut snaps)?;
        self.connect_ext_off_mesh_links(index, index, -1, &mut snaps)?;

        // Other layers in the same cell
        for nei in self.tile_indices_at(header.x, header.y) {
            if nei == index {
                continue;
            }
            self.connect_ext_links(index, nei, -1)?;
            self.connect_ext_links(nei, index, -1)?;
            self.connect_ext_off_mesh_links(index, nei, -1, &mut snaps)?;
            self.connect_ext_off_mesh_links(nei, index, -1, &mut snaps)?;
        }

        for side in 0..8 {
            let (dx, dy) = neighbour_offset(side);
            for nei in self.tile_indices_at(header.x + dx, header.y + dy) {
                self.connect_ext_links(index, nei, side)?;
                self.connect_ext_links(nei, index, opposite_tile(side))?;
                self.connect_ext_off_mesh_links(index, nei, side, &mut snaps)?;
                self.connect_ext_off_mesh_links(nei, index, opposite_tile(side), &mut snaps)?;
            }
        }

        self.apply_snaps(&snaps)
    }

    fn apply_links(&mut self, pending: Vec<PendingLink>) -> Result<()> {
        for p in pending {
            self.tiles[p.tile].push_link(p.poly, p.link)?;
        }
        Ok(())
    }

    fn apply_snaps(&mut self, snaps: &[PendingSnap]) -> Result<()> {
        let in_range = |snap: &PendingSnap| {
            let end = (snap.vert as usize + 1) * 3;
            self.tiles
                .get(snap.tile)
                .is_some_and(|tile| end <= tile.verts.len())
        };
        if let Some(snap) = snaps.iter().find(|snap| !in_range(snap)) {
            return Err(Status::DataCorrupted(format!(
                "off-mesh vertex {} outside tile {}",
                snap.vert, snap.tile
            )));
        }

        for snap in snaps {
            let i = snap.vert as usize * 3;
            if let Some(vert) = self
                .tiles
                .get_mut(snap.tile)
                .and_then(|tile| tile.verts.get_mut(i..i + 3))
            {
                vert.copy_from_slice(&snap.pos.to_array());
            }
        }
        Ok(())
    }

    /// Links polygons of a tile that share an edge
    fn connect_int_links(&mut self, index: usize) -> Result<()> {
        let base = TileRef::new(index as u32, self.tiles[index].salt);
        let tile = &mut self.tiles[index];

        for poly_index in 0..tile.polys.len() {
            let poly = tile.polys[poly_index].clone();
            if poly.is_off_mesh_connection() {
                continue;
            }
            for edge in (0..poly.vert_count as usize).rev() {
                let nei = poly.neis[edge];
                if nei == 0 || nei & DT_EXT_LINK != 0 {
                    continue;
                }
                let target = PolyRef::encode(base.salt(), base.index(), nei as u32 - 1);
                tile.push_link(poly_index, Link::new(target, edge as u8, DT_LINK_INTERNAL))?;
            }
        }
        Ok(())
    }

    /// Links off-mesh connection start points to the polygons they land on inside the tile
    fn base_off_mesh_links(&mut self, index: usize, snaps: &mut Vec<PendingSnap>) -> Result<()> {
        let tile = &self.tiles[index];
        let base = TileRef::new(index as u32, tile.salt);
        let climb = tile.walkable_climb();

        let mut links = Vec::new();
        for con in &tile.off_mesh_cons {
            let Some(con_poly) = tile.polys.get(con.poly as usize) else {
                continue;
            };
            let start = con.start_pos();
            let half_extents = Vec3::new(con.radius, climb, con.radius);
            let Some((land, nearest)) = find_nearest_poly_in_tile(tile, start, half_extents)
            else {
                continue;
            };
            if !within_radius_xz(nearest, start, con.radius) {
                continue;
            }

            snaps.push(PendingSnap {
                tile: index,
                vert: con_poly.verts[0],
                pos: nearest,
            });
            links.push(PendingLink {
                tile: index,
                poly: con.poly as usize,
                link: Link::new(
                    PolyRef::encode(base.salt(), base.index(), land as u32),
                    0,
                    DT_LINK_INTERNAL,
                ),
            });
            links.push(PendingLink {
                tile: index,
                poly: land,
                link: Link::new(
                    PolyRef::encode(base.salt(), base.index(), con.poly as u32),
                    0xff,
                    DT_LINK_INTERNAL,
                ),
            });
        }

        self.apply_links(links)
    }

    /// Polygons of `target` with a portal edge facing `side` that overlaps the edge va-vb
    fn find_connecting_polys(
        &self,
        va: Vec3,
        vb: Vec3,
        target: usize,
        side: i32,
    ) -> Vec<(PolyRef, [f32; 2])> {
        let tile = &self.tiles[target];
        let base = TileRef::new(target as u32, tile.salt);
        let climb = tile.walkable_climb();

        let (amin, amax) = slab_end_points(va, vb, side);
        let apos = slab_coord(va, side);
        let portal = DT_EXT_LINK | side as u16;

        let mut found = Vec::new();
        for (poly_index, poly) in tile.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for edge in 0..nv {
                if poly.neis[edge] != portal {
                    continue;
                }
                let vc = tile.vert(poly.verts[edge]);
                let vd = tile.vert(poly.verts[(edge + 1) % nv]);
                if (apos - slab_coord(vc, side)).abs() > 0.01 {
                    continue;
                }

                let (bmin, bmax) = slab_end_points(vc, vd, side);
                if !overlap_slabs(amin, amax, bmin, bmax, 0.01, climb) {
                    continue;
                }

                found.push((
                    PolyRef::encode(base.salt(), base.index(), poly_index as u32),
                    [amin[0].max(bmin[0]), amax[0].min(bmax[0])],
                ));
                break;
            }
        }
        found
    }

    /// Links the portal edges of `index` facing `side` to the polygons of `target`
    fn connect_ext_links(&mut self, index: usize, target: usize, side: i32) -> Result<()> {
        let tile = &self.tiles[index];
        let mut links = Vec::new();

        for (poly_index, poly) in tile.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for edge in 0..nv {
                if poly.neis[edge] & DT_EXT_LINK == 0 {
                    continue;
                }
                let dir = (poly.neis[edge] & 0xff) as i32;
                if side != -1 && dir != side {
                    continue;
                }

                let va = tile.vert(poly.verts[edge]);
                let vb = tile.vert(poly.verts[(edge + 1) % nv]);
                for (reference, area) in self.find_connecting_polys(va, vb, target, opposite_tile(dir)) {
                    let mut link = Link::new(reference, edge as u8, dir as u8);

                    let range = match dir {
                        0 | 4 => Some((va.z, vb.z)),
                        2 | 6 => Some((va.x, vb.x)),
                        _ => None,
                    };
                    if let Some((a, b)) = range {
                        let mut tmin = (area[0] - a) / (b - a);
                        let mut tmax = (area[1] - a) / (b - a);
                        if tmin > tmax {
                            std::mem::swap(&mut tmin, &mut tmax);
                        }
                        link.bmin = (tmin.clamp(0.0, 1.0) * 255.0).round() as u8;
                        link.bmax = (tmax.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }

                    links.push(PendingLink {
                        tile: index,
                        poly: poly_index,
                        link,
                    });
                }
            }
        }

        self.apply_links(links)
    }

    /// Links off-mesh connections of `target` ending in `index` to their landing polygons
    fn connect_ext_off_mesh_links(
        &mut self,
        index: usize,
        target: usize,
        side: i32,
        snaps: &mut Vec<PendingSnap>,
    ) -> Result<()> {
        let tile = &self.tiles[index];
        let target_tile = &self.tiles[target];
        let tile_base = TileRef::new(index as u32, tile.salt);
        let target_base = TileRef::new(target as u32, target_tile.salt);
        let opposite_side = if side == -1 {
            DT_LINK_INTERNAL
        } else {
            opposite_tile(side) as u8
        };
        let climb = target_tile.walkable_climb();

        let mut links = Vec::new();
        for con in &target_tile.off_mesh_cons {
            if con.side != opposite_side {
                continue;
            }
            let Some(con_poly) = target_tile.polys.get(con.poly as usize) else {
                continue;
            };
            // Only connections whose start point found a landing polygon
            if con_poly.first_link.is_none() {
                continue;
            }

            let end = con.end_pos();
            let half_extents = Vec3::new(con.radius, climb, con.radius);
            let Some((land, nearest)) = find_nearest_poly_in_tile(tile, end, half_extents) else {
                continue;
            };
            if !within_radius_xz(nearest, end, con.radius) {
                continue;
            }

            snaps.push(PendingSnap {
                tile: target,
                vert: con_poly.verts[1],
                pos: nearest,
            });
            links.push(PendingLink {
                tile: target,
                poly: con.poly as usize,
                link: Link::new(
                    PolyRef::encode(tile_base.salt(), tile_base.index(), land as u32),
                    1,
                    opposite_side,
                ),
            });

            if con.is_bidirectional() {
                let back_side = if side == -1 { DT_LINK_INTERNAL } else { side as u8 };
                links.push(PendingLink {
                    tile: index,
                    poly: land,
                    link: Link::new(
                        PolyRef::encode(target_base.salt(), target_base.index(), con.poly as u32),
                        0xff,
                        back_side,
                    ),
                });
            }
        }

        self.apply_links(links)
    }

    /// Removes a tile, returning the data it was loaded from
    ///
    /// The slot's salt is advanced, so `tile_ref` and every polygon reference
    /// into the tile become stale.
    pub fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Vec<u8>> {
        let index = self.check_handle(tile_ref)?;
        let header = *self.tiles[index].header_ref()?;

        let data = self.detach_tile(index);

        let tile = &mut self.tiles[index];
        tile.salt = (tile.salt + 1) & DT_SALT_MASK;
        if tile.salt == 0 {
            tile.salt = 1;
        }
        self.free_tiles.push(index);

        log::debug!(
            "Removed tile ({}, {}, {}) from slot {}, next salt {}",
            header.x,
            header.y,
            header.layer,
            index,
            self.tiles[index].salt
        );
        Ok(data)
    }

    /// Disconnects a tile from the graph and empties its slot, keeping the salt
    fn detach_tile(&mut self, index: usize) -> Vec<u8> {
        let Some(header) = self.tiles[index].header else {
            return Vec::new();
        };

        let bucket = compute_tile_hash(header.x, header.y, self.tile_lut_mask);
        self.pos_lookup[bucket].retain(|&i| i != index);

        let mut neighbours = self.tile_indices_at(header.x, header.y);
        for side in 0..8 {
            let (dx, dy) = neighbour_offset(side);
            neighbours.extend(self.tile_indices_at(header.x + dx, header.y + dy));
        }
        for nei in neighbours {
            self.tiles[nei].unlink_tile(index as u32);
        }

        let salt = self.tiles[index].salt;
        let old = std::mem::take(&mut self.tiles[index]);
        self.tiles[index].salt = salt;
        old.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::{build_grid_tile, GridTileSpec, OffMeshSpec};
    use crate::DT_SALT_BITS;

    fn new_mesh() -> NavMesh {
        NavMesh::new(GridTileSpec::default_params()).unwrap()
    }

    fn links_of(mesh: &NavMesh, tile_ref: TileRef, poly: usize) -> Vec<Link> {
        let tile = mesh.resolve(tile_ref).unwrap();
        mesh.links(tile, &tile.polys[poly]).copied().collect()
    }

    #[test]
    fn test_new_validates_params() {
        let mut params = GridTileSpec::default_params();
        assert!(NavMesh::new(params).is_ok());

        params.max_tiles = 0;
        assert!(matches!(NavMesh::new(params), Err(Status::InvalidParam(_))));

        params.max_tiles = (1 << DT_TILE_BITS) + 1;
        assert!(NavMesh::new(params).is_err());

        params = GridTileSpec::default_params();
        params.tile_width = 0.0;
        assert!(NavMesh::new(params).is_err());

        params = GridTileSpec::default_params();
        params.origin[1] = f32::NAN;
        assert!(NavMesh::new(params).is_err());
    }

    #[test]
    fn test_lookup_buckets() {
        let mesh = new_mesh();
        assert_eq!(mesh.pos_lookup.len(), 4);

        let mut params = GridTileSpec::default_params();
        params.max_tiles = 1;
        let small = NavMesh::new(params).unwrap();
        assert_eq!(small.pos_lookup.len(), 1);
        assert_eq!(small.tile_lut_mask, 0);
    }

    #[test]
    fn test_add_tile_assigns_first_free_slot() {
        let mut mesh = new_mesh();
        let tile_ref = mesh
            .add_tile(&build_grid_tile(&GridTileSpec::new(3, 4)), TileFlags::FREE_DATA)
            .unwrap();

        assert_eq!(tile_ref, TileRef::new(0, 1));
        assert_eq!(mesh.tile_count(), 1);
        assert!(mesh.get_tile_at(3, 4, 0).is_some());
        assert!(mesh.get_tile_at(3, 4, 1).is_none());
        assert_eq!(mesh.get_tile_ref_at(3, 4, 0), Some(tile_ref));
        assert_eq!(mesh.get_poly_ref_base(0), Some(PolyRef::encode(1, 0, 0)));
        assert_eq!(mesh.get_tiles_at(3, 4).len(), 1);
    }

    #[test]
    fn test_calc_tile_loc() {
        let mesh = new_mesh();
        assert_eq!(mesh.calc_tile_loc(Vec3::new(15.0, 3.0, 25.0)), (1, 2));
        assert_eq!(mesh.calc_tile_loc(Vec3::new(-0.5, 0.0, 0.5)), (-1, 0));
    }

    #[test]
    fn test_internal_links() {
        let mut mesh = new_mesh();
        let tile_ref = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(0, 0).with_size(2, 1)),
                TileFlags::FREE_DATA,
            )
            .unwrap();

        let links = links_of(&mesh, tile_ref, 0);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].reference, PolyRef::encode(1, 0, 1));
        assert_eq!(links[0].side, 0xff);
        assert_eq!(links[0].edge, 2);

        let back = links_of(&mesh, tile_ref, 1);
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].reference, PolyRef::encode(1, 0, 0));
    }

    #[test]
    fn test_external_links_connect_both_ways() {
        let mut mesh = new_mesh();
        let left = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(0, 0).with_size(2, 2).with_portals()),
                TileFlags::FREE_DATA,
            )
            .unwrap();
        let right = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(1, 0).with_size(2, 2).with_portals()),
                TileFlags::FREE_DATA,
            )
            .unwrap();

        // Cell (1, 0) of the left tile borders cell (0, 0) of the right tile
        let links = links_of(&mesh, left, 1);
        let portal: Vec<_> = links.iter().filter(|l| l.side == 0).collect();
        assert_eq!(portal.len(), 1);
        assert_eq!(portal[0].reference, PolyRef::encode(right.salt(), right.index(), 0));
        assert_eq!((portal[0].bmin, portal[0].bmax), (0, 255));

        let back: Vec<_> = links_of(&mesh, right, 0)
            .into_iter()
            .filter(|l| l.side == 4)
            .collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].reference, PolyRef::encode(left.salt(), left.index(), 1));
    }

    #[test]
    fn test_remove_tile_makes_handles_stale() {
        let mut mesh = new_mesh();
        let data = build_grid_tile(&GridTileSpec::new(0, 0));
        let tile_ref = mesh.add_tile(&data, TileFlags::FREE_DATA).unwrap();
        let poly_ref = tile_ref.poly_base();
        assert!(mesh.is_valid_poly_ref(poly_ref));

        let returned = mesh.remove_tile(tile_ref).unwrap();
        assert_eq!(returned, data);
        assert_eq!(mesh.tile_count(), 0);
        assert!(mesh.get_tile_at(0, 0, 0).is_none());

        assert!(matches!(
            mesh.resolve(tile_ref),
            Err(Status::StaleHandle {
                index: 0,
                salt: 1,
                current: 2
            })
        ));
        assert!(!mesh.is_valid_poly_ref(poly_ref));
        assert!(matches!(
            mesh.remove_tile(tile_ref),
            Err(Status::StaleHandle { .. })
        ));

        // The slot is reused with the new salt
        let again = mesh.add_tile(&data, TileFlags::FREE_DATA).unwrap();
        assert_eq!(again, TileRef::new(0, 2));
        assert!(mesh.resolve(tile_ref).is_err());
        assert!(mesh.resolve(again).is_ok());
    }

    #[test]
    fn test_salt_wraps_and_skips_zero() {
        let mut params = GridTileSpec::default_params();
        params.max_tiles = 1;
        let mut mesh = NavMesh::new(params).unwrap();
        let data = build_grid_tile(&GridTileSpec::new(0, 0));

        let max_salt = (1u32 << DT_SALT_BITS) - 1;
        let mut last = TileRef::new(0, 1);
        for _ in 0..max_salt {
            last = mesh.add_tile(&data, TileFlags::FREE_DATA).unwrap();
            mesh.remove_tile(last).unwrap();
        }
        assert_eq!(last.salt(), max_salt);

        let wrapped = mesh.add_tile(&data, TileFlags::FREE_DATA).unwrap();
        assert_eq!(wrapped.salt(), 1);
    }

    #[test]
    fn test_remove_unlinks_neighbours() {
        let mut mesh = new_mesh();
        let left = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(0, 0).with_portals()),
                TileFlags::FREE_DATA,
            )
            .unwrap();
        let right = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(1, 0).with_portals()),
                TileFlags::FREE_DATA,
            )
            .unwrap();

        let before = mesh.resolve(left).unwrap().links_free_list;
        assert!(links_of(&mesh, left, 0).iter().any(|l| l.side == 0));

        mesh.remove_tile(right).unwrap();

        let tile = mesh.resolve(left).unwrap();
        assert!(links_of(&mesh, left, 0).iter().all(|l| l.side != 0));
        // The freed portal link is back on top of the free list
        assert_ne!(tile.links_free_list, before);
        assert!(tile.links_free_list.is_some());
    }

    #[test]
    fn test_occupied_location() {
        let mut mesh = new_mesh();
        let data = build_grid_tile(&GridTileSpec::new(2, 2));
        mesh.add_tile(&data, TileFlags::FREE_DATA).unwrap();

        assert!(matches!(
            mesh.add_tile(&data, TileFlags::FREE_DATA),
            Err(Status::AlreadyOccupied {
                x: 2,
                y: 2,
                layer: 0
            })
        ));

        let layered = build_grid_tile(&GridTileSpec::new(2, 2).with_layer(1));
        mesh.add_tile(&layered, TileFlags::FREE_DATA).unwrap();
        assert_eq!(mesh.get_tiles_at(2, 2).len(), 2);
        assert_eq!(mesh.tile_count(), 2);
    }

    #[test]
    fn test_tile_capacity() {
        let mut params = GridTileSpec::default_params();
        params.max_tiles = 2;
        let mut mesh = NavMesh::new(params).unwrap();

        mesh.add_tile(&build_grid_tile(&GridTileSpec::new(0, 0)), TileFlags::FREE_DATA)
            .unwrap();
        mesh.add_tile(&build_grid_tile(&GridTileSpec::new(5, 5)), TileFlags::FREE_DATA)
            .unwrap();

        let err = mesh
            .add_tile(&build_grid_tile(&GridTileSpec::new(9, 9)), TileFlags::FREE_DATA)
            .unwrap_err();
        assert!(matches!(
            err,
            Status::CapacityExceeded {
                resource: Resource::Tiles,
                capacity: 2
            }
        ));
    }

    #[test]
    fn test_poly_capacity() {
        let mut params = GridTileSpec::default_params();
        params.max_polys_per_tile = 3;
        let mut mesh = NavMesh::new(params).unwrap();

        let err = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(0, 0).with_size(2, 2)),
                TileFlags::FREE_DATA,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Status::CapacityExceeded {
                resource: Resource::Polys,
                capacity: 3
            }
        ));
        assert_eq!(mesh.tile_count(), 0);
    }

    #[test]
    fn test_link_exhaustion_releases_slot() {
        let mut mesh = new_mesh();
        let data = build_grid_tile(&GridTileSpec::new(0, 0).with_size(2, 2).with_link_slots(3));

        let err = mesh.add_tile(&data, TileFlags::FREE_DATA).unwrap_err();
        assert!(matches!(
            err,
            Status::CapacityExceeded {
                resource: Resource::Links,
                capacity: 3
            }
        ));
        assert_eq!(mesh.tile_count(), 0);
        assert!(mesh.get_tile_at(0, 0, 0).is_none());

        // The slot kept its salt because no handle was issued
        let ok = mesh
            .add_tile(&build_grid_tile(&GridTileSpec::new(0, 0)), TileFlags::FREE_DATA)
            .unwrap();
        assert_eq!(ok, TileRef::new(0, 1));
    }

    #[test]
    fn test_link_free_list_reuses_slots() {
        let mut tile = MeshTile::new();
        tile.links = vec![Link::default(); 3];
        tile.polys = vec![Poly::new(0, PolyType::Ground, PolyFlags::WALK)];
        tile.init_link_free_list();

        assert_eq!(tile.alloc_link().unwrap(), 0);
        assert_eq!(tile.alloc_link().unwrap(), 1);
        assert_eq!(tile.alloc_link().unwrap(), 2);
        assert!(tile.alloc_link().unwrap_err().is_capacity_exceeded());

        tile.free_link(1);
        assert_eq!(tile.alloc_link().unwrap(), 1);
    }

    #[test]
    fn test_unlink_tile_keeps_other_links() {
        let mut tile = MeshTile::new();
        tile.links = vec![Link::default(); 4];
        tile.polys = vec![Poly::new(0, PolyType::Ground, PolyFlags::WALK)];
        tile.init_link_free_list();

        tile.push_link(0, Link::new(PolyRef::encode(1, 2, 0), 0, 0)).unwrap();
        tile.push_link(0, Link::new(PolyRef::encode(1, 5, 0), 1, 0)).unwrap();
        tile.push_link(0, Link::new(PolyRef::encode(1, 2, 3), 2, 0)).unwrap();

        tile.unlink_tile(2);

        let remaining: Vec<_> = tile.poly_links(&tile.polys[0]).collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].reference.tile_index(), 5);

        // Two freed slots plus the untouched one
        for _ in 0..3 {
            tile.alloc_link().unwrap();
        }
        assert!(tile.alloc_link().is_err());
    }

    #[test]
    fn test_add_tile_at() {
        let mut mesh = new_mesh();
        let data = build_grid_tile(&GridTileSpec::new(1, 1));

        let tile_ref = mesh
            .add_tile_at(&data, TileFlags::FREE_DATA, TileRef::new(5, 9))
            .unwrap();
        assert_eq!(tile_ref, TileRef::new(5, 9));
        assert_eq!(mesh.get_tile_ref(5), Some(tile_ref));

        let other = build_grid_tile(&GridTileSpec::new(4, 4));
        assert!(matches!(
            mesh.add_tile_at(&other, TileFlags::FREE_DATA, TileRef::new(5, 1)),
            Err(Status::InvalidParam(_))
        ));
        assert!(matches!(
            mesh.add_tile_at(&other, TileFlags::FREE_DATA, TileRef::new(99, 1)),
            Err(Status::InvalidParam(_))
        ));

        // The remaining free slots are still handed out in order
        let next = mesh.add_tile(&other, TileFlags::FREE_DATA).unwrap();
        assert_eq!(next.index(), 0);
    }

    #[test]
    fn test_get_tile_and_poly_by_ref() {
        let mut mesh = new_mesh();
        let tile_ref = mesh
            .add_tile(
                &build_grid_tile(&GridTileSpec::new(0, 0).with_size(2, 1)),
                TileFlags::FREE_DATA,
            )
            .unwrap();

        let (tile, poly) = mesh
            .get_tile_and_poly_by_ref(PolyRef::encode(tile_ref.salt(), tile_ref.index(), 1))
            .unwrap();
        assert_eq!(tile.polys.len(), 2);
        assert_eq!(poly.vert_count, 4);

        assert!(mesh.get_tile_and_poly_by_ref(PolyRef::new(0)).is_err());
        assert!(!mesh.is_valid_poly_ref(PolyRef::encode(tile_ref.salt(), tile_ref.index(), 7)));
    }

    #[test]
    fn test_off_mesh_connection_links() {
        let mut mesh = new_mesh();
        let spec = GridTileSpec::new(0, 0)
            .with_size(2, 1)
            .with_off_mesh(OffMeshSpec::new([2.0, 0.0, 5.0], [8.0, 0.0, 5.0], 1.0).bidirectional());
        let tile_ref = mesh.add_tile(&build_grid_tile(&spec), TileFlags::FREE_DATA).unwrap();

        let tile = mesh.resolve(tile_ref).unwrap();
        let con_poly = tile.off_mesh_cons[0].poly as usize;
        assert_eq!(con_poly, 2);

        let out = links_of(&mesh, tile_ref, con_poly);
        let start = out.iter().find(|l| l.edge == 0).unwrap();
        let end = out.iter().find(|l| l.edge == 1).unwrap();
        assert_eq!(start.reference.poly_index(), 0);
        assert_eq!(end.reference.poly_index(), 1);

        // Landing polygons link back to the connection
        let con_ref = PolyRef::encode(tile_ref.salt(), tile_ref.index(), con_poly as u32);
        for land in [0, 1] {
            assert!(links_of(&mesh, tile_ref, land)
                .iter()
                .any(|l| l.reference == con_ref && l.edge == 0xff));
        }
    }

    #[test]
    fn test_off_mesh_connection_without_landing() {
        let mut mesh = new_mesh();
        let spec = GridTileSpec::new(0, 0)
            .with_off_mesh(OffMeshSpec::new([50.0, 0.0, 50.0], [2.0, 0.0, 2.0], 0.5));
        let tile_ref = mesh.add_tile(&build_grid_tile(&spec), TileFlags::FREE_DATA).unwrap();

        let tile = mesh.resolve(tile_ref).unwrap();
        let con_poly = tile.off_mesh_cons[0].poly as usize;
        assert!(links_of(&mesh, tile_ref, con_poly).is_empty());
    }

    #[test]
    fn test_off_mesh_connection_into_neighbour() {
        let mut mesh = new_mesh();
        let spec = GridTileSpec::new(0, 0).with_off_mesh(
            OffMeshSpec::new([8.0, 0.0, 5.0], [12.0, 0.0, 5.0], 1.0)
                .bidirectional()
                .with_side(0),
        );
        let left = mesh.add_tile(&build_grid_tile(&spec), TileFlags::FREE_DATA).unwrap();
        assert!(links_of(&mesh, left, 1).iter().all(|l| l.edge != 1));

        let right = mesh
            .add_tile(&build_grid_tile(&GridTileSpec::new(1, 0)), TileFlags::FREE_DATA)
            .unwrap();

        let end = links_of(&mesh, left, 1)
            .into_iter()
            .find(|l| l.edge == 1)
            .unwrap();
        assert_eq!(end.reference, right.poly_base());
        assert_eq!(end.side, 0);

        let back = links_of(&mesh, right, 0);
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].reference, PolyRef::encode(left.salt(), left.index(), 1));
        assert_eq!(back[0].side, 4);

        // Removing the landing tile drops the connection end again
        mesh.remove_tile(right).unwrap();
        assert!(links_of(&mesh, left, 1).iter().all(|l| l.edge != 1));
    }

    #[test]
    fn test_failed_add_keeps_neighbour_vertices() {
        let mut mesh = new_mesh();
        let spec = GridTileSpec::new(0, 0).with_off_mesh(
            OffMeshSpec::new([8.0, 0.0, 5.0], [12.0, 0.5, 5.0], 1.0)
                .bidirectional()
                .with_side(0),
        );
        let left = mesh.add_tile(&build_grid_tile(&spec), TileFlags::FREE_DATA).unwrap();
        let end_vert = |mesh: &NavMesh| mesh.resolve(left).unwrap().vert(5);
        assert_eq!(end_vert(&mesh), Vec3::new(12.0, 0.5, 5.0));

        // No slot left for the link back into the connection
        let starved = build_grid_tile(&GridTileSpec::new(1, 0).with_link_slots(0));
        let err = mesh.add_tile(&starved, TileFlags::FREE_DATA).unwrap_err();
        assert!(matches!(
            err,
            Status::CapacityExceeded {
                resource: Resource::Links,
                ..
            }
        ));
        assert_eq!(mesh.tile_count(), 1);
        assert_eq!(end_vert(&mesh), Vec3::new(12.0, 0.5, 5.0));
        assert!(links_of(&mesh, left, 1).iter().all(|l| l.edge != 1));

        mesh.add_tile(&build_grid_tile(&GridTileSpec::new(1, 0)), TileFlags::FREE_DATA)
            .unwrap();
        assert_eq!(end_vert(&mesh), Vec3::new(12.0, 0.0, 5.0));
    }

    #[test]
    fn test_closest_point_on_poly() {
        let mut tile = MeshTile::new();
        tile.verts = vec![0.0, 1.0, 0.0, 0.0, 1.0, 2.0, 2.0, 1.0, 2.0, 2.0, 1.0, 0.0];
        let mut poly = Poly::new(0, PolyType::Ground, PolyFlags::WALK);
        poly.vert_count = 4;
        poly.verts[..4].copy_from_slice(&[0, 1, 2, 3]);

        let inside = closest_point_on_poly(&tile, &poly, Vec3::new(1.0, 5.0, 1.5));
        assert_eq!(inside, Vec3::new(1.0, 1.0, 1.5));

        let outside = closest_point_on_poly(&tile, &poly, Vec3::new(3.0, 0.0, 1.0));
        assert_eq!(outside, Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn test_overlap_slabs() {
        assert!(overlap_slabs([0.0, 0.0], [5.0, 0.0], [0.0, 0.0], [5.0, 0.0], 0.01, 0.5));
        // Touching only at an end point
        assert!(!overlap_slabs([0.0, 0.0], [5.0, 0.0], [5.0, 0.0], [10.0, 0.0], 0.01, 0.5));
        // Too far apart vertically
        assert!(!overlap_slabs([0.0, 0.0], [5.0, 0.0], [0.0, 3.0], [5.0, 3.0], 0.01, 0.5));
        // Crossing
        assert!(overlap_slabs([0.0, 0.0], [5.0, 4.0], [0.0, 4.0], [5.0, 0.0], 0.01, 0.1));
    }

    #[test]
    fn test_link_iter_stops_on_bad_index() {
        let tile = MeshTile::new();
        let mut poly = Poly::new(0, PolyType::Ground, PolyFlags::WALK);
        poly.first_link = Some(4);
        assert_eq!(tile.poly_links(&poly).count(), 0);
    }

    #[cfg(feature = "serialization")]
    #[test]
    fn test_tile_json_round_trip() {
        let mut mesh = new_mesh();
        let tile_ref = mesh
            .add_tile(&build_grid_tile(&GridTileSpec::new(0, 0)), TileFlags::FREE_DATA)
            .unwrap();
        let tile = mesh.resolve(tile_ref).unwrap();

        let json = tile.to_json_bytes().unwrap();
        let restored = MeshTile::from_json_bytes(&json).unwrap();
        assert_eq!(restored.header, tile.header);
        assert_eq!(restored.polys, tile.polys);
        assert_eq!(restored.links, tile.links);
        assert!(MeshTile::from_json_bytes(b"not json").is_err());
    }
}
