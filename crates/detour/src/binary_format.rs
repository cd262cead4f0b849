//! Binary format for navigation mesh tiles and mesh-set files
//!
//! Every record is little-endian with fixed field offsets. Floats are written
//! as their IEEE-754 bit patterns, so decoding reproduces them bit for bit.
//!
//! A tile is a 100 byte [`MeshHeader`] followed by its variable-length sections
//! in this order, each padded to 4 bytes: vertices, polygons, links, detail
//! meshes, detail vertices, detail triangles, BV-tree nodes and off-mesh
//! connections. The header counts fix the length of every section.
//!
//! A mesh-set file is a [`NavMeshSetHeader`] followed by one
//! [`NavMeshTileHeader`] plus tile data per tile.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use super::nav_mesh::{BVNode, Link, MeshTile, OffMeshConnection, Poly, PolyDetail};
use super::{
    NavMesh, NavMeshParams, PolyFlags, PolyRef, PolyType, Result, Status, TileFlags, TileRef,
    DT_EXT_LINK, DT_NULL_LINK, MAX_VERTS_PER_POLY,
};

const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> i32 {
    ((a as i32) << 24) | ((b as i32) << 16) | ((c as i32) << 8) | (d as i32)
}

/// Magic number for navigation mesh tile data ('DNAV')
pub const DT_NAVMESH_MAGIC: i32 = fourcc(b'D', b'N', b'A', b'V');

/// Current navigation mesh tile data version
pub const DT_NAVMESH_VERSION: i32 = 7;

/// Magic number for mesh-set files ('MSET')
pub const NAVMESHSET_MAGIC: i32 = fourcc(b'M', b'S', b'E', b'T');

/// Current mesh-set file version
pub const NAVMESHSET_VERSION: i32 = 1;

const VERT_SIZE: usize = 12;
const POLY_SIZE: usize = 32;
const LINK_SIZE: usize = 12;
const POLY_DETAIL_SIZE: usize = 12;
const DETAIL_TRI_SIZE: usize = 4;
const BV_NODE_SIZE: usize = 16;
const OFF_MESH_CON_SIZE: usize = 36;

/// Align value to 4-byte boundary
fn align4(value: usize) -> usize {
    (value + 3) & !3
}

/// A fixed-size little-endian record
///
/// `serialize` checks the destination length before touching it, so an
/// undersized buffer is reported as [`Status::BufferTooSmall`] and left
/// unmodified.
pub trait BinaryRecord: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Writes the fields in wire order
    fn write_fields<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Reads the fields in wire order
    fn read_fields<R: Read>(reader: &mut R) -> io::Result<Self>;

    /// Encoded size in bytes, independent of field values
    fn size(&self) -> usize {
        Self::SIZE
    }

    /// Encodes the record into the front of `dst`, returning the bytes written
    fn serialize(&self, dst: &mut [u8]) -> Result<usize> {
        if dst.len() < Self::SIZE {
            return Err(Status::BufferTooSmall {
                needed: Self::SIZE,
                available: dst.len(),
            });
        }
        let mut writer = &mut dst[..Self::SIZE];
        self.write_fields(&mut writer)?;
        Ok(Self::SIZE)
    }

    /// Decodes the record from the front of `src`
    fn deserialize(src: &[u8]) -> Result<Self> {
        if src.len() < Self::SIZE {
            return Err(Status::BufferTooSmall {
                needed: Self::SIZE,
                available: src.len(),
            });
        }
        let mut reader = &src[..Self::SIZE];
        Ok(Self::read_fields(&mut reader)?)
    }

    /// Encodes the record into a contiguous buffer and hands it to `writer` in one write
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut buffer = vec![0u8; Self::SIZE];
        self.serialize(&mut buffer)?;
        writer.write_all(&buffer)?;
        Ok(Self::SIZE)
    }
}

impl BinaryRecord for NavMeshParams {
    const SIZE: usize = 28;

    fn write_fields<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for &v in &self.origin {
            writer.write_f32::<LittleEndian>(v)?;
        }
        writer.write_f32::<LittleEndian>(self.tile_width)?;
        writer.write_f32::<LittleEndian>(self.tile_height)?;
        writer.write_u32::<LittleEndian>(self.max_tiles)?;
        writer.write_u32::<LittleEndian>(self.max_polys_per_tile)?;
        Ok(())
    }

    fn read_fields<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut origin = [0.0; 3];
        for v in &mut origin {
            *v = reader.read_f32::<LittleEndian>()?;
        }
        Ok(Self {
            origin,
            tile_width: reader.read_f32::<LittleEndian>()?,
            tile_height: reader.read_f32::<LittleEndian>()?,
            max_tiles: reader.read_u32::<LittleEndian>()?,
            max_polys_per_tile: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Header of a mesh-set file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavMeshSetHeader {
    pub magic: i32,
    pub version: i32,
    pub num_tiles: i32,
    pub params: NavMeshParams,
}

impl NavMeshSetHeader {
    /// Creates a header with the current magic and version
    pub fn new(num_tiles: i32, params: NavMeshParams) -> Self {
        Self {
            magic: NAVMESHSET_MAGIC,
            version: NAVMESHSET_VERSION,
            num_tiles,
            params,
        }
    }

    /// Checks magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != NAVMESHSET_MAGIC {
            return Err(Status::WrongMagic {
                expected: NAVMESHSET_MAGIC,
                found: self.magic,
            });
        }
        if self.version != NAVMESHSET_VERSION {
            return Err(Status::WrongVersion {
                expected: NAVMESHSET_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }
}

impl BinaryRecord for NavMeshSetHeader {
    const SIZE: usize = 12 + NavMeshParams::SIZE;

    fn write_fields<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.magic)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.num_tiles)?;
        self.params.write_fields(writer)
    }

    fn read_fields<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            magic: reader.read_i32::<LittleEndian>()?,
            version: reader.read_i32::<LittleEndian>()?,
            num_tiles: reader.read_i32::<LittleEndian>()?,
            params: NavMeshParams::read_fields(reader)?,
        })
    }
}

/// Per-tile prefix inside a mesh-set file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavMeshTileHeader {
    /// Raw id of the tile handle the tile was saved under
    pub tile_ref: u32,
    /// Length of the tile data that follows
    pub data_size: i32,
}

impl BinaryRecord for NavMeshTileHeader {
    const SIZE: usize = 8;

    fn write_fields<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.tile_ref)?;
        writer.write_i32::<LittleEndian>(self.data_size)
    }

    fn read_fields<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            tile_ref: reader.read_u32::<LittleEndian>()?,
            data_size: reader.read_i32::<LittleEndian>()?,
        })
    }
}

/// Header of a navigation mesh tile
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshHeader {
    /// Tile magic number, identifies the data format
    pub magic: i32,
    /// Tile data format version
    pub version: i32,
    /// Position of the tile in the tile grid (x, y, layer)
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    /// User defined id of the tile
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    /// Number of allocated link slots
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    /// Unique detail vertices, in addition to the polygon vertices
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    /// Zero when bounding volumes are disabled
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    /// Index of the first polygon which is an off-mesh connection
    pub off_mesh_base: i32,
    /// Height of the agents using the tile
    pub walkable_height: f32,
    /// Radius of the agents using the tile
    pub walkable_radius: f32,
    /// Maximum climb height of the agents using the tile
    pub walkable_climb: f32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Bounding volume quantization factor
    pub bv_quant_factor: f32,
}

impl MeshHeader {
    /// Creates an empty header for the grid location with the current magic and version
    pub fn new(x: i32, y: i32, layer: i32) -> Self {
        Self {
            magic: DT_NAVMESH_MAGIC,
            version: DT_NAVMESH_VERSION,
            x,
            y,
            layer,
            user_id: 0,
            poly_count: 0,
            vert_count: 0,
            max_link_count: 0,
            detail_mesh_count: 0,
            detail_vert_count: 0,
            detail_tri_count: 0,
            bv_node_count: 0,
            off_mesh_con_count: 0,
            off_mesh_base: 0,
            walkable_height: 0.0,
            walkable_radius: 0.0,
            walkable_climb: 0.0,
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            bv_quant_factor: 0.0,
        }
    }

    /// Checks magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != DT_NAVMESH_MAGIC {
            return Err(Status::WrongMagic {
                expected: DT_NAVMESH_MAGIC,
                found: self.magic,
            });
        }
        if self.version != DT_NAVMESH_VERSION {
            return Err(Status::WrongVersion {
                expected: DT_NAVMESH_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }
}

impl BinaryRecord for MeshHeader {
    const SIZE: usize = 100;

    fn write_fields<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.magic)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.x)?;
        writer.write_i32::<LittleEndian>(self.y)?;
        writer.write_i32::<LittleEndian>(self.layer)?;
        writer.write_u32::<LittleEndian>(self.user_id)?;
        writer.write_i32::<LittleEndian>(self.poly_count)?;
        writer.write_i32::<LittleEndian>(self.vert_count)?;
        writer.write_i32::<LittleEndian>(self.max_link_count)?;
        writer.write_i32::<LittleEndian>(self.detail_mesh_count)?;
        writer.write_i32::<LittleEndian>(self.detail_vert_count)?;
        writer.write_i32::<LittleEndian>(self.detail_tri_count)?;
        writer.write_i32::<LittleEndian>(self.bv_node_count)?;
        writer.write_i32::<LittleEndian>(self.off_mesh_con_count)?;
        writer.write_i32::<LittleEndian>(self.off_mesh_base)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        for &v in self.bmin.iter().chain(self.bmax.iter()) {
            writer.write_f32::<LittleEndian>(v)?;
        }
        writer.write_f32::<LittleEndian>(self.bv_quant_factor)?;
        Ok(())
    }

    fn read_fields<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            magic: reader.read_i32::<LittleEndian>()?,
            version: reader.read_i32::<LittleEndian>()?,
            x: reader.read_i32::<LittleEndian>()?,
            y: reader.read_i32::<LittleEndian>()?,
            layer: reader.read_i32::<LittleEndian>()?,
            user_id: reader.read_u32::<LittleEndian>()?,
            poly_count: reader.read_i32::<LittleEndian>()?,
            vert_count: reader.read_i32::<LittleEndian>()?,
            max_link_count: reader.read_i32::<LittleEndian>()?,
            detail_mesh_count: reader.read_i32::<LittleEndian>()?,
            detail_vert_count: reader.read_i32::<LittleEndian>()?,
            detail_tri_count: reader.read_i32::<LittleEndian>()?,
            bv_node_count: reader.read_i32::<LittleEndian>()?,
            off_mesh_con_count: reader.read_i32::<LittleEndian>()?,
            off_mesh_base: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            bmin: [
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
            ],
            bmax: [
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
            ],
            bv_quant_factor: reader.read_f32::<LittleEndian>()?,
        })
    }
}

fn section_count(count: i32, name: &str) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| Status::DataCorrupted(format!("negative {} count {}", name, count)))
}

/// Exact length in bytes of the tile data described by `header`
pub fn tile_data_size(header: &MeshHeader) -> Result<usize> {
    let sections = [
        (header.vert_count, VERT_SIZE, "vertex"),
        (header.poly_count, POLY_SIZE, "polygon"),
        (header.max_link_count, LINK_SIZE, "link"),
        (header.detail_mesh_count, POLY_DETAIL_SIZE, "detail mesh"),
        (header.detail_vert_count, VERT_SIZE, "detail vertex"),
        (header.detail_tri_count, DETAIL_TRI_SIZE, "detail triangle"),
        (header.bv_node_count, BV_NODE_SIZE, "bv node"),
        (header.off_mesh_con_count, OFF_MESH_CON_SIZE, "off-mesh connection"),
    ];

    let mut size = align4(MeshHeader::SIZE);
    for (count, stride, name) in sections {
        let bytes = section_count(count, name)?
            .checked_mul(stride)
            .ok_or_else(|| Status::DataCorrupted(format!("{} section overflows", name)))?;
        size = size
            .checked_add(align4(bytes))
            .ok_or_else(|| Status::DataCorrupted(format!("{} section overflows", name)))?;
    }
    Ok(size)
}

fn read_poly<R: Read>(reader: &mut R) -> io::Result<Poly> {
    let first_link = reader.read_u32::<LittleEndian>()?;

    let mut verts = [0u16; MAX_VERTS_PER_POLY];
    for v in &mut verts {
        *v = reader.read_u16::<LittleEndian>()?;
    }
    let mut neis = [0u16; MAX_VERTS_PER_POLY];
    for n in &mut neis {
        *n = reader.read_u16::<LittleEndian>()?;
    }

    let flags = PolyFlags::from_bits_retain(reader.read_u16::<LittleEndian>()?);
    let vert_count = reader.read_u8()?;
    let area_and_type = reader.read_u8()?;

    let poly_type = if (area_and_type >> 6) == PolyType::OffMeshConnection as u8 {
        PolyType::OffMeshConnection
    } else {
        PolyType::Ground
    };

    let mut poly = Poly::new(area_and_type & 0x3f, poly_type, flags);
    poly.first_link = (first_link != DT_NULL_LINK).then_some(first_link);
    poly.verts = verts;
    poly.neis = neis;
    poly.vert_count = vert_count;
    Ok(poly)
}

fn write_poly<W: Write>(writer: &mut W, poly: &Poly) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(poly.first_link.unwrap_or(DT_NULL_LINK))?;
    for &v in &poly.verts {
        writer.write_u16::<LittleEndian>(v)?;
    }
    for &n in &poly.neis {
        writer.write_u16::<LittleEndian>(n)?;
    }
    writer.write_u16::<LittleEndian>(poly.flags.bits())?;
    writer.write_u8(poly.vert_count)?;
    writer.write_u8((poly.area & 0x3f) | ((poly.poly_type as u8) << 6))?;
    Ok(())
}

fn read_link<R: Read>(reader: &mut R) -> io::Result<Link> {
    let reference = PolyRef::new(reader.read_u32::<LittleEndian>()?);
    let next = reader.read_u32::<LittleEndian>()?;
    Ok(Link {
        reference,
        next: (next != DT_NULL_LINK).then_some(next),
        edge: reader.read_u8()?,
        side: reader.read_u8()?,
        bmin: reader.read_u8()?,
        bmax: reader.read_u8()?,
    })
}

fn write_link<W: Write>(writer: &mut W, link: &Link) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(link.reference.id())?;
    writer.write_u32::<LittleEndian>(link.next.unwrap_or(DT_NULL_LINK))?;
    writer.write_u8(link.edge)?;
    writer.write_u8(link.side)?;
    writer.write_u8(link.bmin)?;
    writer.write_u8(link.bmax)?;
    Ok(())
}

fn read_poly_detail<R: Read>(reader: &mut R) -> io::Result<PolyDetail> {
    let detail = PolyDetail {
        vert_base: reader.read_u32::<LittleEndian>()?,
        tri_base: reader.read_u32::<LittleEndian>()?,
        vert_count: reader.read_u8()?,
        tri_count: reader.read_u8()?,
    };
    // Struct padding
    reader.read_u16::<LittleEndian>()?;
    Ok(detail)
}

fn write_poly_detail<W: Write>(writer: &mut W, detail: &PolyDetail) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(detail.vert_base)?;
    writer.write_u32::<LittleEndian>(detail.tri_base)?;
    writer.write_u8(detail.vert_count)?;
    writer.write_u8(detail.tri_count)?;
    writer.write_u16::<LittleEndian>(0)?;
    Ok(())
}

fn read_bv_node<R: Read>(reader: &mut R) -> io::Result<BVNode> {
    let mut node = BVNode::new();
    for v in node.bmin.iter_mut().chain(node.bmax.iter_mut()) {
        *v = reader.read_u16::<LittleEndian>()?;
    }
    node.i = reader.read_i32::<LittleEndian>()?;
    Ok(node)
}

fn write_bv_node<W: Write>(writer: &mut W, node: &BVNode) -> io::Result<()> {
    for &v in node.bmin.iter().chain(node.bmax.iter()) {
        writer.write_u16::<LittleEndian>(v)?;
    }
    writer.write_i32::<LittleEndian>(node.i)?;
    Ok(())
}

fn read_off_mesh_connection<R: Read>(reader: &mut R) -> io::Result<OffMeshConnection> {
    let mut conn = OffMeshConnection::new();
    for p in &mut conn.pos {
        *p = reader.read_f32::<LittleEndian>()?;
    }
    conn.radius = reader.read_f32::<LittleEndian>()?;
    conn.poly = reader.read_u16::<LittleEndian>()?;
    conn.flags = reader.read_u8()?;
    conn.side = reader.read_u8()?;
    conn.user_id = reader.read_u32::<LittleEndian>()?;
    Ok(conn)
}

fn write_off_mesh_connection<W: Write>(writer: &mut W, conn: &OffMeshConnection) -> io::Result<()> {
    for &p in &conn.pos {
        writer.write_f32::<LittleEndian>(p)?;
    }
    writer.write_f32::<LittleEndian>(conn.radius)?;
    writer.write_u16::<LittleEndian>(conn.poly)?;
    writer.write_u8(conn.flags)?;
    writer.write_u8(conn.side)?;
    writer.write_u32::<LittleEndian>(conn.user_id)?;
    Ok(())
}

fn read_section<T, R: Read>(
    reader: &mut R,
    count: usize,
    mut read: impl FnMut(&mut R) -> io::Result<T>,
) -> io::Result<Vec<T>> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read(reader)?);
    }
    Ok(items)
}

/// Decodes a tile from its serialized form
///
/// The header must carry the tile magic and version, and the slice must be
/// exactly as long as the header counts declare.
pub fn load_tile_from_binary(data: &[u8]) -> Result<MeshTile> {
    if data.len() < MeshHeader::SIZE {
        return Err(Status::SizeMismatch {
            expected: MeshHeader::SIZE,
            actual: data.len(),
        });
    }

    let header = MeshHeader::deserialize(data)?;
    header.validate()?;

    let expected = tile_data_size(&header)?;
    if data.len() != expected {
        return Err(Status::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    // Counts are known to be non-negative from here on
    let count = |c: i32| c as usize;
    let mut cursor = Cursor::new(&data[align4(MeshHeader::SIZE)..]);

    let mut tile = MeshTile::new();
    tile.verts = read_section(&mut cursor, count(header.vert_count) * 3, |r| {
        r.read_f32::<LittleEndian>()
    })?;
    tile.polys = read_section(&mut cursor, count(header.poly_count), read_poly)?;
    tile.links = read_section(&mut cursor, count(header.max_link_count), read_link)?;
    tile.detail_meshes =
        read_section(&mut cursor, count(header.detail_mesh_count), read_poly_detail)?;
    tile.detail_verts = read_section(&mut cursor, count(header.detail_vert_count) * 3, |r| {
        r.read_f32::<LittleEndian>()
    })?;
    tile.detail_tris = read_section(&mut cursor, count(header.detail_tri_count) * 4, |r| {
        r.read_u8()
    })?;
    tile.bv_tree = read_section(&mut cursor, count(header.bv_node_count), read_bv_node)?;
    tile.off_mesh_cons = read_section(
        &mut cursor,
        count(header.off_mesh_con_count),
        read_off_mesh_connection,
    )?;

    check_tile_indices(&tile, count(header.vert_count))?;

    tile.header = Some(header);
    tile.data = data.to_vec();
    Ok(tile)
}

/// Checks that every index stored in the tile stays inside its arrays
fn check_tile_indices(tile: &MeshTile, vert_limit: usize) -> Result<()> {
    let poly_count = tile.polys.len();

    for (i, poly) in tile.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        if nv > MAX_VERTS_PER_POLY {
            return Err(Status::DataCorrupted(format!(
                "polygon {} has {} vertices",
                i, poly.vert_count
            )));
        }
        if let Some(&v) = poly.verts[..nv].iter().find(|&&v| v as usize >= vert_limit) {
            return Err(Status::DataCorrupted(format!(
                "polygon {} references vertex {} of {}",
                i, v, vert_limit
            )));
        }
        if let Some(&n) = poly.neis[..nv]
            .iter()
            .find(|&&n| n != 0 && n & DT_EXT_LINK == 0 && n as usize > poly_count)
        {
            return Err(Status::DataCorrupted(format!(
                "polygon {} neighbours polygon {} of {}",
                i,
                n - 1,
                poly_count
            )));
        }
    }

    for (i, con) in tile.off_mesh_cons.iter().enumerate() {
        let valid = tile
            .polys
            .get(con.poly as usize)
            .is_some_and(|p| p.is_off_mesh_connection() && p.vert_count == 2);
        if !valid {
            return Err(Status::DataCorrupted(format!(
                "off-mesh connection {} has no two-vertex connection polygon at {}",
                i, con.poly
            )));
        }
    }

    Ok(())
}

/// Encodes a tile, deriving the header counts from the tile's arrays
pub fn save_tile_to_binary(tile: &MeshTile) -> Result<Vec<u8>> {
    let source = tile
        .header
        .as_ref()
        .ok_or_else(|| Status::invalid_param("tile has no header"))?;

    let to_count = |len: usize, name: &str| {
        i32::try_from(len)
            .map_err(|_| Status::invalid_param(format!("{} section too large", name)))
    };

    let mut header = *source;
    header.magic = DT_NAVMESH_MAGIC;
    header.version = DT_NAVMESH_VERSION;
    header.poly_count = to_count(tile.polys.len(), "polygon")?;
    header.vert_count = to_count(tile.verts.len() / 3, "vertex")?;
    header.max_link_count = to_count(tile.links.len(), "link")?;
    header.detail_mesh_count = to_count(tile.detail_meshes.len(), "detail mesh")?;
    header.detail_vert_count = to_count(tile.detail_verts.len() / 3, "detail vertex")?;
    header.detail_tri_count = to_count(tile.detail_tris.len() / 4, "detail triangle")?;
    header.bv_node_count = to_count(tile.bv_tree.len(), "bv node")?;
    header.off_mesh_con_count = to_count(tile.off_mesh_cons.len(), "off-mesh connection")?;

    let size = tile_data_size(&header)?;
    let mut buffer = Vec::with_capacity(size);
    header.write_to(&mut buffer)?;

    for &v in &tile.verts[..header.vert_count as usize * 3] {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    for poly in &tile.polys {
        write_poly(&mut buffer, poly)?;
    }
    for link in &tile.links {
        write_link(&mut buffer, link)?;
    }
    for detail in &tile.detail_meshes {
        write_poly_detail(&mut buffer, detail)?;
    }
    for &v in &tile.detail_verts[..header.detail_vert_count as usize * 3] {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    buffer.extend_from_slice(&tile.detail_tris[..header.detail_tri_count as usize * 4]);
    for node in &tile.bv_tree {
        write_bv_node(&mut buffer, node)?;
    }
    for conn in &tile.off_mesh_cons {
        write_off_mesh_connection(&mut buffer, conn)?;
    }

    debug_assert_eq!(buffer.len(), size);
    Ok(buffer)
}

/// Saves every live tile of a navigation mesh as a mesh-set file
pub fn save_nav_mesh_to_binary(nav_mesh: &NavMesh) -> Result<Vec<u8>> {
    let tiles: Vec<(TileRef, &MeshTile)> = nav_mesh.tiles().collect();

    let mut buffer = Vec::new();
    NavMeshSetHeader::new(tiles.len() as i32, *nav_mesh.get_params()).write_to(&mut buffer)?;

    for (tile_ref, tile) in tiles {
        let data = save_tile_to_binary(tile)?;
        let tile_header = NavMeshTileHeader {
            tile_ref: tile_ref.id(),
            data_size: data.len() as i32,
        };
        tile_header.write_to(&mut buffer)?;
        buffer.extend_from_slice(&data);
    }

    Ok(buffer)
}

/// Loads a navigation mesh from a mesh-set file, restoring each tile under its saved handle
pub fn load_nav_mesh_from_binary(data: &[u8]) -> Result<NavMesh> {
    if data.len() < NavMeshSetHeader::SIZE {
        return Err(Status::SizeMismatch {
            expected: NavMeshSetHeader::SIZE,
            actual: data.len(),
        });
    }

    let header = NavMeshSetHeader::deserialize(data)?;
    header.validate()?;

    let mut nav_mesh = NavMesh::new(header.params)?;
    let mut pos = NavMeshSetHeader::SIZE;

    for _ in 0..header.num_tiles.max(0) {
        let tile_header =
            NavMeshTileHeader::deserialize(&data[pos..]).map_err(|_| Status::SizeMismatch {
                expected: pos + NavMeshTileHeader::SIZE,
                actual: data.len(),
            })?;
        pos += NavMeshTileHeader::SIZE;

        if tile_header.tile_ref == 0 || tile_header.data_size <= 0 {
            break;
        }

        let end = pos + tile_header.data_size as usize;
        if end > data.len() {
            return Err(Status::SizeMismatch {
                expected: end,
                actual: data.len(),
            });
        }

        nav_mesh.add_tile_at(
            &data[pos..end],
            TileFlags::FREE_DATA,
            TileRef::from_id(tile_header.tile_ref),
        )?;
        pos = end;
    }

    Ok(nav_mesh)
}
