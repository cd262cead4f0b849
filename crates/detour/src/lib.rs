//! Detour component for tiled navigation meshes
//!
//! Detour holds the runtime side of a navigation mesh: a store of tiles whose
//! polygons are interlinked into a walkable graph, the binary layout those
//! tiles are persisted in, and the search node pool and priority queue that a
//! best-first path search runs on.
//!
//! Handles into the mesh carry a salt. Removing a tile bumps the salt of its
//! slot, so handles issued before the removal are detected as stale instead of
//! silently resolving to whatever tile is loaded into the slot next.

pub mod binary_format;
mod nav_mesh;
mod nav_mesh_query;
mod node_pool;
mod status;

#[cfg(test)]
mod test_mesh_helpers;

pub use binary_format::{
    load_nav_mesh_from_binary, load_tile_from_binary, save_nav_mesh_to_binary,
    save_tile_to_binary, tile_data_size, BinaryRecord, MeshHeader, NavMeshSetHeader,
    NavMeshTileHeader, DT_NAVMESH_MAGIC, DT_NAVMESH_VERSION, NAVMESHSET_MAGIC,
    NAVMESHSET_VERSION,
};
pub use nav_mesh::{
    BVNode, Link, LinkIter, MeshTile, NavMesh, OffMeshConnection, Poly, PolyDetail,
};
pub use nav_mesh_query::{NavMeshQuery, QueryPath, DT_DEFAULT_MAX_NODES};
pub use node_pool::{
    DtNode, DtNodePool, DtNodeQueue, NodeCosts, NodeFlags, NodeIndex, DT_MAX_STATES_PER_NODE,
    DT_NULL_IDX,
};
pub use status::{Resource, Result, Status};

use bitflags::bitflags;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Maximum number of area ids
pub const DT_MAX_AREAS: usize = 64;

/// Neighbour code flag marking a polygon edge as a tile portal
pub const DT_EXT_LINK: u16 = 0x8000;

/// Null link index
pub const DT_NULL_LINK: u32 = 0xffff_ffff;

/// Number of bits for polygon index in a `PolyRef`
pub const DT_POLY_BITS: u32 = 16;
/// Number of bits for tile index in a `PolyRef`
pub const DT_TILE_BITS: u32 = 10;
/// Number of bits for salt in a `PolyRef`
pub const DT_SALT_BITS: u32 = 6;

const DT_POLY_MASK: u32 = (1 << DT_POLY_BITS) - 1;
const DT_TILE_MASK: u32 = (1 << DT_TILE_BITS) - 1;
const DT_SALT_MASK: u32 = (1 << DT_SALT_BITS) - 1;

/// Reference to a polygon: salt, tile index and polygon index packed in 32 bits
///
/// A zero reference never names a polygon because live salts are never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(u32);

impl PolyRef {
    /// Creates a reference from its raw id
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Packs salt, tile index and polygon index into a reference
    pub fn encode(salt: u32, tile_index: u32, poly_index: u32) -> Self {
        Self(
            ((salt & DT_SALT_MASK) << (DT_POLY_BITS + DT_TILE_BITS))
                | ((tile_index & DT_TILE_MASK) << DT_POLY_BITS)
                | (poly_index & DT_POLY_MASK),
        )
    }

    /// Unpacks the reference into (salt, tile index, polygon index)
    pub fn decode(self) -> (u32, u32, u32) {
        (self.salt(), self.tile_index(), self.poly_index())
    }

    /// Raw id of the reference
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Checks if this is the null reference
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn salt(self) -> u32 {
        (self.0 >> (DT_POLY_BITS + DT_TILE_BITS)) & DT_SALT_MASK
    }

    pub fn tile_index(self) -> u32 {
        (self.0 >> DT_POLY_BITS) & DT_TILE_MASK
    }

    pub fn poly_index(self) -> u32 {
        self.0 & DT_POLY_MASK
    }

    /// Handle of the tile this polygon belongs to
    pub fn tile_ref(self) -> TileRef {
        TileRef::new(self.tile_index(), self.salt())
    }
}

impl std::fmt::Display for PolyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Handle to a tile slot, tagged with the salt the slot had when it was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileRef {
    index: u32,
    salt: u32,
}

impl TileRef {
    pub fn new(index: u32, salt: u32) -> Self {
        Self {
            index,
            salt: salt & DT_SALT_MASK,
        }
    }

    /// Tile slot index
    pub fn index(self) -> u32 {
        self.index
    }

    /// Salt captured when the handle was issued
    pub fn salt(self) -> u32 {
        self.salt
    }

    /// Reference to the first polygon of the tile
    pub fn poly_base(self) -> PolyRef {
        PolyRef::encode(self.salt, self.index, 0)
    }

    /// Raw id as written into mesh-set files
    pub fn id(self) -> u32 {
        self.poly_base().id()
    }

    /// Decodes a tile handle from a raw mesh-set file id
    pub fn from_id(id: u32) -> Self {
        PolyRef::new(id).tile_ref()
    }
}

/// Parameters of a multi-tile navigation mesh
///
/// The values size the fixed tile arena when the mesh is created; they do not
/// change afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World space origin of the tile space (x, y, z)
    pub origin: [f32; 3],
    /// Width of each tile along the x-axis
    pub tile_width: f32,
    /// Height of each tile along the z-axis
    pub tile_height: f32,
    /// Maximum number of tiles the mesh can contain
    pub max_tiles: u32,
    /// Maximum number of polygons each tile can contain
    pub max_polys_per_tile: u32,
}

bitflags! {
    /// Polygon flags used by query filters
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
    pub struct PolyFlags: u16 {
        /// Ability to walk (ground, grass, road)
        const WALK = 0x01;
        /// Ability to swim (water)
        const SWIM = 0x02;
        /// Ability to move through doors
        const DOOR = 0x04;
        /// Ability to jump
        const JUMP = 0x08;
        /// Disabled polygon
        const DISABLED = 0x10;
    }
}

bitflags! {
    /// Flags stored on a loaded tile
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
    pub struct TileFlags: u8 {
        /// The mesh owns the tile data and hands it back on removal
        const FREE_DATA = 0x01;
    }
}

/// Polygon type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
#[repr(u8)]
pub enum PolyType {
    /// Polygon is a standard convex polygon on the mesh surface
    #[default]
    Ground = 0,
    /// Polygon is an off-mesh connection of two vertices
    OffMeshConnection = 1,
}

/// Filter deciding which polygons a query may traverse and at what cost
#[derive(Debug, Clone)]
pub struct QueryFilter {
    /// Polygons must have at least one of these flags
    pub include_flags: PolyFlags,
    /// Polygons must have none of these flags
    pub exclude_flags: PolyFlags,
    /// Cost multiplier per area id
    pub area_cost: [f32; DT_MAX_AREAS],
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::all(),
            exclude_flags: PolyFlags::empty(),
            area_cost: [1.0; DT_MAX_AREAS],
        }
    }
}

impl QueryFilter {
    /// Checks if the polygon may be visited
    pub fn pass_filter(&self, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    /// Cost of moving between two points inside the polygon
    pub fn get_cost(&self, pa: glam::Vec3, pb: glam::Vec3, poly: &Poly) -> f32 {
        pa.distance(pb) * self.area_cost[poly.area as usize % DT_MAX_AREAS]
    }
}
