//! Status codes for Detour operations

use std::fmt;

/// Result type for Detour operations
pub type Result<T> = std::result::Result<T, Status>;

/// Fixed-capacity resources owned by the navigation mesh and the search structures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Tile slots of a navigation mesh
    Tiles,
    /// Polygons of a single tile
    Polys,
    /// Link slots of a single tile
    Links,
    /// Search nodes of a node pool
    Nodes,
    /// Slots of a node queue
    QueueSlots,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Tiles => "tiles",
            Resource::Polys => "polygons",
            Resource::Links => "links",
            Resource::Nodes => "search nodes",
            Resource::QueueSlots => "queue slots",
        };
        f.write_str(name)
    }
}

/// Failure status for Detour operations
#[derive(thiserror::Error, Debug)]
pub enum Status {
    /// Input data is not recognized
    #[error("wrong magic number: expected {expected:#010x}, found {found:#010x}")]
    WrongMagic { expected: i32, found: i32 },

    /// Input data is in the wrong version
    #[error("wrong version: expected {expected}, found {found}")]
    WrongVersion { expected: i32, found: i32 },

    /// Declared counts do not match the supplied data length
    #[error("declared counts imply {expected} bytes of tile data, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Serialized data is internally inconsistent
    #[error("tile data corrupted: {0}")]
    DataCorrupted(String),

    /// A buffer handed to the codec is shorter than the record it must hold
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A handle outlived the tile it referred to
    #[error("stale handle for tile slot {index}: salt {salt}, live salt {current}")]
    StaleHandle { index: u32, salt: u32, current: u32 },

    /// A fixed-capacity resource is full
    #[error("capacity exceeded: {resource} (capacity {capacity})")]
    CapacityExceeded { resource: Resource, capacity: usize },

    /// Pop or peek on an empty node queue
    #[error("node queue is empty")]
    EmptyQueue,

    /// A tile already occupies the grid location
    #[error("tile location ({x}, {y}, {layer}) is already occupied")]
    AlreadyOccupied { x: i32, y: i32, layer: i32 },

    /// Provided parameter was invalid
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Value does not exist or is not found
    #[error("not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Status {
    /// Creates an invalid parameter status
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Status::InvalidParam(message.into())
    }

    /// Checks if the status describes malformed serialized data
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Status::WrongMagic { .. }
                | Status::WrongVersion { .. }
                | Status::SizeMismatch { .. }
                | Status::DataCorrupted(_)
        )
    }

    /// Checks if the status signals a programming error in the caller
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Status::BufferTooSmall { .. } | Status::EmptyQueue | Status::InvalidParam(_)
        )
    }

    /// Checks if the status reports an exhausted fixed-capacity resource
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Status::CapacityExceeded { .. })
    }
}

/// Return early with `Status::InvalidParam` if the expression evaluates to `false`
#[macro_export]
macro_rules! dtassert {
    ($expr:expr, $msg:expr) => {
        if !$expr {
            return Err($crate::Status::invalid_param($msg));
        }
    };
}
