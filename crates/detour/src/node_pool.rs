//! Node pool and queue for best-first searches
//!
//! Search nodes live in a [`DtNodePool`] and are addressed by [`NodeIndex`].
//! The [`DtNodeQueue`] orders indices by the `total` cost of the node they
//! name and never owns a node. Costs are read through [`NodeCosts`], so a
//! node whose cost is lowered in place can be re-sorted with
//! [`DtNodeQueue::modify`].

use bitflags::bitflags;
use glam::Vec3;

use super::{PolyRef, Resource, Result, Status};

bitflags! {
    /// Node flags for pathfinding state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const OPEN = 0x01;
        const CLOSED = 0x02;
        /// Parent of the node is not adjacent
        const PARENT_DETACHED = 0x04;
    }
}

/// Node index type
pub type NodeIndex = u16;

/// Null node index constant
pub const DT_NULL_IDX: NodeIndex = NodeIndex::MAX;

/// Maximum states per node
pub const DT_MAX_STATES_PER_NODE: usize = 4;

/// Node in the pathfinding graph
#[derive(Debug, Clone)]
pub struct DtNode {
    /// Position of the node
    pub pos: Vec3,
    /// Cost from previous node to current node
    pub cost: f32,
    /// Total cost up to the node, the queue ordering key
    pub total: f32,
    /// Index of the parent node
    pub pidx: Option<NodeIndex>,
    /// Extra state information (0-3)
    pub state: u8,
    /// Open and closed state of the node during a search
    pub flags: NodeFlags,
    /// Polygon ref the node corresponds to
    pub id: PolyRef,
}

impl DtNode {
    /// Creates a new node
    pub fn new(id: PolyRef) -> Self {
        Self {
            pos: Vec3::ZERO,
            cost: 0.0,
            total: 0.0,
            pidx: None,
            state: 0,
            flags: NodeFlags::empty(),
            id,
        }
    }
}

/// Read access to the ordering key of search nodes
pub trait NodeCosts {
    /// Total cost of the node at `idx`
    fn node_total(&self, idx: NodeIndex) -> f32;
}

impl NodeCosts for [DtNode] {
    fn node_total(&self, idx: NodeIndex) -> f32 {
        self[idx as usize].total
    }
}

impl NodeCosts for Vec<DtNode> {
    fn node_total(&self, idx: NodeIndex) -> f32 {
        self.as_slice().node_total(idx)
    }
}

/// Node pool mapping (polygon, state) pairs to search nodes
pub struct DtNodePool {
    nodes: Vec<DtNode>,
    /// First node index for each hash bucket
    first: Vec<NodeIndex>,
    /// Next node index in hash chain
    next: Vec<NodeIndex>,
    max_nodes: usize,
    hash_size: usize,
    node_count: usize,
}

impl DtNodePool {
    /// Creates a node pool
    ///
    /// `hash_size` must be a power of two and `max_nodes` must leave room for
    /// the null index.
    pub fn new(max_nodes: usize, hash_size: usize) -> Result<Self> {
        if max_nodes == 0 || max_nodes >= DT_NULL_IDX as usize {
            return Err(Status::invalid_param(format!(
                "max nodes {} outside 1..{}",
                max_nodes, DT_NULL_IDX
            )));
        }
        if !hash_size.is_power_of_two() {
            return Err(Status::invalid_param(format!(
                "hash size {} is not a power of two",
                hash_size
            )));
        }

        Ok(Self {
            nodes: (0..max_nodes).map(|_| DtNode::new(PolyRef::new(0))).collect(),
            first: vec![DT_NULL_IDX; hash_size],
            next: vec![DT_NULL_IDX; max_nodes],
            max_nodes,
            hash_size,
            node_count: 0,
        })
    }

    /// Forgets all nodes, keeping the storage
    pub fn clear(&mut self) {
        self.first.fill(DT_NULL_IDX);
        self.node_count = 0;
    }

    fn bucket(&self, id: PolyRef) -> usize {
        let a = id.id() as usize;
        (a ^ (a >> 16)) & (self.hash_size - 1)
    }

    fn chain(&self, id: PolyRef) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut idx = self.first[self.bucket(id)];
        std::iter::from_fn(move || {
            if idx == DT_NULL_IDX {
                return None;
            }
            let current = idx;
            idx = self.next[current as usize];
            Some(current)
        })
    }

    /// Gets the node of a (polygon, state) pair, allocating it on first use
    pub fn get_node(&mut self, id: PolyRef, state: u8) -> Result<NodeIndex> {
        if let Some(idx) = self.find_node(id, state) {
            return Ok(idx);
        }

        if self.node_count >= self.max_nodes {
            return Err(Status::CapacityExceeded {
                resource: Resource::Nodes,
                capacity: self.max_nodes,
            });
        }

        let idx = self.node_count as NodeIndex;
        self.node_count += 1;

        self.nodes[idx as usize] = DtNode {
            state,
            ..DtNode::new(id)
        };

        let bucket = self.bucket(id);
        self.next[idx as usize] = self.first[bucket];
        self.first[bucket] = idx;

        Ok(idx)
    }

    /// Finds the node of a (polygon, state) pair
    pub fn find_node(&self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        self.chain(id).find(|&idx| {
            let node = &self.nodes[idx as usize];
            node.id == id && node.state == state
        })
    }

    /// Finds up to `max_nodes` nodes of a polygon, one per state
    pub fn find_nodes(&self, id: PolyRef, max_nodes: usize) -> Vec<NodeIndex> {
        self.chain(id)
            .filter(|&idx| self.nodes[idx as usize].id == id)
            .take(max_nodes)
            .collect()
    }

    /// Gets an allocated node
    pub fn node(&self, idx: NodeIndex) -> Option<&DtNode> {
        self.nodes[..self.node_count].get(idx as usize)
    }

    /// Gets an allocated node for modification
    pub fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut DtNode> {
        self.nodes[..self.node_count].get_mut(idx as usize)
    }

    /// Allocated nodes, in allocation order
    pub fn nodes(&self) -> &[DtNode] {
        &self.nodes[..self.node_count]
    }

    pub fn get_mem_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + std::mem::size_of::<DtNode>() * self.max_nodes
            + std::mem::size_of::<NodeIndex>() * self.max_nodes
            + std::mem::size_of::<NodeIndex>() * self.hash_size
    }

    pub fn get_max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn get_hash_size(&self) -> usize {
        self.hash_size
    }

    pub fn get_node_count(&self) -> usize {
        self.node_count
    }
}

impl NodeCosts for DtNodePool {
    fn node_total(&self, idx: NodeIndex) -> f32 {
        self.nodes[idx as usize].total
    }
}

/// Bounded binary min-heap of node indices keyed by node total cost
pub struct DtNodeQueue {
    /// Heap storage, `capacity + 1` slots
    heap: Vec<NodeIndex>,
    capacity: usize,
    size: usize,
}

impl DtNodeQueue {
    /// Creates a queue holding at most `capacity` nodes
    pub fn new(capacity: i32) -> Result<Self> {
        if capacity <= 0 {
            return Err(Status::invalid_param(format!(
                "queue capacity must be positive, got {}",
                capacity
            )));
        }
        let capacity = capacity as usize;
        Ok(Self {
            heap: vec![DT_NULL_IDX; capacity + 1],
            capacity,
            size: 0,
        })
    }

    /// Empties the queue, keeping the storage
    pub fn clear(&mut self) {
        self.size = 0;
    }

    /// Peeks at the node with the lowest total cost
    pub fn top(&self) -> Result<NodeIndex> {
        if self.size == 0 {
            return Err(Status::EmptyQueue);
        }
        Ok(self.heap[0])
    }

    /// Removes the node with the lowest total cost
    pub fn pop<C: NodeCosts + ?Sized>(&mut self, costs: &C) -> Result<NodeIndex> {
        if self.size == 0 {
            return Err(Status::EmptyQueue);
        }
        let result = self.heap[0];
        self.size -= 1;
        let last = self.heap[self.size];
        self.trickle_down(costs, 0, last);
        Ok(result)
    }

    /// Inserts a node
    pub fn push<C: NodeCosts + ?Sized>(&mut self, costs: &C, node: NodeIndex) -> Result<()> {
        if self.size >= self.capacity {
            return Err(Status::CapacityExceeded {
                resource: Resource::QueueSlots,
                capacity: self.capacity,
            });
        }
        self.size += 1;
        self.bubble_up(costs, self.size - 1, node);
        Ok(())
    }

    /// Restores heap order after the node's total cost was lowered
    pub fn modify<C: NodeCosts + ?Sized>(&mut self, costs: &C, node: NodeIndex) -> Result<()> {
        let i = self.heap[..self.size]
            .iter()
            .position(|&n| n == node)
            .ok_or(Status::NotFound)?;
        self.bubble_up(costs, i, node);
        Ok(())
    }

    pub fn empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn get_mem_used(&self) -> usize {
        std::mem::size_of::<Self>() + std::mem::size_of::<NodeIndex>() * (self.capacity + 1)
    }

    pub fn get_capacity(&self) -> i32 {
        self.capacity as i32
    }

    fn bubble_up<C: NodeCosts + ?Sized>(&mut self, costs: &C, mut i: usize, node: NodeIndex) {
        let total = costs.node_total(node);
        while i > 0 {
            let parent = (i - 1) / 2;
            if costs.node_total(self.heap[parent]) <= total {
                break;
            }
            self.heap[i] = self.heap[parent];
            i = parent;
        }
        self.heap[i] = node;
    }

    /// Moves the hole at `i` down to a leaf along the cheaper children, then
    /// settles `node` there
    fn trickle_down<C: NodeCosts + ?Sized>(&mut self, costs: &C, mut i: usize, node: NodeIndex) {
        let mut child = i * 2 + 1;
        while child < self.size {
            if child + 1 < self.size
                && costs.node_total(self.heap[child]) > costs.node_total(self.heap[child + 1])
            {
                child += 1;
            }
            self.heap[i] = self.heap[child];
            i = child;
            child = i * 2 + 1;
        }
        self.bubble_up(costs, i, node);
    }
}
