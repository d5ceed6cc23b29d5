//! Node pool and open list used by the graph searches
//!
//! Nodes live in an arena and are addressed by 1-based [`NodeIndex`] handles,
//! `0` meaning "no node". Parent links are stored as handles, so walking a
//! path back to the start is a chain of O(1) lookups.

use super::PolyRef;

/// Handle of a node inside a [`NodePool`] (1-based, 0 = none)
pub type NodeIndex = u32;

/// Null node handle
pub const NULL_NODE: NodeIndex = 0;

bitflags::bitflags! {
    /// Search state of a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const OPEN = 0x01;
        const CLOSED = 0x02;
        /// Parent is not adjacent (reached through a raycast shortcut)
        const PARENT_DETACHED = 0x04;
    }
}

/// Node in the pathfinding graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Position used for cost evaluation
    pub pos: [f32; 3],
    /// Cost from the start node to this node
    pub cost: f32,
    /// Cost plus heuristic estimate to the goal
    pub total: f32,
    /// Handle of the parent node
    pub pidx: NodeIndex,
    /// Extra state distinguishing nodes of the same polygon
    pub state: u8,
    /// Node flags
    pub flags: NodeFlags,
    /// Polygon ref the node corresponds to
    pub id: PolyRef,
    /// Polygons skipped by an any-angle shortcut into this node
    pub shortcut: Option<Vec<PolyRef>>,
}

impl Node {
    fn new(id: PolyRef, state: u8) -> Self {
        Self {
            pos: [0.0; 3],
            cost: 0.0,
            total: 0.0,
            pidx: NULL_NODE,
            state,
            flags: NodeFlags::empty(),
            id,
            shortcut: None,
        }
    }
}

/// Bounded pool of search nodes with hash lookup by polygon reference
#[derive(Debug, Clone)]
pub struct NodePool {
    nodes: Vec<Node>,
    /// First node handle for each hash bucket
    first: Vec<NodeIndex>,
    /// Next node handle in the bucket chain, parallel to `nodes`
    next: Vec<NodeIndex>,
    max_nodes: usize,
    hash_mask: usize,
}

impl NodePool {
    /// Creates a pool that holds at most `max_nodes` nodes per episode
    pub fn new(max_nodes: usize) -> Self {
        let max_nodes = max_nodes.clamp(1, u32::MAX as usize - 1);
        let hash_size = (max_nodes / 4).max(1).next_power_of_two();
        Self {
            nodes: Vec::with_capacity(max_nodes.min(4096)),
            first: vec![NULL_NODE; hash_size],
            next: Vec::with_capacity(max_nodes.min(4096)),
            max_nodes,
            hash_mask: hash_size - 1,
        }
    }

    /// Drops every node, starting a new search episode
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next.clear();
        self.first.fill(NULL_NODE);
    }

    /// Returns the node for `(id, state)`, allocating a fresh one if needed.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn get_node(&mut self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        if let Some(idx) = self.find_node(id, state) {
            return Some(idx);
        }

        if self.nodes.len() >= self.max_nodes {
            return None;
        }

        let bucket = self.bucket(id);
        self.nodes.push(Node::new(id, state));
        self.next.push(self.first[bucket]);
        let idx = self.nodes.len() as NodeIndex;
        self.first[bucket] = idx;
        Some(idx)
    }

    /// Finds the node for `(id, state)` without allocating
    pub fn find_node(&self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        let mut idx = self.first[self.bucket(id)];
        while idx != NULL_NODE {
            let node = &self.nodes[(idx - 1) as usize];
            if node.id == id && node.state == state {
                return Some(idx);
            }
            idx = self.next[(idx - 1) as usize];
        }
        None
    }

    /// Finds every node of `id` regardless of state
    pub fn find_nodes(&self, id: PolyRef) -> Vec<NodeIndex> {
        let mut result = Vec::new();
        let mut idx = self.first[self.bucket(id)];
        while idx != NULL_NODE {
            if self.nodes[(idx - 1) as usize].id == id {
                result.push(idx);
            }
            idx = self.next[(idx - 1) as usize];
        }
        result
    }

    /// Gets a node by handle, `None` for the null handle or a stale one
    pub fn get_node_at_idx(&self, idx: NodeIndex) -> Option<&Node> {
        if idx == NULL_NODE {
            return None;
        }
        self.nodes.get((idx - 1) as usize)
    }

    /// Gets a mutable node by handle
    pub fn get_node_at_idx_mut(&mut self, idx: NodeIndex) -> Option<&mut Node> {
        if idx == NULL_NODE {
            return None;
        }
        self.nodes.get_mut((idx - 1) as usize)
    }

    /// Node for a handle returned by this pool during the current episode.
    ///
    /// Panics on the null handle.
    #[inline]
    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[(idx - 1) as usize]
    }

    /// Mutable node for a handle returned by this pool during the current episode.
    #[inline]
    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[(idx - 1) as usize]
    }

    /// Number of nodes allocated in this episode
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Maximum number of nodes per episode
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    fn bucket(&self, id: PolyRef) -> usize {
        let a = id.id() as usize;
        (a ^ (a >> 16)) & self.hash_mask
    }
}

/// Binary min-heap of node handles ordered by [`Node::total`]
#[derive(Debug, Clone)]
pub struct NodeQueue {
    heap: Vec<NodeIndex>,
    capacity: usize,
}

impl NodeQueue {
    /// Creates a queue that holds at most `capacity` nodes
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Clears the queue
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Gets the node with the lowest total cost
    pub fn top(&self) -> Option<NodeIndex> {
        self.heap.first().copied()
    }

    /// Removes and returns the node with the lowest total cost
    pub fn pop(&mut self, pool: &NodePool) -> Option<NodeIndex> {
        if self.heap.is_empty() {
            return None;
        }
        let result = self.heap.swap_remove(0);
        if let Some(&last) = self.heap.first() {
            self.trickle_down(pool, 0, last);
        }
        Some(result)
    }

    /// Pushes a node; ignored once the queue is full
    pub fn push(&mut self, pool: &NodePool, idx: NodeIndex) {
        if self.heap.len() >= self.capacity {
            return;
        }
        self.heap.push(idx);
        self.bubble_up(pool, self.heap.len() - 1, idx);
    }

    /// Restores heap order after the node's total decreased
    pub fn modify(&mut self, pool: &NodePool, idx: NodeIndex) {
        if let Some(i) = self.heap.iter().position(|&n| n == idx) {
            self.bubble_up(pool, i, idx);
        }
    }

    /// Checks if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued nodes
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    fn bubble_up(&mut self, pool: &NodePool, mut i: usize, idx: NodeIndex) {
        let total = pool.node(idx).total;
        while i > 0 {
            let parent = (i - 1) / 2;
            if pool.node(self.heap[parent]).total <= total {
                break;
            }
            self.heap[i] = self.heap[parent];
            i = parent;
        }
        self.heap[i] = idx;
    }

    fn trickle_down(&mut self, pool: &NodePool, mut i: usize, idx: NodeIndex) {
        let size = self.heap.len();
        let mut child = i * 2 + 1;
        while child < size {
            if child + 1 < size
                && pool.node(self.heap[child]).total > pool.node(self.heap[child + 1]).total
            {
                child += 1;
            }
            self.heap[i] = self.heap[child];
            i = child;
            child = i * 2 + 1;
        }
        self.bubble_up(pool, i, idx);
    }
}
