// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slab storage for tree nodes with an intrusive free list.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::ops::{Index, IndexMut};

use kurbo::Point;

use crate::aabb::Aabb;

/// Index of a node in the arena.
///
/// Ids are plain 32-bit integers so they stay cheap to compare and order, and
/// so buffers of ids can carry the null sentinel in-band. A node id is stable
/// for as long as the node is live, across arena growth.
pub type NodeId = i32;

/// Sentinel terminating parent/child/free-list links.
pub const NULL_NODE: NodeId = -1;

const INITIAL_CAPACITY: usize = 16;

/// A node in the dynamic tree.
///
/// Leaves have `child1 == child2 == NULL_NODE`, height 0, and carry the user
/// payload. Internal nodes have two children and no payload. Free slots are
/// marked by `height == -1` and thread the free list through `parent`.
#[derive(Copy, Clone, Debug)]
pub struct TreeNode<P> {
    /// The enlarged (fat) box stored in the tree.
    pub aabb: Aabb,
    /// Payload; `Some` only on leaves.
    pub user_data: Option<P>,
    /// Parent link; doubles as the free-list `next` link on free slots.
    pub parent: NodeId,
    /// First child, or `NULL_NODE` on leaves.
    pub child1: NodeId,
    /// Second child, or `NULL_NODE` on leaves.
    pub child2: NodeId,
    /// 0 on leaves, `1 + max(child heights)` on internal nodes, -1 on free
    /// slots.
    pub height: i32,
    /// Set when the leaf was (re)inserted since the last pair sweep.
    pub moved: bool,
}

impl<P> TreeNode<P> {
    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }

    /// Whether this slot is on the free list.
    pub fn is_free(&self) -> bool {
        self.height < 0
    }

    fn free_slot(next: NodeId) -> Self {
        Self {
            aabb: Aabb::new(Point::ZERO, Point::ZERO),
            user_data: None,
            parent: next,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            moved: false,
        }
    }
}

/// Contiguous node storage with doubling growth.
///
/// Free slots form a singly linked list threaded through their `parent`
/// field; allocation pops the head, freeing pushes it back. Growth doubles
/// the backing storage and rebuilds the free list over the new tail, so live
/// ids are never invalidated.
pub struct NodeArena<P> {
    nodes: Vec<TreeNode<P>>,
    free_list: NodeId,
    count: usize,
}

impl<P: Copy + Debug> NodeArena<P> {
    /// Create an arena with the initial capacity fully on the free list.
    pub fn new() -> Self {
        let mut arena = Self {
            nodes: Vec::new(),
            free_list: NULL_NODE,
            count: 0,
        };
        arena.grow(INITIAL_CAPACITY);
        arena
    }

    /// Pop a blank node off the free list, growing the slab if it is empty.
    ///
    /// The returned node has null links, height 0, no payload, and a cleared
    /// moved flag; the caller assigns its box.
    pub fn allocate(&mut self) -> NodeId {
        if self.free_list == NULL_NODE {
            debug_assert_eq!(self.count, self.nodes.len());
            let capacity = self.nodes.len();
            self.grow(capacity * 2);
        }

        let id = self.free_list;
        let node = &mut self.nodes[id as usize];
        self.free_list = node.parent;
        node.parent = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.user_data = None;
        node.moved = false;
        self.count += 1;
        id
    }

    /// Return a node to the free list.
    pub fn free(&mut self, id: NodeId) {
        assert!(
            0 <= id && (id as usize) < self.nodes.len(),
            "freed node id out of range"
        );
        assert!(self.count > 0, "free with no live nodes");
        let node = &mut self.nodes[id as usize];
        debug_assert!(!node.is_free(), "double free of node {id}");
        node.parent = self.free_list;
        node.height = -1;
        node.user_data = None;
        self.free_list = id;
        self.count -= 1;
    }

    /// Number of live nodes.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total slots, live and free.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the free list, by walking it.
    pub fn free_len(&self) -> usize {
        let mut n = 0;
        let mut id = self.free_list;
        while id != NULL_NODE {
            debug_assert!((id as usize) < self.nodes.len());
            id = self.nodes[id as usize].parent;
            n += 1;
        }
        n
    }

    /// Iterate over `(id, node)` for every live slot.
    pub fn iter_live(&self) -> impl Iterator<Item = (NodeId, &TreeNode<P>)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            if n.is_free() {
                return None;
            }
            #[allow(
                clippy::cast_possible_truncation,
                reason = "node ids are 32-bit by design"
            )]
            let id = i as NodeId;
            Some((id, n))
        })
    }

    /// Mutable iteration over every live node.
    pub fn iter_live_mut(&mut self) -> impl Iterator<Item = &mut TreeNode<P>> {
        self.nodes.iter_mut().filter(|n| !n.is_free())
    }

    fn grow(&mut self, new_capacity: usize) {
        let old_capacity = self.nodes.len();
        debug_assert!(new_capacity > old_capacity);
        debug_assert_eq!(self.free_list, NULL_NODE);
        self.nodes.reserve_exact(new_capacity - old_capacity);
        for i in old_capacity..new_capacity {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "node ids are 32-bit by design"
            )]
            let next = if i + 1 < new_capacity {
                (i + 1) as NodeId
            } else {
                NULL_NODE
            };
            self.nodes.push(TreeNode::free_slot(next));
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "node ids are 32-bit by design"
        )]
        let head = old_capacity as NodeId;
        self.free_list = head;
    }
}

impl<P: Copy + Debug> Default for NodeArena<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Index<NodeId> for NodeArena<P> {
    type Output = TreeNode<P>;

    #[inline]
    fn index(&self, id: NodeId) -> &TreeNode<P> {
        debug_assert!(id != NULL_NODE, "indexed arena with NULL_NODE");
        &self.nodes[id as usize]
    }
}

impl<P> IndexMut<NodeId> for NodeArena<P> {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut TreeNode<P> {
        debug_assert!(id != NULL_NODE, "indexed arena with NULL_NODE");
        &mut self.nodes[id as usize]
    }
}

impl<P> Debug for NodeArena<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeArena")
            .field("capacity", &self.nodes.len())
            .field("live", &self.count)
            .finish_non_exhaustive()
    }
}
