// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dynamic AABB tree: insertion by perimeter cost, AVL-style single
//! rotations, iterative region and ray queries, and maintenance operations.

use core::fmt::Debug;

use alloc::vec::Vec;
use kurbo::{Point, Vec2};

use crate::aabb::{Aabb, RayCastInput};
use crate::arena::{NULL_NODE, NodeArena, NodeId};
use crate::scratch::ScratchStack;
use crate::{AABB_EXTENSION, AABB_MULTIPLIER};

/// Identifier of a leaf (proxy) in the tree.
///
/// Proxy ids are node ids that happen to be leaves; they are stable for the
/// lifetime of the proxy and may be reused after destruction.
pub type ProxyId = NodeId;

/// Capacity of one traversal stack, in node ids.
///
/// A depth-first descent of a height-balanced binary tree keeps at most
/// `height + 1` nodes pending, and balance bounds the height at roughly
/// `1.44 * log2(n)`, so 256 covers any realizable population.
const TRAVERSAL_STACK: usize = 256;

/// A bounding-volume hierarchy of enlarged AABBs.
///
/// Leaves are proxies: a fat box plus a copyable payload. Internal nodes are
/// synthesized during insertion and always cover the union of their
/// children. Small motions that stay inside the stored fat box do not touch
/// the structure, which is what makes per-step updates cheap for mostly
/// resting populations.
pub struct DynamicTree<P> {
    arena: NodeArena<P>,
    root: NodeId,
}

impl<P: Copy + Debug> DynamicTree<P> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            root: NULL_NODE,
        }
    }

    /// Insert a proxy for `aabb`, enlarged by [`AABB_EXTENSION`] on each side.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: P) -> ProxyId {
        debug_assert!(aabb.is_valid());
        let proxy_id = self.arena.allocate();
        let fat = aabb.expanded(AABB_EXTENSION);
        let node = &mut self.arena[proxy_id];
        node.aabb = fat;
        node.user_data = Some(user_data);
        node.height = 0;
        node.moved = true;
        self.insert_leaf(proxy_id);
        proxy_id
    }

    /// Remove a proxy and recycle its node.
    pub fn destroy_proxy(&mut self, proxy_id: ProxyId) {
        assert!(
            self.arena[proxy_id].is_leaf(),
            "destroy_proxy on a non-leaf node"
        );
        self.remove_leaf(proxy_id);
        self.arena.free(proxy_id);
    }

    /// Move a proxy to a new tight box, predicting further motion along
    /// `displacement`.
    ///
    /// Returns whether the tree was actually re-linked. When the stored fat
    /// box still contains the new tight box and has not grown far beyond it,
    /// nothing changes and `false` is returned.
    pub fn move_proxy(&mut self, proxy_id: ProxyId, aabb: &Aabb, displacement: Vec2) -> bool {
        debug_assert!(aabb.is_valid());
        assert!(
            self.arena[proxy_id].is_leaf(),
            "move_proxy on a non-leaf node"
        );

        let mut fat = aabb.expanded(AABB_EXTENSION);

        // Stretch toward the predicted motion.
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            fat.lower.x += d.x;
        } else {
            fat.upper.x += d.x;
        }
        if d.y < 0.0 {
            fat.lower.y += d.y;
        } else {
            fat.upper.y += d.y;
        }

        let tree_aabb = self.arena[proxy_id].aabb;
        if tree_aabb.contains(aabb) {
            // The stored box still covers the object. It might also be far
            // too large, say after a fast body went to sleep; only then is a
            // refit worth it.
            let huge = fat.expanded(4.0 * AABB_EXTENSION);
            if huge.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.arena[proxy_id].aabb = fat;
        self.insert_leaf(proxy_id);
        self.arena[proxy_id].moved = true;
        true
    }

    /// The stored (fat) box of a proxy.
    pub fn fat_aabb(&self, proxy_id: ProxyId) -> Aabb {
        debug_assert!(self.arena[proxy_id].is_leaf());
        self.arena[proxy_id].aabb
    }

    /// The payload bound to a proxy.
    pub fn user_data(&self, proxy_id: ProxyId) -> P {
        self.arena[proxy_id]
            .user_data
            .expect("proxy carries a payload")
    }

    /// Whether the proxy re-linked since the flag was last cleared.
    pub fn was_moved(&self, proxy_id: ProxyId) -> bool {
        self.arena[proxy_id].moved
    }

    /// Clear the moved flag of a proxy.
    pub fn clear_moved(&mut self, proxy_id: ProxyId) {
        self.arena[proxy_id].moved = false;
    }

    /// Whether the fat boxes of two proxies overlap.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.fat_aabb(a).overlaps(&self.fat_aabb(b))
    }

    /// Number of live proxies (leaves).
    pub fn proxy_count(&self) -> usize {
        self.arena
            .iter_live()
            .filter(|(_, node)| node.is_leaf())
            .count()
    }

    /// Visit every leaf whose fat box overlaps `aabb`.
    ///
    /// Traversal is iterative; the stack is drawn from `scratch`. Returning
    /// `false` from the callback ends the whole traversal.
    pub fn query<F>(&self, scratch: &mut ScratchStack<NodeId>, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        debug_assert!(aabb.is_valid());
        let stack = scratch.allocate(TRAVERSAL_STACK);
        let mut count = 0_usize;
        if self.root != NULL_NODE {
            scratch.slice_mut(&stack)[0] = self.root;
            count = 1;
        }

        while count > 0 {
            count -= 1;
            let node_id = scratch.slice(&stack)[count];
            let node = &self.arena[node_id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(node_id) {
                    break;
                }
            } else {
                assert!(count + 2 <= stack.len(), "traversal stack overflow");
                let buf = scratch.slice_mut(&stack);
                buf[count] = node.child1;
                buf[count + 1] = node.child2;
                count += 2;
            }
        }

        scratch.free(stack);
    }

    /// Cast a ray against the leaves.
    ///
    /// The callback receives the remaining sub-ray and the hit candidate. Its
    /// return value steers the traversal: `0.0` ends it, a positive fraction
    /// clips the ray for subsequent leaves, and returning the incoming
    /// `max_fraction` leaves the ray unchanged.
    pub fn ray_cast<F>(&self, scratch: &mut ScratchStack<NodeId>, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f64,
    {
        let p1 = input.p1;
        let p2 = input.p2;
        let d = p2 - p1;
        debug_assert!(d.hypot2() > 0.0, "ray segment is degenerate");

        // Separating axis perpendicular to the segment, unnormalized: only
        // the sign of the separation matters.
        let v = Vec2::new(-d.y, d.x);
        let abs_v = Vec2::new(v.x.abs(), v.y.abs());

        let mut max_fraction = input.max_fraction;
        let mut segment_aabb = segment_bounds(p1, p2, max_fraction);

        let stack = scratch.allocate(TRAVERSAL_STACK);
        let mut count = 0_usize;
        if self.root != NULL_NODE {
            scratch.slice_mut(&stack)[0] = self.root;
            count = 1;
        }

        while count > 0 {
            count -= 1;
            let node_id = scratch.slice(&stack)[count];
            let node = &self.arena[node_id];
            if !node.aabb.overlaps(&segment_aabb) {
                continue;
            }

            // Cull boxes fully to one side of the segment's line.
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(c - p1).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, node_id);
                if value == 0.0 {
                    break;
                }
                if value > 0.0 {
                    max_fraction = value;
                    segment_aabb = segment_bounds(p1, p2, max_fraction);
                }
            } else {
                assert!(count + 2 <= stack.len(), "traversal stack overflow");
                let buf = scratch.slice_mut(&stack);
                buf[count] = node.child1;
                buf[count + 1] = node.child2;
                count += 2;
            }
        }

        scratch.free(stack);
    }

    /// Height of the tree; 0 when empty.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            return 0;
        }
        self.arena[self.root].height
    }

    /// Maximum child-height imbalance over all internal nodes.
    pub fn max_balance(&self) -> i32 {
        let mut max_balance = 0;
        for (_, node) in self.arena.iter_live() {
            if node.height <= 1 {
                continue;
            }
            debug_assert!(!node.is_leaf());
            let balance = (self.arena[node.child2].height - self.arena[node.child1].height).abs();
            max_balance = max_balance.max(balance);
        }
        max_balance
    }

    /// Sum of internal-node perimeters over the root perimeter.
    ///
    /// Lower is better; a perfectly packed tree approaches the number of
    /// levels. Diagnostic only.
    pub fn area_ratio(&self) -> f64 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.arena[self.root].aabb.perimeter();
        let mut total_area = 0.0;
        for (_, node) in self.arena.iter_live() {
            if node.is_leaf() {
                continue;
            }
            total_area += node.aabb.perimeter();
        }
        total_area / root_area
    }

    /// Height recomputed by walking the tree; cross-checks stored heights.
    pub fn compute_height(&self) -> i32 {
        if self.root == NULL_NODE {
            return 0;
        }
        self.compute_height_from(self.root)
    }

    /// Rebuild the hierarchy bottom-up by greedily pairing the two subtrees
    /// whose union has the smallest perimeter.
    ///
    /// Quadratic in the number of leaves; intended as a maintenance pass
    /// while the world is idle. Produces a tighter tree than incremental
    /// insertion.
    pub fn rebuild_bottom_up(&mut self) {
        // Collect the leaves and recycle every internal node.
        let live: Vec<NodeId> = self.arena.iter_live().map(|(id, _)| id).collect();
        let mut nodes: Vec<NodeId> = Vec::with_capacity(live.len());
        for id in live {
            if self.arena[id].is_leaf() {
                self.arena[id].parent = NULL_NODE;
                nodes.push(id);
            } else {
                self.arena.free(id);
            }
        }

        let mut count = nodes.len();
        while count > 1 {
            let mut min_cost = f64::MAX;
            let (mut i_min, mut j_min) = (0, 1);
            for i in 0..count {
                let aabb_i = self.arena[nodes[i]].aabb;
                for j in (i + 1)..count {
                    let cost = aabb_i.union(&self.arena[nodes[j]].aabb).perimeter();
                    if cost < min_cost {
                        min_cost = cost;
                        i_min = i;
                        j_min = j;
                    }
                }
            }

            let index1 = nodes[i_min];
            let index2 = nodes[j_min];
            let aabb = self.arena[index1].aabb.union(&self.arena[index2].aabb);
            let height = 1 + self.arena[index1].height.max(self.arena[index2].height);

            let parent_index = self.arena.allocate();
            {
                let parent = &mut self.arena[parent_index];
                parent.child1 = index1;
                parent.child2 = index2;
                parent.height = height;
                parent.aabb = aabb;
                parent.parent = NULL_NODE;
            }
            self.arena[index1].parent = parent_index;
            self.arena[index2].parent = parent_index;

            nodes[j_min] = nodes[count - 1];
            nodes[i_min] = parent_index;
            count -= 1;
        }

        self.root = if count == 1 { nodes[0] } else { NULL_NODE };
        #[cfg(debug_assertions)]
        self.validate();
    }

    /// Shift the coordinate origin: every stored box moves by `-new_origin`.
    ///
    /// Useful to keep coordinates small in large worlds. Proxy ids are
    /// unaffected.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for node in self.arena.iter_live_mut() {
            node.aabb.lower = node.aabb.lower - new_origin;
            node.aabb.upper = node.aabb.upper - new_origin;
        }
    }

    /// Check every structural invariant, panicking on violation.
    ///
    /// Covers parent/child linkage, stored heights and boxes, and the
    /// live/free partition of the arena.
    pub fn validate(&self) {
        self.validate_structure(self.root);
        self.validate_metrics(self.root);

        if self.root != NULL_NODE {
            assert_eq!(self.arena[self.root].parent, NULL_NODE);
        }
        assert_eq!(self.height(), self.compute_height());
        assert_eq!(
            self.arena.count() + self.arena.free_len(),
            self.arena.capacity(),
            "live nodes and free list must partition the arena"
        );
    }

    // --- internals ---

    fn insert_leaf(&mut self, leaf: NodeId) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.arena[leaf].parent = NULL_NODE;
            return;
        }

        // Descend toward the cheapest sibling.
        let leaf_aabb = self.arena[leaf].aabb;
        let mut index = self.root;
        while !self.arena[index].is_leaf() {
            let child1 = self.arena[index].child1;
            let child2 = self.arena[index].child2;

            let area = self.arena[index].aabb.perimeter();
            let combined_area = self.arena[index].aabb.union(&leaf_aabb).perimeter();

            // Cost of making the leaf a sibling of this node.
            let cost = 2.0 * combined_area;

            // Every descent grows this node's box; children inherit that.
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb, inheritance_cost);
            let cost2 = self.descend_cost(child2, &leaf_aabb, inheritance_cost);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 <= cost2 { child1 } else { child2 };
        }
        let sibling = index;

        // Splice a fresh parent above the sibling.
        let old_parent = self.arena[sibling].parent;
        let sibling_aabb = self.arena[sibling].aabb;
        let sibling_height = self.arena[sibling].height;
        let new_parent = self.arena.allocate();
        {
            let node = &mut self.arena[new_parent];
            node.parent = old_parent;
            node.aabb = leaf_aabb.union(&sibling_aabb);
            node.height = sibling_height + 1;
        }

        if old_parent != NULL_NODE {
            if self.arena[old_parent].child1 == sibling {
                self.arena[old_parent].child1 = new_parent;
            } else {
                self.arena[old_parent].child2 = new_parent;
            }
        } else {
            // The sibling was the root.
            self.root = new_parent;
        }
        self.arena[new_parent].child1 = sibling;
        self.arena[new_parent].child2 = leaf;
        self.arena[sibling].parent = new_parent;
        self.arena[leaf].parent = new_parent;

        // Walk back up fixing heights and boxes.
        let mut index = self.arena[leaf].parent;
        while index != NULL_NODE {
            index = self.balance(index);
            self.refit(index);
            index = self.arena[index].parent;
        }
    }

    fn remove_leaf(&mut self, leaf: NodeId) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.arena[leaf].parent;
        let grand_parent = self.arena[parent].parent;
        let sibling = if self.arena[parent].child1 == leaf {
            self.arena[parent].child2
        } else {
            self.arena[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Splice the sibling into the grandparent and drop the parent.
            if self.arena[grand_parent].child1 == parent {
                self.arena[grand_parent].child1 = sibling;
            } else {
                self.arena[grand_parent].child2 = sibling;
            }
            self.arena[sibling].parent = grand_parent;
            self.arena.free(parent);

            let mut index = grand_parent;
            while index != NULL_NODE {
                index = self.balance(index);
                self.refit(index);
                index = self.arena[index].parent;
            }
        } else {
            self.root = sibling;
            self.arena[sibling].parent = NULL_NODE;
            self.arena.free(parent);
        }
    }

    /// Recompute an internal node's height and box from its children.
    fn refit(&mut self, index: NodeId) {
        let child1 = self.arena[index].child1;
        let child2 = self.arena[index].child2;
        debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);
        let height = 1 + self.arena[child1].height.max(self.arena[child2].height);
        let aabb = self.arena[child1].aabb.union(&self.arena[child2].aabb);
        let node = &mut self.arena[index];
        node.height = height;
        node.aabb = aabb;
    }

    fn descend_cost(&self, child: NodeId, leaf_aabb: &Aabb, inheritance_cost: f64) -> f64 {
        let enlarged = self.arena[child].aabb.union(leaf_aabb).perimeter();
        if self.arena[child].is_leaf() {
            enlarged + inheritance_cost
        } else {
            let old_area = self.arena[child].aabb.perimeter();
            (enlarged - old_area) + inheritance_cost
        }
    }

    /// Perform at most one single rotation at `ia` and return the id of the
    /// subtree root afterwards.
    ///
    /// When a child is taller than its sibling by more than one, that child
    /// rotates up above `ia`; of its two children the taller stays with it
    /// and the shorter becomes `ia`'s child, which restores the balance
    /// bound.
    fn balance(&mut self, ia: NodeId) -> NodeId {
        debug_assert!(ia != NULL_NODE);

        if self.arena[ia].is_leaf() || self.arena[ia].height < 2 {
            return ia;
        }

        let ib = self.arena[ia].child1;
        let ic = self.arena[ia].child2;
        let balance = self.arena[ic].height - self.arena[ib].height;

        // Rotate C up.
        if balance > 1 {
            let i_f = self.arena[ic].child1;
            let i_g = self.arena[ic].child2;

            // Swap A and C.
            let a_parent = self.arena[ia].parent;
            self.arena[ic].child1 = ia;
            self.arena[ic].parent = a_parent;
            self.arena[ia].parent = ic;

            // A's old parent should point to C.
            if a_parent != NULL_NODE {
                if self.arena[a_parent].child1 == ia {
                    self.arena[a_parent].child1 = ic;
                } else {
                    debug_assert_eq!(self.arena[a_parent].child2, ia);
                    self.arena[a_parent].child2 = ic;
                }
            } else {
                self.root = ic;
            }

            // The taller grandchild stays under C; the shorter replaces C
            // under A.
            if self.arena[i_f].height > self.arena[i_g].height {
                self.arena[ic].child2 = i_f;
                self.arena[ia].child2 = i_g;
                self.arena[i_g].parent = ia;

                let a_aabb = self.arena[ib].aabb.union(&self.arena[i_g].aabb);
                let a_height = 1 + self.arena[ib].height.max(self.arena[i_g].height);
                let c_aabb = a_aabb.union(&self.arena[i_f].aabb);
                let c_height = 1 + a_height.max(self.arena[i_f].height);
                self.set_box(ia, a_aabb, a_height);
                self.set_box(ic, c_aabb, c_height);
            } else {
                self.arena[ic].child2 = i_g;
                self.arena[ia].child2 = i_f;
                self.arena[i_f].parent = ia;

                let a_aabb = self.arena[ib].aabb.union(&self.arena[i_f].aabb);
                let a_height = 1 + self.arena[ib].height.max(self.arena[i_f].height);
                let c_aabb = a_aabb.union(&self.arena[i_g].aabb);
                let c_height = 1 + a_height.max(self.arena[i_g].height);
                self.set_box(ia, a_aabb, a_height);
                self.set_box(ic, c_aabb, c_height);
            }

            return ic;
        }

        // Rotate B up.
        if balance < -1 {
            let i_d = self.arena[ib].child1;
            let i_e = self.arena[ib].child2;

            // Swap A and B.
            let a_parent = self.arena[ia].parent;
            self.arena[ib].child1 = ia;
            self.arena[ib].parent = a_parent;
            self.arena[ia].parent = ib;

            // A's old parent should point to B.
            if a_parent != NULL_NODE {
                if self.arena[a_parent].child1 == ia {
                    self.arena[a_parent].child1 = ib;
                } else {
                    debug_assert_eq!(self.arena[a_parent].child2, ia);
                    self.arena[a_parent].child2 = ib;
                }
            } else {
                self.root = ib;
            }

            if self.arena[i_d].height > self.arena[i_e].height {
                self.arena[ib].child2 = i_d;
                self.arena[ia].child1 = i_e;
                self.arena[i_e].parent = ia;

                let a_aabb = self.arena[ic].aabb.union(&self.arena[i_e].aabb);
                let a_height = 1 + self.arena[ic].height.max(self.arena[i_e].height);
                let b_aabb = a_aabb.union(&self.arena[i_d].aabb);
                let b_height = 1 + a_height.max(self.arena[i_d].height);
                self.set_box(ia, a_aabb, a_height);
                self.set_box(ib, b_aabb, b_height);
            } else {
                self.arena[ib].child2 = i_e;
                self.arena[ia].child1 = i_d;
                self.arena[i_d].parent = ia;

                let a_aabb = self.arena[ic].aabb.union(&self.arena[i_d].aabb);
                let a_height = 1 + self.arena[ic].height.max(self.arena[i_d].height);
                let b_aabb = a_aabb.union(&self.arena[i_e].aabb);
                let b_height = 1 + a_height.max(self.arena[i_e].height);
                self.set_box(ia, a_aabb, a_height);
                self.set_box(ib, b_aabb, b_height);
            }

            return ib;
        }

        ia
    }

    #[inline]
    fn set_box(&mut self, index: NodeId, aabb: Aabb, height: i32) {
        let node = &mut self.arena[index];
        node.aabb = aabb;
        node.height = height;
    }

    fn compute_height_from(&self, node_id: NodeId) -> i32 {
        let node = &self.arena[node_id];
        if node.is_leaf() {
            return 0;
        }
        let height1 = self.compute_height_from(node.child1);
        let height2 = self.compute_height_from(node.child2);
        1 + height1.max(height2)
    }

    fn validate_structure(&self, index: NodeId) {
        if index == NULL_NODE {
            return;
        }
        let node = &self.arena[index];
        let child1 = node.child1;
        let child2 = node.child2;

        if node.is_leaf() {
            assert_eq!(child1, NULL_NODE);
            assert_eq!(child2, NULL_NODE);
            assert_eq!(node.height, 0);
            assert!(node.user_data.is_some(), "leaves carry the payload");
            return;
        }
        assert!(node.user_data.is_none(), "only leaves carry a payload");

        assert_eq!(self.arena[child1].parent, index);
        assert_eq!(self.arena[child2].parent, index);

        self.validate_structure(child1);
        self.validate_structure(child2);
    }

    fn validate_metrics(&self, index: NodeId) {
        if index == NULL_NODE {
            return;
        }
        let node = &self.arena[index];
        if node.is_leaf() {
            return;
        }
        let child1 = node.child1;
        let child2 = node.child2;

        let height1 = self.arena[child1].height;
        let height2 = self.arena[child2].height;
        assert_eq!(node.height, 1 + height1.max(height2));

        let aabb = self.arena[child1].aabb.union(&self.arena[child2].aabb);
        assert_eq!(node.aabb, aabb, "internal box must equal the child union");

        self.validate_metrics(child1);
        self.validate_metrics(child2);
    }
}

impl<P: Copy + Debug> Default for DynamicTree<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Debug for DynamicTree<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DynamicTree")
            .field("root", &self.root)
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

fn segment_bounds(p1: Point, p2: Point, max_fraction: f64) -> Aabb {
    let t = p1 + (p2 - p1) * max_fraction;
    Aabb::new(
        Point::new(p1.x.min(t.x), p1.y.min(t.y)),
        Point::new(p1.x.max(t.x), p1.y.max(t.y)),
    )
}
