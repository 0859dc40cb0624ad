// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overstory Tree: a kurbo-native dynamic AABB tree for 2D broad-phase
//! collision detection.
//!
//! Overstory Tree is the acceleration structure under a rigid-body pipeline:
//! it tracks a population of moving boxes and answers "what might touch
//! what" quickly, leaving exact geometry to later stages.
//!
//! - Insert, move, and remove proxies: enlarged (fat) AABBs paired with a
//!   copyable payload, addressed by stable integer ids.
//! - Query by rectangle or cast rays, both as iterative traversals with
//!   early termination.
//! - Rebuild bottom-up for a tighter hierarchy during idle time, and shift
//!   the coordinate origin without touching ids.
//!
//! Leaves are kept **fat**: each stored box is the caller's tight box grown
//! by [`AABB_EXTENSION`] and stretched along the predicted motion
//! ([`AABB_MULTIPLIER`] times the displacement). A proxy whose tight box
//! stays inside its stored box does not touch the structure at all, so a
//! world full of resting bodies updates in constant time per body.
//!
//! Insertion descends toward the sibling that minimizes an enlargement cost
//! measured by box perimeter (cheaper than area in 2D and monotone in the
//! same direction), and a single-rotation pass keeps sibling heights within
//! one of each other, so queries stay logarithmic under churn.
//!
//! # Example
//!
//! ```rust
//! use kurbo::{Point, Vec2};
//! use overstory_tree::{Aabb, DynamicTree, ScratchStack};
//!
//! let mut tree: DynamicTree<u32> = DynamicTree::new();
//! let a = tree.create_proxy(&Aabb::new(Point::new(0.0, 0.0), Point::new(1.0, 1.0)), 1);
//! let _b = tree.create_proxy(&Aabb::new(Point::new(5.0, 0.0), Point::new(6.0, 1.0)), 2);
//!
//! // Region query: traversal stacks come from a scratch stack owned by the
//! // caller.
//! let mut scratch = ScratchStack::new();
//! let mut hits = Vec::new();
//! let window = Aabb::new(Point::new(4.0, 0.0), Point::new(7.0, 2.0));
//! tree.query(&mut scratch, &window, |id| {
//!     hits.push(tree.user_data(id));
//!     true
//! });
//! assert_eq!(hits, vec![2]);
//!
//! // A small motion stays inside the fat box and does not re-link the tree.
//! let nudged = Aabb::new(Point::new(0.02, 0.0), Point::new(1.02, 1.0));
//! assert!(!tree.move_proxy(a, &nudged, Vec2::new(0.02, 0.0)));
//! ```
//!
//! # Ray casts
//!
//! ```rust
//! use kurbo::Point;
//! use overstory_tree::{Aabb, DynamicTree, RayCastInput, ScratchStack};
//!
//! let mut tree: DynamicTree<&str> = DynamicTree::new();
//! tree.create_proxy(&Aabb::new(Point::new(3.0, -1.0), Point::new(4.0, 1.0)), "wall");
//!
//! let input = RayCastInput {
//!     p1: Point::new(0.0, 0.0),
//!     p2: Point::new(10.0, 0.0),
//!     max_fraction: 1.0,
//! };
//! let mut scratch = ScratchStack::new();
//! let mut first = None;
//! tree.ray_cast(&mut scratch, &input, |sub, id| {
//!     match tree.fat_aabb(id).ray_cast(sub) {
//!         Some(hit) => {
//!             first = Some((tree.user_data(id), hit.fraction));
//!             hit.fraction // clip the ray to this hit
//!         }
//!         None => sub.max_fraction,
//!     }
//! });
//! let (name, fraction) = first.unwrap();
//! assert_eq!(name, "wall");
//! assert!(fraction < 0.3);
//! ```
//!
//! Float inputs are assumed finite (no NaNs); debug builds assert. This
//! crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod aabb;
pub mod arena;
pub mod scratch;
pub mod tree;

pub use aabb::{Aabb, RayCastInput, RayCastOutput};
pub use arena::{NULL_NODE, NodeArena, NodeId, TreeNode};
pub use scratch::{MAX_SCRATCH_ENTRIES, SCRATCH_CAPACITY, ScratchEntry, ScratchStack};
pub use tree::{DynamicTree, ProxyId};

/// Margin added to each side of a proxy's tight box before it is stored.
///
/// In world units; chosen so that typical per-step jitter stays inside the
/// stored box.
pub const AABB_EXTENSION: f64 = 0.1;

/// How far ahead of a moving proxy the stored box is stretched, as a
/// multiple of the per-step displacement.
pub const AABB_MULTIPLIER: f64 = 4.0;
