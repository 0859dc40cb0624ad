// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overstory Broad Phase: candidate-pair generation for 2D collision
//! pipelines.
//!
//! The broad-phase sits between body motion and narrow-phase contact work:
//! it owns an [`overstory_tree::DynamicTree`] of fat boxes and, once per
//! step, reports which pairs of proxies *might* be touching. It does not
//! persist pairs; each sweep reports the pairs disturbed by motion since the
//! previous sweep, exactly once each, and the consumer keeps whatever
//! contact state it needs.
//!
//! - [`BroadPhase::create_proxy`] / [`BroadPhase::move_proxy`] /
//!   [`BroadPhase::destroy_proxy`] maintain the population as bodies come,
//!   go, and move.
//! - [`BroadPhase::touch_proxy`] forces a proxy to re-pair on the next sweep
//!   without moving it (useful when filtering state changes).
//! - [`BroadPhase::update_pairs`] runs the sweep and hands each candidate
//!   pair's payloads to a closure, sorted by id pair and deduplicated.
//! - Region queries and ray casts pass through to the tree.
//!
//! # Example
//!
//! ```rust
//! use kurbo::{Point, Vec2};
//! use overstory_broad_phase::{Aabb, BroadPhase};
//!
//! let mut phase: BroadPhase<u32> = BroadPhase::new();
//! let ball = phase.create_proxy(&Aabb::new(Point::new(0.0, 0.0), Point::new(1.0, 1.0)), 1);
//! let _block = phase.create_proxy(&Aabb::new(Point::new(0.5, 0.5), Point::new(1.5, 1.5)), 2);
//!
//! // The first sweep pairs the two overlapping proxies.
//! let mut pairs = Vec::new();
//! phase.update_pairs(|a, b| pairs.push((a, b)));
//! assert_eq!(pairs, vec![(1, 2)]);
//!
//! // A settled world stays quiet.
//! pairs.clear();
//! phase.update_pairs(|a, b| pairs.push((a, b)));
//! assert!(pairs.is_empty());
//!
//! // Small motions are absorbed by the fat boxes and stay quiet too.
//! let nudged = Aabb::new(Point::new(0.02, 0.0), Point::new(1.02, 1.0));
//! phase.move_proxy(ball, &nudged, Vec2::new(0.02, 0.0));
//! phase.update_pairs(|a, b| pairs.push((a, b)));
//! assert!(pairs.is_empty());
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod phase;

pub use overstory_tree::{Aabb, ProxyId, RayCastInput, RayCastOutput};
pub use phase::{BroadPhase, NULL_PROXY, Pair};
