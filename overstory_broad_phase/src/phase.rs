// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The broad-phase facade: proxy bookkeeping, the move buffer, and per-step
//! pair emission.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Debug;

use kurbo::Vec2;

use overstory_tree::{Aabb, DynamicTree, NodeId, ProxyId, RayCastInput, ScratchStack};

/// Sentinel marking destroyed entries in the move buffer.
pub const NULL_PROXY: ProxyId = overstory_tree::NULL_NODE;

/// A candidate pair of proxies, ordered so `a <= b`.
///
/// The derived ordering is lexicographic by `(a, b)`, which is what the
/// emission step sorts by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pair {
    /// Lower proxy id of the pair.
    pub a: ProxyId,
    /// Higher proxy id of the pair.
    pub b: ProxyId,
}

/// Produces candidate overlap pairs without testing exact geometry.
///
/// The broad-phase wraps a [`DynamicTree`] and remembers which proxies moved
/// since the last sweep. [`BroadPhase::update_pairs`] then queries the tree
/// once per moved proxy and reports every unordered pair of overlapping fat
/// boxes with at least one moved endpoint, each exactly once. Pairs are not
/// persisted across sweeps; consumers track their own contact lifetimes.
pub struct BroadPhase<P> {
    tree: DynamicTree<P>,
    /// Scratch space for traversal stacks, shared by all queries. Interior
    /// mutability keeps queries `&self`; callbacks must not start another
    /// query on the same instance.
    scratch: RefCell<ScratchStack<NodeId>>,
    proxy_count: usize,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<Pair>,
}

impl<P: Copy + Debug> BroadPhase<P> {
    /// Create an empty broad-phase.
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            scratch: RefCell::new(ScratchStack::new()),
            proxy_count: 0,
            move_buffer: Vec::new(),
            pair_buffer: Vec::new(),
        }
    }

    /// Create a proxy and schedule it for pairing at the next
    /// [`Self::update_pairs`].
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: P) -> ProxyId {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(proxy_id);
        proxy_id
    }

    /// Destroy a proxy. Pairs already delivered are the caller's problem.
    pub fn destroy_proxy(&mut self, proxy_id: ProxyId) {
        self.unbuffer_move(proxy_id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(proxy_id);
    }

    /// Move a proxy. Call as often as you like, then call
    /// [`Self::update_pairs`] once per step.
    ///
    /// The proxy only re-enters the move buffer when the tree actually
    /// re-linked it; motions absorbed by the fat box stay silent.
    pub fn move_proxy(&mut self, proxy_id: ProxyId, aabb: &Aabb, displacement: Vec2) {
        let relinked = self.tree.move_proxy(proxy_id, aabb, displacement);
        if relinked {
            self.buffer_move(proxy_id);
        }
    }

    /// Schedule a proxy for re-pairing without moving it.
    pub fn touch_proxy(&mut self, proxy_id: ProxyId) {
        self.buffer_move(proxy_id);
    }

    /// The fat box stored for a proxy.
    pub fn fat_aabb(&self, proxy_id: ProxyId) -> Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    /// The payload bound to a proxy.
    pub fn user_data(&self, proxy_id: ProxyId) -> P {
        self.tree.user_data(proxy_id)
    }

    /// Whether the fat boxes of two proxies overlap.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.test_overlap(a, b)
    }

    /// Number of live proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Emit every candidate pair touched by motion since the last sweep.
    ///
    /// For each proxy in the move buffer, the tree is queried with that
    /// proxy's fat box. Candidates are staged, sorted lexicographically by
    /// id pair, and delivered to `callback` once per unordered pair as
    /// `(payload_a, payload_b)`. Afterwards the move buffer is empty and no
    /// proxy is marked moved.
    pub fn update_pairs<F>(&mut self, mut callback: F)
    where
        F: FnMut(P, P),
    {
        self.pair_buffer.clear();

        let Self {
            tree,
            scratch,
            move_buffer,
            pair_buffer,
            ..
        } = self;
        let scratch = scratch.get_mut();

        // Query the tree with each moved proxy's fat box. Using the fat box
        // rather than the tight one keeps pairs alive slightly before they
        // touch, so narrow-phase sees them coming.
        for &query_proxy_id in move_buffer.iter() {
            if query_proxy_id == NULL_PROXY {
                continue;
            }
            let fat_aabb = tree.fat_aabb(query_proxy_id);
            tree.query(scratch, &fat_aabb, |proxy_id| {
                // A proxy never pairs with itself.
                if proxy_id == query_proxy_id {
                    return true;
                }
                if tree.was_moved(proxy_id) && proxy_id > query_proxy_id {
                    // Both endpoints moved; the pair is collected when the
                    // higher id drives its own query and sees the lower one.
                    return true;
                }
                pair_buffer.push(Pair {
                    a: proxy_id.min(query_proxy_id),
                    b: proxy_id.max(query_proxy_id),
                });
                true
            });
        }

        // Sort, then deliver each run of equal pairs once.
        pair_buffer.sort_unstable();
        let mut i = 0;
        while i < pair_buffer.len() {
            let primary = pair_buffer[i];
            callback(tree.user_data(primary.a), tree.user_data(primary.b));
            i += 1;
            while i < pair_buffer.len() && pair_buffer[i] == primary {
                i += 1;
            }
        }

        for &proxy_id in move_buffer.iter() {
            if proxy_id != NULL_PROXY {
                tree.clear_moved(proxy_id);
            }
        }
        move_buffer.clear();
    }

    /// Visit every proxy whose fat box overlaps `aabb`.
    ///
    /// Returning `false` from the callback ends the traversal. The callback
    /// may read from this broad-phase but must not start another query on it.
    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        let mut scratch = self.scratch.borrow_mut();
        self.tree.query(&mut scratch, aabb, callback);
    }

    /// Cast a ray against the proxies. See
    /// [`DynamicTree::ray_cast`] for the callback protocol. The callback may
    /// read from this broad-phase but must not start another query on it.
    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f64,
    {
        let mut scratch = self.scratch.borrow_mut();
        self.tree.ray_cast(&mut scratch, input, callback);
    }

    /// Height of the underlying tree.
    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    /// Maximum child-height imbalance in the underlying tree.
    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    /// Perimeter ratio of the underlying tree; diagnostic only.
    pub fn tree_quality(&self) -> f64 {
        self.tree.area_ratio()
    }

    /// Shift the coordinate origin of every stored box by `-new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
    }

    fn buffer_move(&mut self, proxy_id: ProxyId) {
        self.move_buffer.push(proxy_id);
    }

    /// Tombstone rather than compact: indices into the buffer stay valid for
    /// the sweep in progress, and the whole buffer resets at its end.
    fn unbuffer_move(&mut self, proxy_id: ProxyId) {
        for slot in &mut self.move_buffer {
            if *slot == proxy_id {
                *slot = NULL_PROXY;
            }
        }
    }
}

impl<P: Copy + Debug> Default for BroadPhase<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Debug for BroadPhase<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BroadPhase")
            .field("proxies", &self.proxy_count)
            .field("pending_moves", &self.move_buffer.len())
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{vec, vec::Vec};
    use kurbo::Point;

    fn aabb(x0: f64, y0: f64, x1: f64, y1: f64) -> Aabb {
        Aabb::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    /// Run one sweep and return the emitted payload pairs, each normalized
    /// so the smaller payload comes first.
    fn sweep(phase: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        phase.update_pairs(|a, b| {
            pairs.push((a.min(b), a.max(b)));
        });
        pairs
    }

    #[test]
    fn single_proxy_emits_nothing() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        assert_eq!(sweep(&mut phase), Vec::new());
        // The move buffer drained; a second sweep is also empty.
        assert_eq!(sweep(&mut phase), Vec::new());
    }

    #[test]
    fn touching_pair_is_emitted_exactly_once() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(0.5, 0.5, 1.5, 1.5), 2);
        assert_eq!(sweep(&mut phase), vec![(1, 2)]);
    }

    #[test]
    fn destruction_during_quiescence() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(0.5, 0.5, 1.5, 1.5), 2);
        assert_eq!(sweep(&mut phase).len(), 1);
        assert_eq!(sweep(&mut phase), Vec::new(), "settled world stays quiet");

        phase.destroy_proxy(p1);
        assert_eq!(phase.proxy_count(), 1);
        assert_eq!(sweep(&mut phase), Vec::new());
    }

    #[test]
    fn destroying_a_buffered_proxy_tombstones_it() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(0.5, 0.5, 1.5, 1.5), 2);
        // p1 is still in the move buffer when it dies.
        phase.destroy_proxy(p1);
        assert_eq!(phase.proxy_count(), 1);
        assert_eq!(sweep(&mut phase), Vec::new(), "no pair may reference p1");
    }

    #[test]
    fn small_motion_does_not_repair() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(0.5, 0.5, 1.5, 1.5), 2);
        assert_eq!(sweep(&mut phase).len(), 1);

        // A nudge absorbed by the fat box leaves the move buffer empty.
        phase.move_proxy(p1, &aabb(0.05, 0.0, 1.05, 1.0), Vec2::new(0.05, 0.0));
        assert_eq!(sweep(&mut phase), Vec::new());
    }

    #[test]
    fn large_motion_repairs() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(10.0, 10.0, 11.0, 11.0), 2);
        assert_eq!(sweep(&mut phase), Vec::new(), "apart at first");

        // Jump onto the second proxy.
        phase.move_proxy(p1, &aabb(10.2, 10.2, 11.2, 11.2), Vec2::new(10.2, 10.2));
        assert!(phase.fat_aabb(p1).contains(&aabb(10.2, 10.2, 11.2, 11.2)));
        assert_eq!(sweep(&mut phase), vec![(1, 2)]);
    }

    #[test]
    fn moved_moved_pairs_are_deduplicated() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        // Three mutually overlapping proxies, all freshly created and hence
        // all in the move buffer with the moved flag set.
        phase.create_proxy(&aabb(0.0, 0.0, 2.0, 2.0), 1);
        phase.create_proxy(&aabb(1.0, 0.0, 3.0, 2.0), 2);
        phase.create_proxy(&aabb(0.5, 0.5, 2.5, 2.5), 3);

        let pairs = sweep(&mut phase);
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn touched_pairs_are_deduplicated_too() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let a = phase.create_proxy(&aabb(0.0, 0.0, 2.0, 2.0), 1);
        let b = phase.create_proxy(&aabb(1.0, 0.0, 3.0, 2.0), 2);
        let c = phase.create_proxy(&aabb(0.5, 0.5, 2.5, 2.5), 3);
        let _ = sweep(&mut phase);

        // Touching does not set the moved flag, so every driver re-collects
        // its pairs; the sort/collapse step still emits each once.
        phase.touch_proxy(a);
        phase.touch_proxy(b);
        phase.touch_proxy(c);
        let pairs = sweep(&mut phase);
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn touch_revives_a_settled_pair() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(0.5, 0.5, 1.5, 1.5), 2);
        let _ = sweep(&mut phase);
        assert_eq!(sweep(&mut phase), Vec::new());

        phase.touch_proxy(p1);
        assert_eq!(sweep(&mut phase), vec![(1, 2)]);
    }

    #[test]
    fn duplicate_move_entries_are_harmless() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(20.0, 0.0, 21.0, 1.0), 2);
        let _ = sweep(&mut phase);

        // Two large moves in one step buffer the proxy twice.
        phase.move_proxy(p1, &aabb(10.0, 0.0, 11.0, 1.0), Vec2::new(10.0, 0.0));
        phase.move_proxy(p1, &aabb(19.5, 0.0, 20.5, 1.0), Vec2::new(9.5, 0.0));
        assert_eq!(sweep(&mut phase), vec![(1, 2)]);
    }

    #[test]
    fn emission_is_sorted_by_id_pair() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        // A chain: each proxy overlaps only its neighbors.
        phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 10);
        phase.create_proxy(&aabb(0.8, 0.0, 1.8, 1.0), 20);
        phase.create_proxy(&aabb(1.6, 0.0, 2.6, 1.0), 30);

        let mut raw = Vec::new();
        phase.update_pairs(|a, b| raw.push((a, b)));
        // Ids ascend with creation order, so sorted id pairs map to sorted
        // payload pairs here.
        assert_eq!(raw, vec![(10, 20), (20, 30)]);
    }

    #[test]
    fn separated_proxies_are_never_delivered() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(50.0, 50.0, 51.0, 51.0), 2);
        assert_eq!(sweep(&mut phase), Vec::new());

        phase.move_proxy(p1, &aabb(5.0, 5.0, 6.0, 6.0), Vec2::new(5.0, 5.0));
        assert_eq!(sweep(&mut phase), Vec::new());
    }

    #[test]
    fn query_and_ray_cast_delegate_to_the_tree() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        let p2 = phase.create_proxy(&aabb(5.0, 0.0, 6.0, 1.0), 2);

        let mut hits = Vec::new();
        phase.query(&aabb(4.0, 0.0, 7.0, 1.0), |id| {
            hits.push(id);
            true
        });
        assert_eq!(hits, vec![p2]);

        assert!(!phase.test_overlap(p1, p2));

        let input = RayCastInput {
            p1: Point::new(-1.0, 0.5),
            p2: Point::new(10.0, 0.5),
            max_fraction: 1.0,
        };
        let mut first: Option<ProxyId> = None;
        phase.ray_cast(&input, |_, id| {
            first = Some(id);
            0.0
        });
        assert!(first.is_some());
    }

    #[test]
    fn metrics_are_exposed() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        for i in 0..16_u32 {
            let x = f64::from(i) * 3.0;
            phase.create_proxy(&aabb(x, 0.0, x + 1.0, 1.0), i);
        }
        assert!(phase.tree_height() >= 4);
        assert!(phase.tree_balance() <= 1);
        assert!(phase.tree_quality() >= 1.0);
    }

    #[test]
    fn shift_origin_preserves_pairing() {
        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let p1 = phase.create_proxy(&aabb(0.0, 0.0, 1.0, 1.0), 1);
        phase.create_proxy(&aabb(10.0, 0.0, 11.0, 1.0), 2);
        let _ = sweep(&mut phase);

        phase.shift_origin(Vec2::new(100.0, 100.0));
        // Post-shift coordinates: everything moved by (-100, -100). A move
        // expressed in shifted coordinates pairs as if nothing shifted.
        phase.move_proxy(
            p1,
            &aabb(-90.0, -100.0, -89.0, -99.0),
            Vec2::new(10.0, 0.0),
        );
        assert_eq!(sweep(&mut phase), vec![(1, 2)]);
    }

    /// Cross-check a few random churn rounds against a brute-force scan:
    /// each sweep must deliver exactly the overlapping fat-box pairs with at
    /// least one relinked endpoint.
    #[test]
    fn random_churn_matches_brute_force() {
        struct Rng(u64);
        impl Rng {
            fn next_u64(&mut self) -> u64 {
                let mut x = self.0;
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                self.0 = x;
                x
            }
            fn range(&mut self, lo: f64, hi: f64) -> f64 {
                let unit = (self.next_u64() >> 11) as f64 / (1_u64 << 53) as f64;
                lo + unit * (hi - lo)
            }
        }

        let mut rng = Rng(0x9e3779b97f4a7c15);
        let mut random_box = |rng: &mut Rng| {
            let x0 = rng.range(0.0, 80.0);
            let y0 = rng.range(0.0, 80.0);
            aabb(x0, y0, x0 + rng.range(1.0, 8.0), y0 + rng.range(1.0, 8.0))
        };

        let mut phase: BroadPhase<u32> = BroadPhase::new();
        let mut ids = Vec::new();
        for i in 0..40_u32 {
            ids.push(phase.create_proxy(&random_box(&mut rng), i));
        }

        // First sweep: everything just moved, so expect all overlaps.
        let all_overlaps = |phase: &BroadPhase<u32>, ids: &[ProxyId], moved: &[ProxyId]| {
            let mut expected = Vec::new();
            for (i, &a) in ids.iter().enumerate() {
                for &b in &ids[i + 1..] {
                    let either_moved = moved.contains(&a) || moved.contains(&b);
                    if either_moved && phase.fat_aabb(a).overlaps(&phase.fat_aabb(b)) {
                        expected.push((phase.user_data(a), phase.user_data(b)));
                    }
                }
            }
            expected.sort_unstable();
            expected
        };

        let expected = all_overlaps(&phase, &ids, &ids);
        let mut got = sweep(&mut phase);
        got.sort_unstable();
        assert_eq!(got, expected);

        // A few churn rounds: teleport a third of the proxies. Zero
        // displacement keeps the fat boxes tight so every teleport relinks.
        for round in 0..5 {
            let mut moved = Vec::new();
            for (i, &id) in ids.iter().enumerate() {
                if (i + round) % 3 == 0 {
                    // Reject destinations inside the stored box so every
                    // teleport re-links and lands in the move buffer.
                    let mut destination = random_box(&mut rng);
                    while phase.fat_aabb(id).contains(&destination) {
                        destination = random_box(&mut rng);
                    }
                    phase.move_proxy(id, &destination, Vec2::ZERO);
                    moved.push(id);
                }
            }
            let expected = all_overlaps(&phase, &ids, &moved);
            let mut got = sweep(&mut phase);
            got.sort_unstable();
            assert_eq!(got, expected, "round {round}");
        }
    }
}
