// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![cfg(feature = "compare_rstar")]

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::Point;
use overstory_tree::{Aabb, DynamicTree, ScratchStack};

use rstar::primitives::Rectangle;
use rstar::{AABB, RTree};

fn gen_grid_boxes(n: usize, cell: f64) -> Vec<Aabb> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            out.push(Aabb::new(
                Point::new(x0, y0),
                Point::new(x0 + cell, y0 + cell),
            ));
        }
    }
    out
}

fn to_rstar_rects(v: &[Aabb]) -> Vec<Rectangle<[f64; 2]>> {
    v.iter()
        .map(|r| Rectangle::from_corners([r.lower.x, r.lower.y], [r.upper.x, r.upper.y]))
        .collect()
}

fn bench_tree_query_rtree_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_query_rtree_compare");
    for &n in &[64usize, 128] {
        let boxes = gen_grid_boxes(n, 10.0);
        let window = Aabb::new(Point::new(100.0, 100.0), Point::new(500.0, 500.0));
        group.throughput(Throughput::Elements((n * n) as u64));

        group.bench_function(format!("overstory_build_query_n{}", n), |b| {
            b.iter_batched(
                || boxes.clone(),
                |boxes| {
                    let mut tree: DynamicTree<u32> = DynamicTree::new();
                    for (i, r) in boxes.iter().enumerate() {
                        let _ = tree.create_proxy(r, i as u32);
                    }
                    let mut scratch = ScratchStack::new();
                    let mut hits = 0usize;
                    tree.query(&mut scratch, &window, |_| {
                        hits += 1;
                        true
                    });
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("rstar_build_query_bulk_n{}", n), |b| {
            b.iter_batched(
                || to_rstar_rects(&boxes),
                |rectangles| {
                    let tree = RTree::bulk_load(rectangles);
                    let envelope = AABB::from_corners(
                        [window.lower.x, window.lower.y],
                        [window.upper.x, window.upper.y],
                    );
                    let hits: usize = tree.locate_in_envelope_intersecting(&envelope).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tree_query_rtree_compare);
criterion_main!(benches);
