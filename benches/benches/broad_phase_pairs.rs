// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Point, Vec2};
use overstory_broad_phase::{Aabb, BroadPhase};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn aabb_from_xywh(x: f64, y: f64, w: f64, h: f64) -> Aabb {
    Aabb::new(Point::new(x, y), Point::new(x + w, y + h))
}

fn gen_grid_boxes(n: usize, cell: f64) -> Vec<Aabb> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            out.push(aabb_from_xywh(x0, y0, cell * 0.9, cell * 0.9));
        }
    }
    out
}

fn gen_clustered_boxes(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<Aabb> {
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut centers = Vec::with_capacity(n_clusters);
    for _ in 0..n_clusters {
        centers.push((rng.next_f64() * 2000.0, rng.next_f64() * 2000.0));
    }
    for (cx, cy) in centers {
        for _ in 0..per_cluster {
            let dx = (rng.next_f64() - 0.5) * spread;
            let dy = (rng.next_f64() - 0.5) * spread;
            out.push(aabb_from_xywh(cx + dx, cy + dy, 12.0, 12.0));
        }
    }
    out
}

fn build_phase(boxes: &[Aabb]) -> (BroadPhase<u32>, Vec<i32>) {
    let mut phase = BroadPhase::new();
    let mut ids = Vec::with_capacity(boxes.len());
    for (i, b) in boxes.iter().enumerate() {
        ids.push(phase.create_proxy(b, i as u32));
    }
    (phase, ids)
}

fn bench_create_and_first_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_and_first_sweep");
    for &n in &[32usize, 64] {
        let boxes = gen_grid_boxes(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("grid_n{}", n), |b| {
            b.iter_batched(
                || boxes.clone(),
                |boxes| {
                    let (mut phase, _) = build_phase(&boxes);
                    let mut pairs = 0usize;
                    phase.update_pairs(|_, _| pairs += 1);
                    black_box(pairs);
                },
                BatchSize::SmallInput,
            )
        });
    }
    let boxes = gen_clustered_boxes(64, 32, 120.0);
    group.throughput(Throughput::Elements(boxes.len() as u64));
    group.bench_function("clustered", |b| {
        b.iter_batched(
            || boxes.clone(),
            |boxes| {
                let (mut phase, _) = build_phase(&boxes);
                let mut pairs = 0usize;
                phase.update_pairs(|_, _| pairs += 1);
                black_box(pairs);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_churn_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn_sweep");
    for &n in &[32usize, 64] {
        let boxes = gen_grid_boxes(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("move_tenth_n{}", n), |b| {
            let (mut phase, ids) = build_phase(&boxes);
            phase.update_pairs(|_, _| {});
            let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
            b.iter(|| {
                // Teleport a tenth of the population, then sweep.
                for &id in ids.iter().step_by(10) {
                    let x0 = rng.next_f64() * (n as f64) * 10.0;
                    let y0 = rng.next_f64() * (n as f64) * 10.0;
                    let target = aabb_from_xywh(x0, y0, 9.0, 9.0);
                    phase.move_proxy(id, &target, Vec2::ZERO);
                }
                let mut pairs = 0usize;
                phase.update_pairs(|_, _| pairs += 1);
                black_box(pairs);
            });
        });
    }
    group.finish();
}

fn bench_ray_cast(c: &mut Criterion) {
    let mut group = c.benchmark_group("ray_cast");
    let boxes = gen_grid_boxes(64, 10.0);
    let (mut phase, _) = build_phase(&boxes);
    phase.update_pairs(|_, _| {});
    group.bench_function("diagonal_closest_hit", |b| {
        let input = overstory_broad_phase::RayCastInput {
            p1: Point::new(-5.0, -5.0),
            p2: Point::new(645.0, 645.0),
            max_fraction: 1.0,
        };
        b.iter(|| {
            let mut best = f64::MAX;
            phase.ray_cast(&input, |sub, id| {
                match phase.fat_aabb(id).ray_cast(sub) {
                    Some(hit) => {
                        best = best.min(hit.fraction);
                        hit.fraction
                    }
                    None => sub.max_fraction,
                }
            });
            black_box(best);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_create_and_first_sweep,
    bench_churn_sweep,
    bench_ray_cast
);
criterion_main!(benches);
