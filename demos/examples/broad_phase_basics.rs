// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad-phase basics.
//!
//! Create a few proxies, step a "ball" across a row of blocks, and print the
//! candidate pairs each sweep reports.
//!
//! Run:
//! - `cargo run -p overstory_demos --example broad_phase_basics`

use kurbo::{Point, Vec2};
use overstory_broad_phase::{Aabb, BroadPhase};

fn aabb(x0: f64, y0: f64, x1: f64, y1: f64) -> Aabb {
    Aabb::new(Point::new(x0, y0), Point::new(x1, y1))
}

fn main() {
    let mut phase: BroadPhase<&str> = BroadPhase::new();

    // A row of static blocks.
    let _a = phase.create_proxy(&aabb(2.0, 0.0, 3.0, 1.0), "block a");
    let _b = phase.create_proxy(&aabb(5.0, 0.0, 6.0, 1.0), "block b");
    let _c = phase.create_proxy(&aabb(8.0, 0.0, 9.0, 1.0), "block c");

    // A ball that will fly past them.
    let ball = phase.create_proxy(&aabb(0.0, 0.2, 0.6, 0.8), "ball");

    // First sweep: everything is new, so pairs among whatever overlaps.
    let mut step = 0;
    let sweep = |phase: &mut BroadPhase<&str>, step: i32| {
        let mut any = false;
        phase.update_pairs(|a, b| {
            println!("step {step}: candidate pair ({a}, {b})");
            any = true;
        });
        if !any {
            println!("step {step}: no candidates");
        }
    };
    sweep(&mut phase, step);

    // Fly the ball to the right in fixed steps.
    let mut x = 0.0;
    let velocity = 1.4;
    for _ in 0..7 {
        step += 1;
        x += velocity;
        let tight = aabb(x, 0.2, x + 0.6, 0.8);
        phase.move_proxy(ball, &tight, Vec2::new(velocity, 0.0));
        sweep(&mut phase, step);
    }

    println!(
        "tree height {}, balance {}, quality {:.2}",
        phase.tree_height(),
        phase.tree_balance(),
        phase.tree_quality()
    );
}
