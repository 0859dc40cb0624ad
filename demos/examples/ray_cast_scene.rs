// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ray casts against a small scene.
//!
//! Build a scene of boxes and cast a fan of rays from the origin, printing
//! the closest hit for each.
//!
//! Run:
//! - `cargo run -p overstory_demos --example ray_cast_scene`

use kurbo::Point;
use overstory_broad_phase::{Aabb, BroadPhase, RayCastInput};

fn main() {
    let mut phase: BroadPhase<&str> = BroadPhase::new();

    let scene = [
        ("east wall", Aabb::new(Point::new(8.0, -4.0), Point::new(9.0, 4.0))),
        ("north slab", Aabb::new(Point::new(-3.0, 6.0), Point::new(3.0, 7.0))),
        ("pillar", Aabb::new(Point::new(3.0, 2.0), Point::new(4.0, 3.0))),
    ];
    for (name, bounds) in scene {
        phase.create_proxy(&bounds, name);
    }
    phase.update_pairs(|_, _| {});

    // A fan of rays from the origin.
    let targets = [
        Point::new(12.0, 0.0),
        Point::new(12.0, 9.0),
        Point::new(0.0, 12.0),
        Point::new(-12.0, 0.0),
    ];
    for target in targets {
        let input = RayCastInput {
            p1: Point::new(0.0, 0.0),
            p2: target,
            max_fraction: 1.0,
        };
        let mut closest: Option<(&str, f64)> = None;
        phase.ray_cast(&input, |sub, id| {
            match phase.fat_aabb(id).ray_cast(sub) {
                Some(hit) => {
                    if closest.is_none_or(|(_, f)| hit.fraction < f) {
                        closest = Some((phase.user_data(id), hit.fraction));
                    }
                    // Clip the ray so farther proxies get culled.
                    hit.fraction
                }
                None => sub.max_fraction,
            }
        });
        match closest {
            Some((name, fraction)) => {
                let hit = input.p1 + (input.p2 - input.p1) * fraction;
                println!(
                    "ray to ({:.0}, {:.0}) hits {} at ({:.2}, {:.2})",
                    target.x, target.y, name, hit.x, hit.y
                );
            }
            None => println!("ray to ({:.0}, {:.0}) hits nothing", target.x, target.y),
        }
    }
}
