// Copyright 2026 the Overstory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned bounding boxes and the slab ray test.

use kurbo::{Point, Vec2};

/// Ray-cast input. The ray extends from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayCastInput {
    /// Segment start.
    pub p1: Point,
    /// Segment end (at fraction 1).
    pub p2: Point,
    /// Fraction of the segment to consider, in `[0, ..]`.
    pub max_fraction: f64,
}

/// Ray-cast output. The hit lies at `p1 + fraction * (p2 - p1)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayCastOutput {
    /// Outward unit normal of the box face crossed at entry.
    pub normal: Vec2,
    /// Entry parameter along the segment.
    pub fraction: f64,
}

/// An axis-aligned bounding box.
///
/// Valid boxes have `lower.x <= upper.x` and `lower.y <= upper.y`. Operations
/// assume finite coordinates (no NaNs); debug builds may assert.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub lower: Point,
    /// Maximum corner.
    pub upper: Point,
}

impl Aabb {
    /// Create a box from its corners.
    pub const fn new(lower: Point, upper: Point) -> Self {
        Self { lower, upper }
    }

    /// Whether the bounds are sorted and finite.
    pub fn is_valid(&self) -> bool {
        self.lower.x <= self.upper.x
            && self.lower.y <= self.upper.y
            && self.lower.x.is_finite()
            && self.lower.y.is_finite()
            && self.upper.x.is_finite()
            && self.upper.y.is_finite()
    }

    /// Center of the box.
    pub fn center(&self) -> Point {
        self.lower.midpoint(self.upper)
    }

    /// Half-widths of the box.
    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    /// Perimeter length.
    ///
    /// This is the cost surrogate used for tree construction: monotone in the
    /// same direction as area for boxes, and cheaper to compute.
    pub fn perimeter(&self) -> f64 {
        let wx = self.upper.x - self.lower.x;
        let wy = self.upper.y - self.lower.y;
        2.0 * (wx + wy)
    }

    /// The smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lower: Point::new(
                self.lower.x.min(other.lower.x),
                self.lower.y.min(other.lower.y),
            ),
            upper: Point::new(
                self.upper.x.max(other.upper.x),
                self.upper.y.max(other.upper.y),
            ),
        }
    }

    /// Whether `self` contains `inner`, closed on both bounds.
    pub fn contains(&self, inner: &Self) -> bool {
        self.lower.x <= inner.lower.x
            && self.lower.y <= inner.lower.y
            && inner.upper.x <= self.upper.x
            && inner.upper.y <= self.upper.y
    }

    /// Whether two boxes overlap. Shared edges count as overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        other.lower.x <= self.upper.x
            && self.lower.x <= other.upper.x
            && other.lower.y <= self.upper.y
            && self.lower.y <= other.upper.y
    }

    /// The box grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        let r = Vec2::new(margin, margin);
        Self {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Cast a ray against the box using the slab method.
    ///
    /// Returns the smallest non-negative entry parameter within
    /// `[0, input.max_fraction]` and the outward normal of the face crossed,
    /// or `None` if the clipped segment misses the box. A ray starting inside
    /// the box reports no hit.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = f64::NEG_INFINITY;
        let mut tmax = f64::INFINITY;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let mut normal = Vec2::ZERO;

        let slabs = [
            (p.x, d.x, self.lower.x, self.upper.x, Vec2::new(1.0, 0.0)),
            (p.y, d.y, self.lower.y, self.upper.y, Vec2::new(0.0, 1.0)),
        ];
        for (pi, di, lo, hi, axis) in slabs {
            if di.abs() < f64::EPSILON {
                // Parallel to this slab.
                if pi < lo || hi < pi {
                    return None;
                }
            } else {
                let inv_d = 1.0 / di;
                let mut t1 = (lo - pi) * inv_d;
                let mut t2 = (hi - pi) * inv_d;
                let mut sign = -1.0;
                if t1 > t2 {
                    core::mem::swap(&mut t1, &mut t2);
                    sign = 1.0;
                }
                // Push the entry up; the latest entry axis carries the normal.
                if t1 > tmin {
                    normal = axis * sign;
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }
        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}
