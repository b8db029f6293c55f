//! Induced velocities and potentials of the 3D singularity elements.
//!
//! Conventions: a vortex element of unit circulation follows its corner
//! order; a doublet panel of strength μ is equivalent to a vortex ring of
//! circulation `-μ` around its counterclockwise corners, and its potential
//! is `μ Ω / 4π` with `Ω` the solid angle seen from the point, positive on
//! the side the normal points to. Sources use `φ = -σ/4π ∫ dS / r`.

use std::f64::consts::PI;

use crate::vector::Vec3;

/// 4π
const FOUR_PI: f64 = 4.0 * PI;

/// Velocity of a straight vortex segment `a → b` of unit circulation.
///
/// The singular core is smoothed over `core` (m): the denominator carries
/// `(core |b - a|)²`, and points within `core` of an end see nothing.
pub fn segment_velocity(p: &Vec3, a: &Vec3, b: &Vec3, core: f64) -> Vec3 {
    let r0 = *b - *a;
    let l0_sq = r0.magnitude_sq();
    if l0_sq < 1e-24 {
        return Vec3::zero();
    }
    let r1 = *p - *a;
    let r2 = *p - *b;
    let (m1, m2) = (r1.magnitude(), r2.magnitude());
    if m1 < core || m2 < core || m1 < 1e-15 || m2 < 1e-15 {
        return Vec3::zero();
    }
    let cross = r1.cross(&r2);
    let den = cross.magnitude_sq() + core * core * l0_sq;
    if den < 1e-30 {
        return Vec3::zero();
    }
    let k = r0.dot(&(r1 * (1.0 / m1) - r2 * (1.0 / m2))) / (FOUR_PI * den);
    cross * k
}

/// Velocity of a vortex line from `a` to infinity along the unit vector `dir`.
pub fn semi_infinite_velocity(p: &Vec3, a: &Vec3, dir: &Vec3, core: f64) -> Vec3 {
    let r = *p - *a;
    let m = r.magnitude();
    if m < core.max(1e-15) {
        return Vec3::zero();
    }
    let cross = dir.cross(&r);
    let den = cross.magnitude_sq() + core * core;
    if den < 1e-30 {
        return Vec3::zero();
    }
    cross * ((1.0 + dir.dot(&r) / m) / (FOUR_PI * den))
}

/// Closed ring `c0 → c1 → c2 → c3 → c0` of unit circulation.
pub fn ring_velocity(p: &Vec3, corners: &[Vec3; 4], core: f64) -> Vec3 {
    (0..4).fold(Vec3::zero(), |acc, i| {
        acc + segment_velocity(p, &corners[i], &corners[(i + 1) % 4], core)
    })
}

/// Horseshoe of unit circulation: bound segment `a → b`, legs trailing to
/// infinity along `dir`.
pub fn horseshoe_velocity(p: &Vec3, a: &Vec3, b: &Vec3, dir: &Vec3, core: f64) -> Vec3 {
    segment_velocity(p, a, b, core) + semi_infinite_velocity(p, b, dir, core)
        - semi_infinite_velocity(p, a, dir, core)
}

/// Velocity of a doublet panel of unit strength.
pub fn doublet_velocity(p: &Vec3, corners: &[Vec3; 4], core: f64) -> Vec3 {
    -ring_velocity(p, corners, core)
}

/// Signed solid angle of triangle `abc` seen from `p` (Van Oosterom-Strackee).
fn triangle_solid_angle(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> f64 {
    let (r1, r2, r3) = (*a - *p, *b - *p, *c - *p);
    let (l1, l2, l3) = (r1.magnitude(), r2.magnitude(), r3.magnitude());
    let num = r1.dot(&r2.cross(&r3));
    let den = l1 * l2 * l3 + r1.dot(&r2) * l3 + r1.dot(&r3) * l2 + r2.dot(&r3) * l1;
    -2.0 * num.atan2(den)
}

/// Signed solid angle of a quadrilateral seen from `p`.
pub fn solid_angle(p: &Vec3, corners: &[Vec3; 4]) -> f64 {
    triangle_solid_angle(p, &corners[0], &corners[1], &corners[2])
        + triangle_solid_angle(p, &corners[0], &corners[2], &corners[3])
}

/// Potential of a doublet panel of unit strength. The value on the panel
/// itself is left to the caller (±1/2 depending on the side).
pub fn doublet_potential(p: &Vec3, corners: &[Vec3; 4]) -> f64 {
    solid_angle(p, corners) / FOUR_PI
}

/// Potential of a flat source panel of unit strength.
pub fn source_potential(p: &Vec3, corners: &[Vec3; 4], normal: &Vec3, center: &Vec3) -> f64 {
    let z = (*p - *center).dot(normal);
    let mut edges = 0.0;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let d = b - a;
        let len = d.magnitude();
        if len < 1e-15 {
            continue;
        }
        let ra = p.distance(&a);
        let rb = p.distance(&b);
        let den = ra + rb - len;
        if den < 1e-14 * (ra + rb) {
            // on the edge line, between its ends: the in-plane distance is zero
            continue;
        }
        let h = d.cross(&(*p - a)).dot(normal) / len;
        edges += h * ((ra + rb + len) / den).ln();
    }
    -(edges - z * solid_angle(p, corners)) / FOUR_PI
}

/// Velocity of a source panel of unit strength, by central differences of
/// its potential.
pub fn source_velocity(p: &Vec3, corners: &[Vec3; 4], normal: &Vec3, center: &Vec3, area: f64) -> Vec3 {
    let h = 1e-4 * (p.distance(center) + area.sqrt());
    let axes = [Vec3::new(h, 0.0, 0.0), Vec3::new(0.0, h, 0.0), Vec3::new(0.0, 0.0, h)];
    let g = axes.map(|e| {
        (source_potential(&(*p + e), corners, normal, center) - source_potential(&(*p - e), corners, normal, center))
            / (2.0 * h)
    });
    Vec3::new(g[0], g[1], g[2])
}

/// Mirror image of a point below the ground plane `z = ground`.
pub fn ground_image(p: &Vec3, ground: f64) -> Vec3 {
    p.mirror_z(ground)
}
