//! Small fixed-size vectors for panel geometry and induced velocities.
//!
//! `Vec2` serves the airfoil engine (chord-plane coordinates), `Vec3` the
//! wing and plane engines (body axes: x downstream, y to starboard, z up).

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// 2D vector in the airfoil chord plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// Chordwise component
    pub x: f64,
    /// Normal component
    pub y: f64,
}

impl Vec2 {
    /// Creates a new vector.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Unit vector at `angle` radians from the x axis.
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Euclidean length.
    #[inline(always)]
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Dot product.
    #[inline(always)]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product.
    #[inline(always)]
    pub fn cross(&self, other: &Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Normalized vector (unit length).
    pub fn normalized(&self) -> Option<Self> {
        let mag = self.magnitude();
        if mag < 1e-15 {
            None
        } else {
            Some(Self::new(self.x / mag, self.y / mag))
        }
    }

    /// Rotated by +90 degrees.
    #[inline(always)]
    pub fn perp(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rotate around `center` by `theta` radians, counterclockwise.
    pub fn rotate_about(&self, center: &Self, theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Self::new(center.x + c * dx - s * dy, center.y + s * dx + c * dy)
    }

    /// Distance between two points.
    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).magnitude()
    }

    /// Linear interpolation between two points.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Angle of the vector from the x axis, in radians.
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// 3D vector for wing and plane geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// Chordwise, aft positive
    pub x: f64,
    /// Spanwise, right positive
    pub y: f64,
    /// Vertical, up positive
    pub z: f64,
}

impl Vec3 {
    /// Creates a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Magnitude (length) of the vector.
    #[inline(always)]
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Squared magnitude (avoids sqrt, cheaper for comparisons).
    #[inline(always)]
    pub fn magnitude_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Normalized vector (unit length).
    pub fn normalized(&self) -> Option<Self> {
        let mag = self.magnitude();
        if mag < 1e-15 {
            None
        } else {
            let inv = 1.0 / mag;
            Some(Self::new(self.x * inv, self.y * inv, self.z * inv))
        }
    }

    /// Dot product.
    #[inline(always)]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product: self × other
    #[inline(always)]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Rodrigues rotation around an axis through `origin`.
    /// v_rot = v*cosθ + (k×v)*sinθ + k*(k·v)*(1-cosθ)
    pub fn rotate_around(&self, origin: &Self, axis: &Self, theta: f64) -> Option<Self> {
        let k = axis.normalized()?;
        let v = *self - *origin;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let rotated = v * cos_theta + k.cross(&v) * sin_theta + k * (k.dot(&v) * (1.0 - cos_theta));
        Some(*origin + rotated)
    }

    /// Mirror image through the xz plane (y → -y).
    #[inline(always)]
    pub fn mirror_y(&self) -> Self {
        Self::new(self.x, -self.y, self.z)
    }

    /// Mirror image through the horizontal plane z = `height`.
    #[inline(always)]
    pub fn mirror_z(&self, height: f64) -> Self {
        Self::new(self.x, self.y, 2.0 * height - self.z)
    }

    /// Distance to another vector.
    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).magnitude()
    }

    /// Linear interpolation between two points.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        *self + (*other - *self) * t
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Components as an array.
    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Componentwise arithmetic and scalar scaling.
macro_rules! impl_ops {
    ($t:ident { $($f:ident),+ }) => {
        impl Add for $t {
            type Output = $t;
            #[inline(always)]
            fn add(self, rhs: $t) -> $t {
                $t { $($f: self.$f + rhs.$f),+ }
            }
        }

        impl Sub for $t {
            type Output = $t;
            #[inline(always)]
            fn sub(self, rhs: $t) -> $t {
                $t { $($f: self.$f - rhs.$f),+ }
            }
        }

        impl Mul<f64> for $t {
            type Output = $t;
            #[inline(always)]
            fn mul(self, rhs: f64) -> $t {
                $t { $($f: self.$f * rhs),+ }
            }
        }

        impl Neg for $t {
            type Output = $t;
            #[inline(always)]
            fn neg(self) -> $t {
                $t { $($f: -self.$f),+ }
            }
        }

        impl AddAssign for $t {
            #[inline(always)]
            fn add_assign(&mut self, rhs: $t) {
                $(self.$f += rhs.$f;)+
            }
        }

        impl SubAssign for $t {
            #[inline(always)]
            fn sub_assign(&mut self, rhs: $t) {
                $(self.$f -= rhs.$f;)+
            }
        }
    };
}

impl_ops!(Vec2 { x, y });
impl_ops!(Vec3 { x, y, z });

/// Body-axis unit vectors.
pub mod directions {
    use super::Vec3;

    /// Chordwise
    pub const X: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };
    /// Spanwise
    pub const Y: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };
    /// Vertical
    pub const Z: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 1.0 };
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts;

    #[test]
    fn test_vec3_magnitude() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(v.magnitude(), 5.0);
    }

    #[test]
    fn test_vec3_normalize() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        let normalized = v.normalized().unwrap();
        assert_relative_eq!(normalized.magnitude(), 1.0);
        assert_relative_eq!(normalized.x, 0.6);
        assert_relative_eq!(normalized.y, 0.8);
        assert!(Vec3::zero().normalized().is_none());
    }

    #[test]
    fn test_vec3_cross() {
        let c = directions::X.cross(&directions::Y);
        assert_relative_eq!(c.x, 0.0);
        assert_relative_eq!(c.y, 0.0);
        assert_relative_eq!(c.z, 1.0);
    }

    #[test]
    fn test_vec3_rotate_around() {
        let v = Vec3::new(2.0, 0.0, 0.0);
        let r = v
            .rotate_around(&Vec3::new(1.0, 0.0, 0.0), &directions::Z, consts::FRAC_PI_2)
            .unwrap();
        assert_relative_eq!(r.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mirrors() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(p.mirror_y(), Vec3::new(1.0, -2.0, 3.0));
        assert_eq!(p.mirror_z(-1.0), Vec3::new(1.0, 2.0, -5.0));
    }

    #[test]
    fn test_vec2_rotate_and_perp() {
        let p = Vec2::new(1.0, 0.0).rotate_about(&Vec2::zero(), consts::FRAC_PI_2);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
        assert_eq!(Vec2::new(1.0, 0.0).perp(), Vec2::new(0.0, 1.0));
        assert_relative_eq!(Vec2::new(1.0, 0.0).cross(&Vec2::new(0.0, 1.0)), 1.0);
    }
}
