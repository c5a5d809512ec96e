//! Scalar-last quaternion

use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Largest accepted deviation from unit norm for a raw sample
pub const UNIT_NORM_TOLERANCE: f64 = 0.05;

/// Rotation quaternion stored as (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// No rotation
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// From `[x, y, z, w]`
    pub const fn from_array(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    pub const fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Rotation of `angle` radians about the z axis
    pub fn about_z(angle: f64) -> Self {
        let (s, c) = (angle / 2.0).sin_cos();
        Self::new(0.0, 0.0, s, c)
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Finite and close enough to unit length to be a real attitude
    pub fn is_valid_sample(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
            && (self.norm() - 1.0).abs() < UNIT_NORM_TOLERANCE
    }

    /// Unit-length copy, `None` for a zero or non-finite quaternion
    pub fn normalized(&self) -> Option<Self> {
        let norm = self.norm();
        if !norm.is_finite() || norm < 1e-10 {
            return None;
        }
        Some(Self::new(
            self.x / norm,
            self.y / norm,
            self.z / norm,
            self.w / norm,
        ))
    }

    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector by this (unit) quaternion
    pub fn rotate(&self, v: [f64; 3]) -> [f64; 3] {
        // v' = v + w*t + u × t, with t = 2 (u × v)
        let u = [self.x, self.y, self.z];
        let t = cross(u, v).map(|c| 2.0 * c);
        let ut = cross(u, t);
        [
            v[0] + self.w * t[0] + ut[0],
            v[1] + self.w * t[1] + ut[1],
            v[2] + self.w * t[2] + ut[2],
        ]
    }
}

/// Hamilton product: `a * b` applies `b` first, then `a`
impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, b: Quaternion) -> Quaternion {
        let a = self;
        Quaternion::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn assert_vec_eq(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert_relative_eq!(a[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_identity_rotation() {
        let v = [0.3, -1.2, 4.0];
        assert_vec_eq(Quaternion::identity().rotate(v), v);
    }

    #[test]
    fn test_about_z() {
        let q = Quaternion::about_z(FRAC_PI_2);
        assert_vec_eq(q.rotate([1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
        assert_vec_eq(q.rotate([0.0, 0.0, 1.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_product_composes_rotations() {
        let a = Quaternion::about_z(0.4);
        let b = Quaternion::new(0.3, 0.1, -0.2, 0.9).normalized().unwrap();
        let v = [1.0, 2.0, 3.0];
        assert_vec_eq((a * b).rotate(v), a.rotate(b.rotate(v)));
        assert_vec_eq((b * b.conjugate()).rotate(v), v);
    }

    #[test]
    fn test_sample_validity() {
        assert!(Quaternion::identity().is_valid_sample());
        assert!(Quaternion::new(0.0, 0.0, 0.0, 1.03).is_valid_sample());
        assert!(!Quaternion::new(0.0, 0.0, 0.0, 0.5).is_valid_sample());
        assert!(!Quaternion::new(f64::NAN, 0.0, 0.0, 1.0).is_valid_sample());
        assert!(!Quaternion::new(0.0, 0.0, 0.0, 0.0).is_valid_sample());
        assert!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized().is_none());
    }
}
