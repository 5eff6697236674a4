// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Matrix helpers for building reference frames
//!
//! All matrices are column-vector transforms: `m * p` applies `m` to `p`,
//! and `a * b` applies `b` first.

use crate::error::{Error, Result};
use nalgebra::{Matrix4, Point3, Vector3};

/// Planar rotation about +Z stored as its sine and cosine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation2 {
    pub sin: f64,
    pub cos: f64,
}

impl Rotation2 {
    pub fn from_angle(radians: f64) -> Self {
        Self {
            sin: radians.sin(),
            cos: radians.cos(),
        }
    }

    pub fn identity() -> Self {
        Self { sin: 0.0, cos: 1.0 }
    }

    /// Rotate (x, y) into the aligned frame
    #[inline]
    pub fn rotate(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.cos - y * self.sin, x * self.sin + y * self.cos)
    }

    /// Inverse of [`Rotation2::rotate`]
    #[inline]
    pub fn unrotate(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.cos + y * self.sin, -x * self.sin + y * self.cos)
    }

    #[inline]
    pub fn rotate_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let (x, y) = self.rotate(p.x, p.y);
        Point3::new(x, y, p.z)
    }

    #[inline]
    pub fn unrotate_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let (x, y) = self.unrotate(p.x, p.y);
        Point3::new(x, y, p.z)
    }

    /// 4x4 matrix form that takes aligned coordinates back to the source
    /// frame (the same mapping as `unrotate`)
    pub fn to_unrotate_matrix(&self) -> Matrix4<f64> {
        #[rustfmt::skip]
        let m = Matrix4::new(
            self.cos,  self.sin, 0.0, 0.0,
            -self.sin, self.cos, 0.0, 0.0,
            0.0,       0.0,      1.0, 0.0,
            0.0,       0.0,      0.0, 1.0,
        );
        m
    }
}

impl Default for Rotation2 {
    fn default() -> Self {
        Self::identity()
    }
}

/// Translation matrix
#[inline]
pub fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, y, z))
}

/// Non-uniform scale matrix
#[inline]
pub fn scaling(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_nonuniform_scaling(&Vector3::new(x, y, z))
}

/// Inverse of an affine transform
pub fn invert(m: &Matrix4<f64>) -> Result<Matrix4<f64>> {
    m.try_inverse()
        .ok_or_else(|| Error::SingularTransform(format!("{:?}", m.column(3))))
}

/// Translation component of an affine transform
#[inline]
pub fn translation_of(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotate_unrotate_inverse() {
        let r = Rotation2::from_angle(0.7);
        let (x, y) = r.rotate(3.0, -2.0);
        let (bx, by) = r.unrotate(x, y);
        assert_relative_eq!(bx, 3.0, epsilon = 1e-12);
        assert_relative_eq!(by, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unrotate_matrix_matches_unrotate() {
        let r = Rotation2::from_angle(1.1);
        let p = Point3::new(4.0, 1.0, 2.0);
        let a = r.to_unrotate_matrix().transform_point(&p);
        let b = r.unrotate_point(&p);
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn test_invert() {
        let m = translation(5.0, -3.0, 2.0);
        let inv = invert(&m).unwrap();
        assert_relative_eq!(translation_of(&inv), Vector3::new(-5.0, 3.0, -2.0));
        assert!(invert(&Matrix4::zeros()).is_err());
    }
}
