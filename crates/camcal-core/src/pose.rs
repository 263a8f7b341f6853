//! Rotation and rigid-transform helpers.
//!
//! Quaternions are plain `[w, x, y, z]` arrays so they can be read from and
//! written to robot logs and record stores without conversion.

use crate::CalibErr;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

const QUAT_NORM_EPS: f64 = 1e-12;

/// Rigid transform `p' = R p + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Build from an axis-angle vector and a translation.
    pub fn from_rodrigues(rvec: &Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(rodrigues(rvec), translation)
    }

    pub fn from_homogeneous(m: &Matrix4<f64>) -> Self {
        let (rotation, translation) = split_homogeneous(m);
        Self::new(rotation, translation)
    }

    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        compose_homogeneous(&self.rotation, &self.translation)
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }

    /// Inverse of a rigid transform (uses `Rᵀ`).
    pub fn inverse(&self) -> Pose {
        let rt = self.rotation.transpose();
        Pose::new(rt, -(rt * self.translation))
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    pub fn quaternion(&self) -> [f64; 4] {
        rotation_to_quaternion(&self.rotation)
    }

    pub fn rodrigues(&self) -> Vector3<f64> {
        rotation_to_rodrigues(&self.rotation)
    }
}

/// Normalized quaternion `[w, x, y, z]` to rotation matrix.
pub fn quaternion_to_rotation(q: [f64; 4]) -> Result<Matrix3<f64>, CalibErr> {
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < QUAT_NORM_EPS {
        return Err(CalibErr::InvalidQuaternion);
    }
    let [w, x, y, z] = q.map(|v| v / norm);

    Ok(Matrix3::new(
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y - w * z),
        2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),
        2.0 * (y * z + w * x),
        1.0 - 2.0 * (x * x + y * y),
    ))
}

/// Rotation matrix to unit quaternion `[w, x, y, z]` with `w >= 0`.
///
/// Shepperd's method: pick the largest of `trace, m00, m11, m22` as the pivot so
/// the square root argument never approaches zero.
pub fn rotation_to_quaternion(r: &Matrix3<f64>) -> [f64; 4] {
    let (m00, m11, m22) = (r[(0, 0)], r[(1, 1)], r[(2, 2)]);
    let trace = m00 + m11 + m22;

    let q = if trace > m00 && trace > m11 && trace > m22 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [
            0.25 * s,
            (r[(2, 1)] - r[(1, 2)]) / s,
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(1, 0)] - r[(0, 1)]) / s,
        ]
    } else if m00 >= m11 && m00 >= m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        [
            (r[(2, 1)] - r[(1, 2)]) / s,
            0.25 * s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
        ]
    } else if m11 >= m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        [
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            0.25 * s,
            (r[(1, 2)] + r[(2, 1)]) / s,
        ]
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        [
            (r[(1, 0)] - r[(0, 1)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
            (r[(1, 2)] + r[(2, 1)]) / s,
            0.25 * s,
        ]
    };

    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    let sign = if q[0] < 0.0 { -1.0 } else { 1.0 };
    q.map(|v| sign * v / norm)
}

/// Block matrix `[[R, t], [0, 0, 0, 1]]`.
pub fn compose_homogeneous(r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
    m
}

pub fn split_homogeneous(m: &Matrix4<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    (
        m.fixed_view::<3, 3>(0, 0).into_owned(),
        m.fixed_view::<3, 1>(0, 3).into_owned(),
    )
}

/// Inverse of a rigid homogeneous transform.
pub fn invert_homogeneous(m: &Matrix4<f64>) -> Matrix4<f64> {
    Pose::from_homogeneous(m).inverse().to_homogeneous()
}

/// Axis-angle vector to rotation matrix.
pub fn rodrigues(rvec: &Vector3<f64>) -> Matrix3<f64> {
    let theta = rvec.norm();
    if theta < 1e-12 {
        // First-order expansion keeps the map smooth around zero.
        return Matrix3::identity() + skew(rvec);
    }
    let k = rvec / theta;
    let kx = skew(&k);
    Matrix3::identity() + kx * theta.sin() + kx * kx * (1.0 - theta.cos())
}

/// Rotation matrix to axis-angle vector, angle in `[0, π]`.
pub fn rotation_to_rodrigues(r: &Matrix3<f64>) -> Vector3<f64> {
    let [w, x, y, z] = rotation_to_quaternion(r);
    let v = Vector3::new(x, y, z);
    let s = v.norm();
    if s < 1e-15 {
        return Vector3::zeros();
    }
    let angle = 2.0 * s.atan2(w);
    v * (angle / s)
}

/// Cross-product matrix `[v]ₓ`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Nearest proper rotation to `m` in the Frobenius sense.
pub fn project_to_so3(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    Some(r)
}

/// Rotation angle of `r` in degrees, computed from the trace.
pub fn rotation_angle_deg(r: &Matrix3<f64>) -> f64 {
    let c = ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    c.acos().to_degrees()
}
