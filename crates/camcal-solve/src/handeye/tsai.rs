//! Tsai–Lenz with modified Rodrigues vectors.

use super::{least_squares, HandEyeSolver, MotionPair};
use camcal_core::pose::skew;
use camcal_core::{CalibErr, Pose};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

#[derive(Clone, Copy, Debug, Default)]
pub struct Tsai;

/// `2 sin(θ/2) n`, the vector part of the unit quaternion doubled.
fn modified_rodrigues(pose: &Pose) -> Vector3<f64> {
    let [_, x, y, z] = pose.quaternion();
    Vector3::new(x, y, z) * 2.0
}

impl HandEyeSolver for Tsai {
    fn solve_rotation(&self, motions: &[MotionPair]) -> Result<Matrix3<f64>, CalibErr> {
        let mut m = DMatrix::<f64>::zeros(3 * motions.len(), 3);
        let mut rhs = DVector::<f64>::zeros(3 * motions.len());
        for (k, motion) in motions.iter().enumerate() {
            let pa = modified_rodrigues(&motion.a);
            let pb = modified_rodrigues(&motion.b);
            m.fixed_view_mut::<3, 3>(3 * k, 0).copy_from(&skew(&(pa + pb)));
            rhs.fixed_rows_mut::<3>(3 * k).copy_from(&(pb - pa));
        }
        let p = least_squares(m, &rhs, "tsai rotation")?;
        let p_prime = Vector3::new(p[0], p[1], p[2]);

        let px = p_prime * (2.0 / (1.0 + p_prime.norm_squared()).sqrt());
        let n2 = px.norm_squared();
        Ok(Matrix3::identity() * (1.0 - 0.5 * n2)
            + (px * px.transpose() + skew(&px) * (4.0 - n2).max(0.0).sqrt()) * 0.5)
    }
}
