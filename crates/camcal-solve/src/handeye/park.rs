//! Park–Martin: rotation from the correlation of log-map vectors.

use super::{HandEyeSolver, MotionPair};
use camcal_core::pose::rotation_to_rodrigues;
use camcal_core::{project_to_so3, CalibErr};
use nalgebra::{Matrix3, SymmetricEigen};

#[derive(Clone, Copy, Debug, Default)]
pub struct Park;

impl HandEyeSolver for Park {
    fn solve_rotation(&self, motions: &[MotionPair]) -> Result<Matrix3<f64>, CalibErr> {
        let singular = CalibErr::SingularMatrix {
            context: "park rotation",
        };
        let mut m = Matrix3::<f64>::zeros();
        for motion in motions {
            let alpha = rotation_to_rodrigues(&motion.a.rotation);
            let beta = rotation_to_rodrigues(&motion.b.rotation);
            m += beta * alpha.transpose();
        }

        // (MᵀM)^{-1/2} Mᵀ
        let eig = SymmetricEigen::new(m.transpose() * m);
        let max_ev = eig.eigenvalues.max();
        if max_ev <= 0.0 || eig.eigenvalues.min() <= max_ev * 1e-12 {
            return Err(singular);
        }
        let inv_sqrt = eig.eigenvalues.map(|l| 1.0 / l.sqrt());
        let w = eig.eigenvectors * Matrix3::from_diagonal(&inv_sqrt) * eig.eigenvectors.transpose();
        project_to_so3(&(w * m.transpose())).ok_or(singular)
    }
}
