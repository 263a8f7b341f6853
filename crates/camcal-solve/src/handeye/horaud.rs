//! Horaud–Dornaika: rotation quaternion as a null vector of `L(q_A) − R(q_B)`.

use super::{HandEyeSolver, MotionPair};
use camcal_core::{quaternion_to_rotation, CalibErr};
use nalgebra::{Matrix3, Matrix4, SymmetricEigen};

#[derive(Clone, Copy, Debug, Default)]
pub struct Horaud;

/// `q ⊗ p = L(q) p`.
fn left_matrix(q: [f64; 4]) -> Matrix4<f64> {
    let [w, x, y, z] = q;
    Matrix4::new(
        w, -x, -y, -z, //
        x, w, -z, y, //
        y, z, w, -x, //
        z, -y, x, w,
    )
}

/// `p ⊗ q = R(q) p`.
fn right_matrix(q: [f64; 4]) -> Matrix4<f64> {
    let [w, x, y, z] = q;
    Matrix4::new(
        w, -x, -y, -z, //
        x, w, z, -y, //
        y, -z, w, x, //
        z, y, -x, w,
    )
}

impl HandEyeSolver for Horaud {
    fn solve_rotation(&self, motions: &[MotionPair]) -> Result<Matrix3<f64>, CalibErr> {
        let mut acc = Matrix4::<f64>::zeros();
        for motion in motions {
            let m = left_matrix(motion.a.quaternion()) - right_matrix(motion.b.quaternion());
            acc += m.transpose() * m;
        }
        let eig = SymmetricEigen::new(acc);
        let k = eig.eigenvalues.imin();
        let q = eig.eigenvectors.column(k);
        quaternion_to_rotation([q[0], q[1], q[2], q[3]])
    }
}
