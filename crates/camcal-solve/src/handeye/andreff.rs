//! Andreff: linear rotation from the Kronecker form of `R_A R_X = R_X R_B`.

use super::{HandEyeSolver, MotionPair};
use camcal_core::{project_to_so3, CalibErr};
use nalgebra::{Matrix3, SMatrix, SymmetricEigen};

type Matrix9 = SMatrix<f64, 9, 9>;

#[derive(Clone, Copy, Debug, Default)]
pub struct Andreff;

fn kron3(a: &Matrix3<f64>, b: &Matrix3<f64>) -> Matrix9 {
    let mut out = Matrix9::zeros();
    for i in 0..3 {
        for j in 0..3 {
            out.fixed_view_mut::<3, 3>(3 * i, 3 * j)
                .copy_from(&(b * a[(i, j)]));
        }
    }
    out
}

impl HandEyeSolver for Andreff {
    fn solve_rotation(&self, motions: &[MotionPair]) -> Result<Matrix3<f64>, CalibErr> {
        let singular = CalibErr::SingularMatrix {
            context: "andreff rotation",
        };
        let eye = Matrix3::identity();
        let mut acc = Matrix9::zeros();
        for motion in motions {
            // Column-stacked vec: vec(A X) = (I ⊗ A) vec(X), vec(X B) = (Bᵀ ⊗ I) vec(X).
            let k = kron3(&eye, &motion.a.rotation) - kron3(&motion.b.rotation.transpose(), &eye);
            acc += k.transpose() * k;
        }
        let eig = SymmetricEigen::new(acc);
        let v = eig.eigenvectors.column(eig.eigenvalues.imin());
        let r = Matrix3::from_column_slice(v.as_slice());

        let det = r.determinant();
        if det.abs() < 1e-12 {
            return Err(singular);
        }
        project_to_so3(&(r / det.cbrt())).ok_or(singular)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kronecker_vec_identity() {
        let a = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0);
        let x = Matrix3::new(0.5, -1.0, 2.0, 0.0, 3.0, 1.0, -2.0, 1.5, 0.25);
        let lhs = a * x;
        let rhs = kron3(&Matrix3::identity(), &a) * nalgebra::SVector::<f64, 9>::from_column_slice(x.as_slice());
        for (l, r) in lhs.as_slice().iter().zip(rhs.iter()) {
            assert!((l - r).abs() < 1e-12);
        }
    }
}
