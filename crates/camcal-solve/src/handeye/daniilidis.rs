//! Daniilidis: rotation and translation together from dual quaternions.
//!
//! Each motion contributes six rows of a linear system in the 8-vector
//! `(q, q')` of the unknown dual quaternion. The solution lies in the span of
//! the two right singular vectors with the smallest singular values; the unit
//! norm and `qᵀq' = 0` constraints fix the two coefficients.

use super::{quat_conj, quat_mul, HandEyeSolver, MotionPair};
use camcal_core::pose::skew;
use camcal_core::{quaternion_to_rotation, CalibErr, Pose};
use nalgebra::{DMatrix, Matrix3, Vector3, Vector4};

#[derive(Clone, Copy, Debug, Default)]
pub struct Daniilidis;

/// Real part `q` and dual part `q' = ½ (0, t) ⊗ q` of a rigid transform.
fn dual_quaternion(pose: &Pose) -> ([f64; 4], [f64; 4]) {
    let q = pose.quaternion();
    let t = pose.translation;
    let qd = quat_mul([0.0, t.x, t.y, t.z], q).map(|v| 0.5 * v);
    (q, qd)
}

fn vec_part(q: &[f64; 4]) -> Vector3<f64> {
    Vector3::new(q[1], q[2], q[3])
}

fn solve_dual(motions: &[MotionPair]) -> Result<Pose, CalibErr> {
    let singular = || CalibErr::SingularMatrix {
        context: "daniilidis null space",
    };
    let rows = (6 * motions.len()).max(8);
    let mut t = DMatrix::<f64>::zeros(rows, 8);
    for (k, motion) in motions.iter().enumerate() {
        let (qa, qa_d) = dual_quaternion(&motion.a);
        let (qb, qb_d) = dual_quaternion(&motion.b);
        let (a, a_d) = (vec_part(&qa), vec_part(&qa_d));
        let (b, b_d) = (vec_part(&qb), vec_part(&qb_d));
        let r = 6 * k;

        t.fixed_view_mut::<3, 1>(r, 0).copy_from(&(a - b));
        t.fixed_view_mut::<3, 3>(r, 1).copy_from(&skew(&(a + b)));
        t.fixed_view_mut::<3, 1>(r + 3, 0).copy_from(&(a_d - b_d));
        t.fixed_view_mut::<3, 3>(r + 3, 1).copy_from(&skew(&(a_d + b_d)));
        t.fixed_view_mut::<3, 1>(r + 3, 4).copy_from(&(a - b));
        t.fixed_view_mut::<3, 3>(r + 3, 5).copy_from(&skew(&(a + b)));
    }

    let svd = t.svd(false, true);
    let v_t = svd.v_t.ok_or_else(singular)?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
    let (v1, v2) = (v_t.row(order[1]), v_t.row(order[0]));

    let u1 = Vector4::new(v1[0], v1[1], v1[2], v1[3]);
    let d1 = Vector4::new(v1[4], v1[5], v1[6], v1[7]);
    let u2 = Vector4::new(v2[0], v2[1], v2[2], v2[3]);
    let d2 = Vector4::new(v2[4], v2[5], v2[6], v2[7]);

    // s² u1ᵀd1 + s (u1ᵀd2 + u2ᵀd1) + u2ᵀd2 = 0 with s = λ1 / λ2.
    let a = u1.dot(&d1);
    let b = u1.dot(&d2) + u2.dot(&d1);
    let c = u2.dot(&d2);
    let roots: Vec<f64> = if a.abs() < 1e-12 {
        if b.abs() < 1e-12 {
            return Err(singular());
        }
        vec![-c / b]
    } else {
        let disc = (b * b - 4.0 * a * c).max(0.0).sqrt();
        vec![(-b + disc) / (2.0 * a), (-b - disc) / (2.0 * a)]
    };

    // The root giving the larger ‖λ1 u1 + λ2 u2‖² / λ2² keeps λ2 real.
    let norm_of = |s: f64| s * s * u1.dot(&u1) + 2.0 * s * u1.dot(&u2) + u2.dot(&u2);
    let s = roots
        .into_iter()
        .max_by(|x, y| norm_of(*x).total_cmp(&norm_of(*y)))
        .ok_or_else(singular)?;
    let val = norm_of(s);
    if val <= 0.0 || !val.is_finite() {
        return Err(CalibErr::SingularMatrix {
            context: "daniilidis scale",
        });
    }
    let l2 = 1.0 / val.sqrt();
    let l1 = s * l2;

    let q = u1 * l1 + u2 * l2;
    let qd = d1 * l1 + d2 * l2;
    let q = [q[0], q[1], q[2], q[3]];
    let qd = [qd[0], qd[1], qd[2], qd[3]];

    let rotation: Matrix3<f64> = quaternion_to_rotation(q)?;
    let tq = quat_mul(qd, quat_conj(q));
    let translation = Vector3::new(tq[1], tq[2], tq[3]) * 2.0;
    Ok(Pose::new(rotation, translation))
}

impl HandEyeSolver for Daniilidis {
    fn solve_rotation(&self, motions: &[MotionPair]) -> Result<Matrix3<f64>, CalibErr> {
        Ok(solve_dual(motions)?.rotation)
    }

    fn solve(&self, motions: &[MotionPair]) -> Result<Pose, CalibErr> {
        solve_dual(motions)
    }
}
