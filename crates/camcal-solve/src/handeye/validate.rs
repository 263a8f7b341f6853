use super::{build_motions, MotionPair, MotionPairing};
use camcal_core::pose::rotation_angle_deg;
use camcal_core::{CalibErr, Pose};
use serde::{Deserialize, Serialize};

/// Closed-loop `A X` versus `X B` disagreement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandEyeResidual {
    /// `‖θ‖₂ / n` over the per-motion angles, in degrees.
    pub rotation_error_deg: f64,
    /// Mean translation residual, in the input length unit.
    pub translation_error_mm: f64,
}

/// Residuals of `x` over captures paired with `pairing`.
pub fn validate(
    gripper_poses: &[Pose],
    board_poses: &[Pose],
    x: &Pose,
    pairing: MotionPairing,
) -> Result<HandEyeResidual, CalibErr> {
    let motions = build_motions(gripper_poses, board_poses, pairing)?;
    Ok(validate_motions(&motions, x))
}

/// Residuals of `x` over precomputed motions.
///
/// A motion whose `R(AX)` cannot be inverted is left out of the angle term.
pub fn validate_motions(motions: &[MotionPair], x: &Pose) -> HandEyeResidual {
    let mut angles = Vec::with_capacity(motions.len());
    let mut t_sum = 0.0;

    for (i, m) in motions.iter().enumerate() {
        let r_ax = m.a.rotation * x.rotation;
        let r_xb = x.rotation * m.b.rotation;
        match r_ax.try_inverse() {
            Some(inv) => angles.push(rotation_angle_deg(&(r_xb * inv))),
            None => log::warn!("hand-eye validation: motion {i} has a singular rotation, skipped"),
        }

        let lhs = m.a.rotation * x.translation + m.a.translation;
        let rhs = x.rotation * m.b.translation + x.translation;
        t_sum += (lhs - rhs).norm();
    }

    let rotation_error_deg = if angles.is_empty() {
        0.0
    } else {
        angles.iter().map(|a| a * a).sum::<f64>().sqrt() / angles.len() as f64
    };
    let translation_error_mm = if motions.is_empty() {
        0.0
    } else {
        t_sum / motions.len() as f64
    };
    log::debug!(
        "hand-eye residual over {} motions: {:.5} deg, {:.5} mm",
        motions.len(),
        rotation_error_deg,
        translation_error_mm
    );

    HandEyeResidual {
        rotation_error_deg,
        translation_error_mm,
    }
}
