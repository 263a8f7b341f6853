//! Robot hand-eye calibration, `A X = X B`.
//!
//! `X` is the camera pose in the gripper frame. Gripper poses are
//! gripper-to-base transforms reported by the robot; board poses are
//! board-to-camera transforms, usually from [`crate::estimate_board_pose`].
//! For a pair of captures `(i, j)`:
//!
//! ```text
//! A = Tg(j)⁻¹ Tg(i)      B = Tbc(j) Tbc(i)⁻¹
//! ```
//!
//! Every method except Daniilidis solves the rotation first and then the
//! translation from the stacked linear system `(R_A − I) t_X = R_X t_B − t_A`.

mod andreff;
mod daniilidis;
mod horaud;
mod park;
mod tsai;
mod validate;

pub use andreff::Andreff;
pub use daniilidis::Daniilidis;
pub use horaud::Horaud;
pub use park::Park;
pub use tsai::Tsai;
pub use validate::{validate, validate_motions, HandEyeResidual};

use camcal_core::{CalibErr, Pose};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum number of captures for a solve.
pub const MIN_SAMPLES: usize = 3;

/// One relative motion: gripper motion `a`, camera motion `b`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionPair {
    pub a: Pose,
    pub b: Pose,
}

/// Which capture pairs become motions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPairing {
    /// `(i, i + 1)` for every capture.
    #[default]
    Consecutive,
    /// Every `(i, j)` with `i < j`.
    AllPairs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandEyeMethod {
    #[default]
    Tsai,
    Park,
    Horaud,
    Andreff,
    Daniilidis,
}

impl HandEyeMethod {
    pub const ALL: [HandEyeMethod; 5] = [
        HandEyeMethod::Tsai,
        HandEyeMethod::Park,
        HandEyeMethod::Horaud,
        HandEyeMethod::Andreff,
        HandEyeMethod::Daniilidis,
    ];

    pub fn solver(self) -> &'static dyn HandEyeSolver {
        match self {
            HandEyeMethod::Tsai => &Tsai,
            HandEyeMethod::Park => &Park,
            HandEyeMethod::Horaud => &Horaud,
            HandEyeMethod::Andreff => &Andreff,
            HandEyeMethod::Daniilidis => &Daniilidis,
        }
    }
}

impl std::fmt::Display for HandEyeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandEyeMethod::Tsai => "tsai",
            HandEyeMethod::Park => "park",
            HandEyeMethod::Horaud => "horaud",
            HandEyeMethod::Andreff => "andreff",
            HandEyeMethod::Daniilidis => "daniilidis",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for HandEyeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HandEyeMethod::ALL
            .into_iter()
            .find(|m| m.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown hand-eye method `{s}`"))
    }
}

/// A closed-form `A X = X B` solver.
pub trait HandEyeSolver: Sync {
    /// Rotation of `X` from the motion rotations.
    fn solve_rotation(&self, motions: &[MotionPair]) -> Result<Matrix3<f64>, CalibErr>;

    /// Full `X`; the default pairs [`Self::solve_rotation`] with the shared
    /// translation least squares.
    fn solve(&self, motions: &[MotionPair]) -> Result<Pose, CalibErr> {
        let rotation = self.solve_rotation(motions)?;
        let translation = solve_translation(motions, &rotation)?;
        Ok(Pose::new(rotation, translation))
    }
}

/// Relative motions from index-aligned capture lists.
pub fn build_motions(
    gripper_poses: &[Pose],
    board_poses: &[Pose],
    pairing: MotionPairing,
) -> Result<Vec<MotionPair>, CalibErr> {
    if gripper_poses.len() != board_poses.len() {
        return Err(CalibErr::SizeMismatch {
            expected: gripper_poses.len(),
            got: board_poses.len(),
        });
    }
    let n = gripper_poses.len();
    if n < MIN_SAMPLES {
        return Err(CalibErr::TooFewSamples {
            needed: MIN_SAMPLES,
            got: n,
        });
    }

    let pairs: Vec<(usize, usize)> = match pairing {
        MotionPairing::Consecutive => (0..n - 1).map(|i| (i, i + 1)).collect(),
        MotionPairing::AllPairs => (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect(),
    };
    Ok(pairs
        .into_iter()
        .map(|(i, j)| MotionPair {
            a: gripper_poses[j].inverse().compose(&gripper_poses[i]),
            b: board_poses[j].compose(&board_poses[i].inverse()),
        })
        .collect())
}

/// Least-squares `t_X` given `R_X`.
pub fn solve_translation(
    motions: &[MotionPair],
    rotation: &Matrix3<f64>,
) -> Result<Vector3<f64>, CalibErr> {
    let mut c = DMatrix::<f64>::zeros(3 * motions.len(), 3);
    let mut d = DVector::<f64>::zeros(3 * motions.len());
    for (k, m) in motions.iter().enumerate() {
        let lhs = m.a.rotation - Matrix3::identity();
        let rhs = rotation * m.b.translation - m.a.translation;
        c.fixed_view_mut::<3, 3>(3 * k, 0).copy_from(&lhs);
        d.fixed_rows_mut::<3>(3 * k).copy_from(&rhs);
    }
    let t = least_squares(c, &d, "hand-eye translation")?;
    Ok(Vector3::new(t[0], t[1], t[2]))
}

/// SVD least squares, `SingularMatrix` when the system is rank deficient.
pub(crate) fn least_squares(
    a: DMatrix<f64>,
    b: &DVector<f64>,
    context: &'static str,
) -> Result<DVector<f64>, CalibErr> {
    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.max();
    if max_sv <= 0.0 || svd.singular_values.min() <= max_sv * 1e-12 {
        return Err(CalibErr::SingularMatrix { context });
    }
    svd.solve(b, 1e-15)
        .map_err(|_| CalibErr::SingularMatrix { context })
}

/// Hamilton product on `[w, x, y, z]`.
pub(crate) fn quat_mul(p: [f64; 4], q: [f64; 4]) -> [f64; 4] {
    let [pw, px, py, pz] = p;
    let [qw, qx, qy, qz] = q;
    [
        pw * qw - px * qx - py * qy - pz * qz,
        pw * qx + px * qw + py * qz - pz * qy,
        pw * qy - px * qz + py * qw + pz * qx,
        pw * qz + px * qy - py * qx + pz * qw,
    ]
}

pub(crate) fn quat_conj(q: [f64; 4]) -> [f64; 4] {
    [q[0], -q[1], -q[2], -q[3]]
}

/// Solver selection for [`calibrate_hand_eye`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandEyeOptions {
    pub method: HandEyeMethod,
    /// Pairing used for both the solve and the residuals.
    pub pairing: MotionPairing,
}

/// One robot capture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandEyeSample {
    /// Gripper-to-base pose from the robot controller.
    pub gripper: Pose,
    /// Board-to-camera pose from the image.
    pub board_to_camera: Pose,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandEyeResult {
    pub camera_to_gripper: Pose,
    pub rotation_error_deg: f64,
    pub translation_error_mm: f64,
    pub method: HandEyeMethod,
}

/// `X` from index-aligned lists with consecutive pairing.
pub fn solve(
    gripper_poses: &[Pose],
    board_poses: &[Pose],
    method: HandEyeMethod,
) -> Result<Pose, CalibErr> {
    let motions = build_motions(gripper_poses, board_poses, MotionPairing::Consecutive)?;
    method.solver().solve(&motions)
}

/// Solve and validate in one go.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(samples), fields(samples = samples.len(), method = %options.method))
)]
pub fn calibrate_hand_eye(
    samples: &[HandEyeSample],
    options: &HandEyeOptions,
) -> Result<HandEyeResult, CalibErr> {
    let (gripper, board): (Vec<Pose>, Vec<Pose>) = samples
        .iter()
        .map(|s| (s.gripper, s.board_to_camera))
        .unzip();
    let motions = build_motions(&gripper, &board, options.pairing)?;
    let x = options.method.solver().solve(&motions)?;
    let residual = validate_motions(&motions, &x);

    log::info!(
        "hand-eye ({}, {} motions): rotation err {:.4} deg, translation err {:.4} mm",
        options.method,
        motions.len(),
        residual.rotation_error_deg,
        residual.translation_error_mm
    );

    Ok(HandEyeResult {
        camera_to_gripper: x,
        rotation_error_deg: residual.rotation_error_deg,
        translation_error_mm: residual.translation_error_mm,
        method: options.method,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use camcal_core::Pose;
    use nalgebra::Vector3;

    pub fn ground_truth() -> Pose {
        Pose::from_rodrigues(&Vector3::new(0.1, -0.2, 0.3), Vector3::new(30.0, -15.0, 80.0))
    }

    /// Gripper and board poses consistent with `x` and a fixed board.
    pub fn captures(x: &Pose, n: usize) -> (Vec<Pose>, Vec<Pose>) {
        let board_in_base =
            Pose::from_rodrigues(&Vector3::new(0.05, 0.02, -0.4), Vector3::new(500.0, 100.0, 0.0));
        let gripper: Vec<Pose> = (0..n)
            .map(|i| {
                let f = i as f64;
                Pose::from_rodrigues(
                    &Vector3::new(0.3 * (0.7 * f).sin(), 0.25 * (1.3 * f).cos(), 0.4 * (0.5 * f).sin()),
                    Vector3::new(400.0 + 40.0 * f.sin(), 50.0 * f.cos(), 600.0 + 15.0 * f),
                )
            })
            .collect();
        // board -> camera = X⁻¹ Tg⁻¹ board_in_base
        let board = gripper
            .iter()
            .map(|g| x.inverse().compose(&g.inverse()).compose(&board_in_base))
            .collect();
        (gripper, board)
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn motions_satisfy_ax_eq_xb() {
        let x = ground_truth();
        let (g, b) = captures(&x, 6);
        for pairing in [MotionPairing::Consecutive, MotionPairing::AllPairs] {
            let motions = build_motions(&g, &b, pairing).unwrap();
            let expected = if pairing == MotionPairing::Consecutive { 5 } else { 15 };
            assert_eq!(motions.len(), expected);
            for m in &motions {
                let ax = m.a.compose(&x).to_homogeneous();
                let xb = x.compose(&m.b).to_homogeneous();
                assert!((ax - xb).norm() < 1e-8);
            }
        }
    }

    #[test]
    fn input_validation() {
        let x = ground_truth();
        let (g, b) = captures(&x, 4);
        assert!(matches!(
            build_motions(&g, &b[..3], MotionPairing::Consecutive),
            Err(CalibErr::SizeMismatch { expected: 4, got: 3 })
        ));
        assert!(matches!(
            solve(&g[..2], &b[..2], HandEyeMethod::Park),
            Err(CalibErr::TooFewSamples { needed: 3, got: 2 })
        ));
    }

    #[test]
    fn every_method_recovers_x() {
        let x = ground_truth();
        let (g, b) = captures(&x, 8);
        for method in HandEyeMethod::ALL {
            let est = solve(&g, &b, method).unwrap_or_else(|e| panic!("{method}: {e}"));
            assert!(
                (est.rotation - x.rotation).norm() < 1e-6,
                "{method}: rotation {}",
                est.rotation
            );
            assert!(
                (est.translation - x.translation).norm() < 1e-4,
                "{method}: translation {}",
                est.translation
            );
        }
    }

    #[test]
    fn method_names_parse() {
        for m in HandEyeMethod::ALL {
            assert_eq!(m.to_string().parse::<HandEyeMethod>().unwrap(), m);
        }
        assert_eq!("TSAI".parse::<HandEyeMethod>().unwrap(), HandEyeMethod::Tsai);
        assert!("nope".parse::<HandEyeMethod>().is_err());
    }

    #[test]
    fn quaternion_product_matches_rotation_product() {
        let p = Pose::from_rodrigues(&Vector3::new(0.3, 0.1, -0.2), Vector3::zeros());
        let q = Pose::from_rodrigues(&Vector3::new(-0.1, 0.5, 0.2), Vector3::zeros());
        let pq = quat_mul(p.quaternion(), q.quaternion());
        let r = camcal_core::quaternion_to_rotation(pq).unwrap();
        assert!((r - p.rotation * q.rotation).norm() < 1e-12);
        let back = quat_mul(pq, quat_conj(q.quaternion()));
        let r = camcal_core::quaternion_to_rotation(back).unwrap();
        assert!((r - p.rotation).norm() < 1e-12);
    }
}
