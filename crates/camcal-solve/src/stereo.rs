//! Two-camera rig calibration with a shared relative pose.

use crate::lm::{self, BlockProblem, LmOptions, SolveReport};
use crate::mono::{calibrate_mono, validate_views, CalibrationResult, MonoOptions};
use crate::reprojection::{
    camera_from_params, camera_to_params, pose_from_params, pose_to_params, rms, view_residuals,
    tie_aspect, view_sq_error, IntrinsicsMask, CAMERA_PARAMS, POSE_PARAMS,
};
use camcal_core::pose::skew;
use camcal_core::{project_to_so3, CalibErr, CalibrationBoard, CameraModel, Pose};
use nalgebra::{DVector, Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

const REL_OFFSET: usize = 2 * CAMERA_PARAMS;
const VIEWS_OFFSET: usize = REL_OFFSET + POSE_PARAMS;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoOptions {
    /// Per-camera seeding options.
    pub mono: MonoOptions,
    /// Keep both cameras' intrinsics and distortion at their mono estimates.
    pub fix_intrinsics: bool,
    pub lm: LmOptions,
}

/// Joint calibration of a left/right rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoResult {
    pub left: CalibrationResult,
    pub right: CalibrationResult,
    /// Maps left-camera coordinates to right-camera coordinates.
    pub relative_rotation: Matrix3<f64>,
    pub relative_translation: Vector3<f64>,
    pub essential_matrix: Matrix3<f64>,
    pub fundamental_matrix: Matrix3<f64>,
    /// RMS over both cameras after joint refinement.
    pub rms_error: f64,
    pub report: SolveReport,
}

impl StereoResult {
    pub fn relative_pose(&self) -> Pose {
        Pose::new(self.relative_rotation, self.relative_translation)
    }
}

/// `E = [T]ₓ R`.
pub fn essential_from_pose(r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix3<f64> {
    skew(t) * r
}

/// `F = K2⁻ᵀ E K1⁻¹`, scaled so `F[2,2] = 1` when that entry is usable.
pub fn fundamental_from_essential(
    e: &Matrix3<f64>,
    k1: &Matrix3<f64>,
    k2: &Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let f = k2.try_inverse()?.transpose() * e * k1.try_inverse()?;
    let s = f[(2, 2)];
    Some(if s.abs() > 1e-12 { f / s } else { f })
}

/// Average relative pose `right_i ∘ left_i⁻¹` over all views.
fn average_relative_pose(left: &[Pose], right: &[Pose]) -> Option<Pose> {
    let mut r_sum = Matrix3::zeros();
    for (l, r) in left.iter().zip(right) {
        r_sum += r.rotation * l.rotation.transpose();
    }
    let rotation = project_to_so3(&r_sum)?;
    let t_sum: Vector3<f64> = left
        .iter()
        .zip(right)
        .map(|(l, r)| r.translation - rotation * l.translation)
        .sum();
    Some(Pose::new(rotation, t_sum / left.len() as f64))
}

struct StereoProblem<'a> {
    object: &'a [Point3<f64>],
    left: &'a [Vec<Point2<f64>>],
    right: &'a [Vec<Point2<f64>>],
    aspect: [Option<f64>; 2],
    block_params: Vec<Vec<usize>>,
}

impl<'a> StereoProblem<'a> {
    fn new(
        object: &'a [Point3<f64>],
        left: &'a [Vec<Point2<f64>>],
        right: &'a [Vec<Point2<f64>>],
        mask: &IntrinsicsMask,
        aspect: [Option<f64>; 2],
    ) -> Self {
        let free = mask.free_offsets();
        let mut block_params = Vec::with_capacity(2 * left.len());
        for v in 0..left.len() {
            let base = VIEWS_OFFSET + v * POSE_PARAMS;
            let view = base..base + POSE_PARAMS;
            block_params.push(free.iter().copied().chain(view.clone()).collect());
            block_params.push(
                free.iter()
                    .map(|o| CAMERA_PARAMS + o)
                    .chain(REL_OFFSET..REL_OFFSET + POSE_PARAMS)
                    .chain(view)
                    .collect(),
            );
        }
        Self {
            object,
            left,
            right,
            aspect,
            block_params,
        }
    }
}

impl BlockProblem for StereoProblem<'_> {
    fn num_params(&self) -> usize {
        VIEWS_OFFSET + POSE_PARAMS * self.left.len()
    }

    fn num_blocks(&self) -> usize {
        2 * self.left.len()
    }

    fn block_params(&self, block: usize) -> &[usize] {
        &self.block_params[block]
    }

    fn block_residuals(&self, block: usize, x: &DVector<f64>) -> DVector<f64> {
        let xs = x.as_slice();
        let view = block / 2;
        let base = VIEWS_OFFSET + view * POSE_PARAMS;
        let pose = pose_from_params(&xs[base..base + POSE_PARAMS]);
        if block % 2 == 0 {
            let cam = tie_aspect(camera_from_params(&xs[..CAMERA_PARAMS]), self.aspect[0]);
            view_residuals(&cam, &pose, self.object, &self.left[view])
        } else {
            let cam = tie_aspect(camera_from_params(&xs[CAMERA_PARAMS..REL_OFFSET]), self.aspect[1]);
            let rel = pose_from_params(&xs[REL_OFFSET..VIEWS_OFFSET]);
            view_residuals(&cam, &rel.compose(&pose), self.object, &self.right[view])
        }
    }
}

fn finish_camera(
    board: &CalibrationBoard,
    camera: CameraModel,
    poses: Vec<Pose>,
    views: &[Vec<Point2<f64>>],
    image_shape: (u32, u32),
    report: SolveReport,
) -> (CalibrationResult, f64, usize) {
    let (mut sq_total, mut n_total) = (0.0, 0usize);
    let per_view_errors = poses
        .iter()
        .zip(views)
        .map(|(pose, obs)| {
            let (sq, n) = view_sq_error(&camera, pose, board.object_points(), obs);
            sq_total += sq;
            n_total += n;
            rms(sq, n)
        })
        .collect();
    let result = CalibrationResult {
        camera,
        per_view_poses: poses,
        per_view_errors,
        rms_error: rms(sq_total, n_total),
        image_shape,
        report,
    };
    (result, sq_total, n_total)
}

/// Calibrate a synchronized pair from index-aligned left/right corner sets.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(board, left, right, options), fields(views = left.len()))
)]
pub fn calibrate_stereo(
    board: &CalibrationBoard,
    left: &[Vec<Point2<f64>>],
    right: &[Vec<Point2<f64>>],
    image_shape: (u32, u32),
    options: &StereoOptions,
) -> Result<StereoResult, CalibErr> {
    if left.len() != right.len() {
        return Err(CalibErr::SizeMismatch {
            expected: left.len(),
            got: right.len(),
        });
    }
    validate_views(board, left)?;
    validate_views(board, right)?;

    let mono_left = calibrate_mono(board, left, image_shape, &options.mono)?;
    let mono_right = calibrate_mono(board, right, image_shape, &options.mono)?;
    let rel0 = average_relative_pose(&mono_left.per_view_poses, &mono_right.per_view_poses)
        .ok_or(CalibErr::SingularMatrix {
            context: "relative pose average",
        })?;
    log::debug!(
        "stereo seed: baseline {:.3} mm, left rms {:.4}, right rms {:.4}",
        rel0.translation.norm(),
        mono_left.rms_error,
        mono_right.rms_error
    );

    let mut x0 = Vec::with_capacity(VIEWS_OFFSET + POSE_PARAMS * left.len());
    x0.extend(camera_to_params(&mono_left.camera));
    x0.extend(camera_to_params(&mono_right.camera));
    x0.extend(pose_to_params(&rel0));
    for pose in &mono_left.per_view_poses {
        x0.extend(pose_to_params(pose));
    }

    let mask = if options.fix_intrinsics {
        IntrinsicsMask::all_fixed()
    } else {
        options.mono.mask
    };
    let aspect = [mask.aspect(&mono_left.camera), mask.aspect(&mono_right.camera)];
    let problem = StereoProblem::new(board.object_points(), left, right, &mask, aspect);
    let (x, report) = lm::solve(&problem, DVector::from_vec(x0), &options.lm);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(CalibErr::Diverged);
    }

    let xs = x.as_slice();
    let cam_left = tie_aspect(camera_from_params(&xs[..CAMERA_PARAMS]), aspect[0]);
    let cam_right = tie_aspect(camera_from_params(&xs[CAMERA_PARAMS..REL_OFFSET]), aspect[1]);
    let rel = pose_from_params(&xs[REL_OFFSET..VIEWS_OFFSET]);
    let left_poses: Vec<Pose> = (0..left.len())
        .map(|v| {
            let base = VIEWS_OFFSET + v * POSE_PARAMS;
            pose_from_params(&xs[base..base + POSE_PARAMS])
        })
        .collect();
    let right_poses = left_poses.iter().map(|p| rel.compose(p)).collect();

    let (left_result, sq_l, n_l) = finish_camera(
        board,
        cam_left,
        left_poses,
        left,
        image_shape,
        report.clone(),
    );
    let (right_result, sq_r, n_r) = finish_camera(
        board,
        cam_right,
        right_poses,
        right,
        image_shape,
        report.clone(),
    );

    let essential_matrix = essential_from_pose(&rel.rotation, &rel.translation);
    let fundamental_matrix = fundamental_from_essential(
        &essential_matrix,
        &cam_left.intrinsics.matrix(),
        &cam_right.intrinsics.matrix(),
    )
    .ok_or(CalibErr::SingularMatrix {
        context: "fundamental matrix",
    })?;
    let rms_error = rms(sq_l + sq_r, n_l + n_r);

    log::info!(
        "stereo calibration: {} pairs, rms {:.4} px, baseline {:.3} mm",
        left.len(),
        rms_error,
        rel.translation.norm()
    );

    Ok(StereoResult {
        left: left_result,
        right: right_result,
        relative_rotation: rel.rotation,
        relative_translation: rel.translation,
        essential_matrix,
        fundamental_matrix,
        rms_error,
        report,
    })
}
