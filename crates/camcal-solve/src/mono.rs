//! Single-camera calibration from planar checkerboard views.

use crate::init::{board_homography, centered_intrinsics, pose_from_homography, zhang_intrinsics};
use crate::lm::{self, BlockProblem, LmOptions, SolveReport};
use crate::reprojection::{
    camera_from_params, camera_to_params, pose_from_params, pose_to_params, rms, view_residuals,
    tie_aspect, view_sq_error, IntrinsicsMask, CAMERA_PARAMS, POSE_PARAMS,
};
use camcal_core::{CalibErr, CalibrationBoard, CameraModel, Distortion, Pose};
use nalgebra::{DVector, Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Options for [`calibrate_mono`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoOptions {
    pub mask: IntrinsicsMask,
    /// Start from this camera instead of the closed-form estimate.
    pub initial_camera: Option<CameraModel>,
    pub lm: LmOptions,
}

/// Output of one mono calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: CameraModel,
    /// Board-to-camera pose per input view, in input order.
    pub per_view_poses: Vec<Pose>,
    /// Per-view RMS reprojection error in pixels.
    pub per_view_errors: Vec<f64>,
    /// RMS over every point of every view.
    pub rms_error: f64,
    /// `(width, height)` in pixels.
    pub image_shape: (u32, u32),
    pub report: SolveReport,
}

impl CalibrationResult {
    pub fn intrinsics(&self) -> Matrix3<f64> {
        self.camera.intrinsics.matrix()
    }

    /// `[k1, k2, p1, p2, k3]`.
    pub fn distortion(&self) -> [f64; 5] {
        self.camera.distortion.to_array()
    }
}

/// Check corner-set shapes against the board.
pub(crate) fn validate_views(
    board: &CalibrationBoard,
    views: &[Vec<Point2<f64>>],
) -> Result<(), CalibErr> {
    if views.is_empty() {
        return Err(CalibErr::NoCorners);
    }
    for v in views {
        if v.len() != board.point_count() {
            return Err(CalibErr::SizeMismatch {
                expected: board.point_count(),
                got: v.len(),
            });
        }
    }
    Ok(())
}

/// Closed-form camera and per-view poses, distortion zero.
pub(crate) fn initial_estimate(
    board: &CalibrationBoard,
    views: &[Vec<Point2<f64>>],
    image_shape: (u32, u32),
) -> Result<(CameraModel, Vec<Pose>), CalibErr> {
    let homs = views
        .iter()
        .map(|v| board_homography(board.object_points(), v))
        .collect::<Option<Vec<_>>>()
        .ok_or(CalibErr::SingularMatrix {
            context: "board homography",
        })?;

    let intrinsics = match zhang_intrinsics(&homs, image_shape) {
        Some(k) => k,
        None => {
            log::debug!("closed-form intrinsics unavailable, assuming centred principal point");
            centered_intrinsics(&homs, image_shape)
        }
    };
    let camera = CameraModel::new(intrinsics, Distortion::default());
    let poses = initial_poses(&camera, &homs)?;
    Ok((camera, poses))
}

fn initial_poses(
    camera: &CameraModel,
    homs: &[camcal_core::Homography],
) -> Result<Vec<Pose>, CalibErr> {
    let k = camera.intrinsics.matrix();
    homs.iter()
        .map(|h| {
            pose_from_homography(&k, h).ok_or(CalibErr::SingularMatrix {
                context: "pose from homography",
            })
        })
        .collect()
}

struct MonoProblem<'a> {
    object: &'a [Point3<f64>],
    views: &'a [Vec<Point2<f64>>],
    aspect: Option<f64>,
    block_params: Vec<Vec<usize>>,
}

impl<'a> MonoProblem<'a> {
    fn new(
        object: &'a [Point3<f64>],
        views: &'a [Vec<Point2<f64>>],
        mask: &IntrinsicsMask,
        aspect: Option<f64>,
    ) -> Self {
        let camera_free = mask.free_offsets();
        let block_params = (0..views.len())
            .map(|v| {
                let base = CAMERA_PARAMS + v * POSE_PARAMS;
                camera_free
                    .iter()
                    .copied()
                    .chain(base..base + POSE_PARAMS)
                    .collect()
            })
            .collect();
        Self {
            object,
            views,
            aspect,
            block_params,
        }
    }
}

impl BlockProblem for MonoProblem<'_> {
    fn num_params(&self) -> usize {
        CAMERA_PARAMS + POSE_PARAMS * self.views.len()
    }

    fn num_blocks(&self) -> usize {
        self.views.len()
    }

    fn block_params(&self, block: usize) -> &[usize] {
        &self.block_params[block]
    }

    fn block_residuals(&self, block: usize, x: &DVector<f64>) -> DVector<f64> {
        let cam = tie_aspect(camera_from_params(&x.as_slice()[..CAMERA_PARAMS]), self.aspect);
        let base = CAMERA_PARAMS + block * POSE_PARAMS;
        let pose = pose_from_params(&x.as_slice()[base..base + POSE_PARAMS]);
        view_residuals(&cam, &pose, self.object, &self.views[block])
    }
}

/// Calibrate one camera from per-image corner sets (row-major, board-aligned).
///
/// Initialization is closed-form (DLT homographies, Zhang intrinsics, planar
/// pose); refinement is Levenberg–Marquardt over intrinsics, the five distortion
/// coefficients and one pose per view.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(board, views, options), fields(views = views.len()))
)]
pub fn calibrate_mono(
    board: &CalibrationBoard,
    views: &[Vec<Point2<f64>>],
    image_shape: (u32, u32),
    options: &MonoOptions,
) -> Result<CalibrationResult, CalibErr> {
    validate_views(board, views)?;

    let (camera0, poses0) = match options.initial_camera {
        Some(camera) => {
            let homs = views
                .iter()
                .map(|v| board_homography(board.object_points(), v))
                .collect::<Option<Vec<_>>>()
                .ok_or(CalibErr::SingularMatrix {
                    context: "board homography",
                })?;
            let poses = initial_poses(&camera, &homs)?;
            (camera, poses)
        }
        None => initial_estimate(board, views, image_shape)?,
    };
    log::debug!(
        "mono init: fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
        camera0.intrinsics.fx,
        camera0.intrinsics.fy,
        camera0.intrinsics.cx,
        camera0.intrinsics.cy
    );

    let mut x0 = Vec::with_capacity(CAMERA_PARAMS + POSE_PARAMS * views.len());
    x0.extend(camera_to_params(&camera0));
    if options.mask.zero_tangential {
        x0[6] = 0.0;
        x0[7] = 0.0;
    }
    for pose in &poses0 {
        x0.extend(pose_to_params(pose));
    }

    let aspect = options.mask.aspect(&camera0);
    let problem = MonoProblem::new(board.object_points(), views, &options.mask, aspect);
    let (x, report) = lm::solve(&problem, DVector::from_vec(x0), &options.lm);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(CalibErr::Diverged);
    }

    let camera = tie_aspect(camera_from_params(&x.as_slice()[..CAMERA_PARAMS]), aspect);
    let per_view_poses: Vec<Pose> = (0..views.len())
        .map(|v| {
            let base = CAMERA_PARAMS + v * POSE_PARAMS;
            pose_from_params(&x.as_slice()[base..base + POSE_PARAMS])
        })
        .collect();

    let (mut sq_total, mut count_total) = (0.0, 0usize);
    let per_view_errors = per_view_poses
        .iter()
        .zip(views)
        .map(|(pose, obs)| {
            let (sq, n) = view_sq_error(&camera, pose, board.object_points(), obs);
            sq_total += sq;
            count_total += n;
            rms(sq, n)
        })
        .collect();
    let rms_error = rms(sq_total, count_total);

    log::info!(
        "mono calibration: {} views, rms {:.4} px after {} iterations",
        views.len(),
        rms_error,
        report.iterations
    );

    Ok(CalibrationResult {
        camera,
        per_view_poses,
        per_view_errors,
        rms_error,
        image_shape,
        report,
    })
}
