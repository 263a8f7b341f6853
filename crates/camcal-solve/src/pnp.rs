//! Board pose from detected corners with a known camera.

use crate::init::{board_homography, pose_from_homography};
use crate::lm::{self, BlockProblem, LmOptions};
use crate::reprojection::{pose_from_params, pose_to_params, rms, view_residuals, POSE_PARAMS};
use camcal_core::{CalibErr, CalibrationBoard, CameraModel, Pose};
use nalgebra::{DVector, Matrix3, Point2, Point3};

struct PoseProblem<'a> {
    camera: &'a CameraModel,
    object: &'a [Point3<f64>],
    observed: &'a [Point2<f64>],
    params: [usize; POSE_PARAMS],
}

impl BlockProblem for PoseProblem<'_> {
    fn num_params(&self) -> usize {
        POSE_PARAMS
    }

    fn num_blocks(&self) -> usize {
        1
    }

    fn block_params(&self, _block: usize) -> &[usize] {
        &self.params
    }

    fn block_residuals(&self, _block: usize, x: &DVector<f64>) -> DVector<f64> {
        let pose = pose_from_params(x.as_slice());
        view_residuals(self.camera, &pose, self.object, self.observed)
    }
}

/// Board-to-camera pose plus its RMS reprojection error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoardPose {
    pub pose: Pose,
    pub rms_error: f64,
}

/// Estimate the board pose seen in `corners`.
///
/// Corners are undistorted to normalized coordinates, a homography gives the
/// initial pose and LM refines it against the distorted projection.
pub fn estimate_board_pose(
    board: &CalibrationBoard,
    camera: &CameraModel,
    corners: &[Point2<f64>],
) -> Result<BoardPose, CalibErr> {
    if corners.len() != board.point_count() {
        return Err(CalibErr::SizeMismatch {
            expected: board.point_count(),
            got: corners.len(),
        });
    }

    let normalized: Vec<Point2<f64>> = corners.iter().map(|p| camera.undistort_pixel(p)).collect();
    let hom = board_homography(board.object_points(), &normalized).ok_or(
        CalibErr::SingularMatrix {
            context: "board homography",
        },
    )?;
    let init = pose_from_homography(&Matrix3::identity(), &hom).ok_or(
        CalibErr::SingularMatrix {
            context: "pose from homography",
        },
    )?;

    let problem = PoseProblem {
        camera,
        object: board.object_points(),
        observed: corners,
        params: [0, 1, 2, 3, 4, 5],
    };
    let x0 = DVector::from_row_slice(&pose_to_params(&init));
    let (x, _) = lm::solve(&problem, x0, &LmOptions::default());
    if x.iter().any(|v| !v.is_finite()) {
        return Err(CalibErr::Diverged);
    }

    let pose = pose_from_params(x.as_slice());
    let r = view_residuals(camera, &pose, board.object_points(), corners);
    Ok(BoardPose {
        pose,
        rms_error: rms(r.norm_squared(), corners.len()),
    })
}
