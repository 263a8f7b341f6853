#![allow(dead_code)]

use camcal_core::{CalibrationBoard, CameraModel, Distortion, Intrinsics, Pose};
use nalgebra::{Point2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const IMAGE_SHAPE: (u32, u32) = (1280, 960);

pub fn board() -> CalibrationBoard {
    CalibrationBoard::with_size(9, 12, 20.0).expect("board")
}

pub fn left_camera() -> CameraModel {
    CameraModel::new(
        Intrinsics {
            fx: 1210.0,
            fy: 1195.0,
            cx: 645.0,
            cy: 478.0,
        },
        Distortion {
            k1: -0.12,
            k2: 0.08,
            p1: 0.0005,
            p2: -0.0008,
            k3: 0.0,
        },
    )
}

pub fn right_camera() -> CameraModel {
    CameraModel::new(
        Intrinsics {
            fx: 1180.0,
            fy: 1182.0,
            cx: 630.0,
            cy: 490.0,
        },
        Distortion {
            k1: -0.09,
            k2: 0.05,
            p1: -0.0003,
            p2: 0.0004,
            k3: 0.0,
        },
    )
}

/// Board poses spread over tilts and depths, each centred near the optical axis
/// with a small offset.
pub fn view_poses(board: &CalibrationBoard, n: usize) -> Vec<Pose> {
    let center = Vector3::new(
        0.5 * (board.cols() - 1) as f64 * board.cell_size(),
        0.5 * (board.rows() - 1) as f64 * board.cell_size(),
        0.0,
    );
    (0..n)
        .map(|i| {
            let f = i as f64;
            let rvec = Vector3::new(
                0.35 * (0.9 * f + 0.3).sin(),
                0.35 * (1.3 * f).cos(),
                0.2 * (0.5 * f).sin(),
            );
            let rot = Pose::from_rodrigues(&rvec, Vector3::zeros()).rotation;
            let cam_center = Vector3::new(40.0 * f.sin(), 30.0 * (1.7 * f).cos(), 550.0 + 15.0 * f);
            Pose::new(rot, cam_center - rot * center)
        })
        .collect()
}

/// Projected corners with uniform pixel noise in `[-noise, noise]`.
pub fn project_view(
    camera: &CameraModel,
    pose: &Pose,
    board: &CalibrationBoard,
    noise: f64,
    rng: &mut StdRng,
) -> Vec<Point2<f64>> {
    board
        .object_points()
        .iter()
        .map(|p| {
            let px = camera.project(pose, p).expect("point in front of camera");
            if noise > 0.0 {
                Point2::new(
                    px.x + rng.gen_range(-noise..noise),
                    px.y + rng.gen_range(-noise..noise),
                )
            } else {
                px
            }
        })
        .collect()
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn rel_err(a: f64, b: f64) -> f64 {
    (a - b).abs() / b.abs()
}
