#![allow(dead_code)]

use camcal::core::{CalibrationBoard, CameraModel, Distortion, Intrinsics, Pose};
use camcal::detect::DetectError;
use camcal::{BoardDetector, Detection};
use nalgebra::{Point2, Vector3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const IMAGE_SHAPE: (u32, u32) = (1280, 960);

pub fn board() -> CalibrationBoard {
    CalibrationBoard::with_size(9, 12, 20.0).expect("board")
}

pub fn camera() -> CameraModel {
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

pub fn project(camera: &CameraModel, pose: &Pose, board: &CalibrationBoard) -> Vec<Point2<f64>> {
    board
        .object_points()
        .iter()
        .map(|p| camera.project(pose, p).expect("point in front of camera"))
        .collect()
}

/// Answers from a fixed table keyed by path; unknown paths fail to open.
#[derive(Default)]
pub struct TableDetector {
    pub views: HashMap<PathBuf, Option<Vec<Point2<f64>>>>,
}

impl TableDetector {
    pub fn insert(&mut self, path: impl Into<PathBuf>, corners: Option<Vec<Point2<f64>>>) {
        self.views.insert(path.into(), corners);
    }
}

impl BoardDetector for TableDetector {
    fn detect(&self, _board: &CalibrationBoard, path: &Path) -> Result<Detection, DetectError> {
        match self.views.get(path) {
            Some(corners) => Ok(Detection {
                corners: corners.clone(),
                image_size: IMAGE_SHAPE,
            }),
            None => Err(DetectError::Open {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

pub fn view_path(i: usize) -> PathBuf {
    PathBuf::from(format!("/captures/left/view_{i:02}.png"))
}

/// `n` views of [`board`] through [`camera`]; the views in `missing` have no board.
pub fn mono_table(n: usize, missing: &[usize]) -> (TableDetector, Vec<PathBuf>) {
    let board = board();
    let cam = camera();
    let mut table = TableDetector::default();
    let paths: Vec<PathBuf> = view_poses(&board, n)
        .iter()
        .enumerate()
        .map(|(i, pose)| {
            let path = view_path(i);
            let corners = (!missing.contains(&i)).then(|| project(&cam, pose, &board));
            table.insert(path.clone(), corners);
            path
        })
        .collect();
    (table, paths)
}
