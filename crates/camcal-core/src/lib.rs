//! Core geometry for checkerboard camera calibration.
//!
//! This crate is detector- and solver-agnostic: it holds the board layout, the
//! pinhole/Brown–Conrady camera model, rigid-transform math, DLT homographies and
//! the shared [`CalibErr`] type.

mod board;
mod camera;
mod error;
mod homography;
mod image;
pub mod pose;

pub use board::{BoardError, BoardSpec, CalibrationBoard};
pub use camera::{CameraModel, Distortion, Intrinsics};
pub use error::CalibErr;
pub use homography::{estimate_homography, Homography};
pub use image::{gradient_bilinear, sample_bilinear, GrayImage, GrayImageView};
pub use pose::{
    compose_homogeneous, invert_homogeneous, project_to_so3, quaternion_to_rotation,
    rotation_to_quaternion, Pose,
};
