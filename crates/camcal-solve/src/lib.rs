//! Calibration solvers for planar checkerboards.
//!
//! - [`calibrate_mono`]: intrinsics, Brown–Conrady distortion and per-view
//!   poses for one camera.
//! - [`calibrate_stereo`]: two cameras plus their relative pose, essential and
//!   fundamental matrices.
//! - [`estimate_board_pose`]: board pose from one image with a known camera.
//! - [`handeye`]: `A X = X B` robot hand-eye calibration with five closed-form
//!   methods and closed-loop residuals.
//!
//! All solvers take corner sets that are row-major and index-aligned with
//! [`camcal_core::CalibrationBoard::object_points`].

pub mod handeye;
mod init;
pub mod lm;
mod mono;
mod pnp;
mod reprojection;
mod stereo;

pub use handeye::{
    calibrate_hand_eye, HandEyeMethod, HandEyeOptions, HandEyeResidual, HandEyeResult,
    HandEyeSample, HandEyeSolver, MotionPairing,
};
pub use init::{board_homography, centered_intrinsics, pose_from_homography, zhang_intrinsics};
pub use lm::{LmOptions, SolveReport};
pub use mono::{calibrate_mono, CalibrationResult, MonoOptions};
pub use pnp::{estimate_board_pose, BoardPose};
pub use reprojection::IntrinsicsMask;
pub use stereo::{
    calibrate_stereo, essential_from_pose, fundamental_from_essential, StereoOptions, StereoResult,
};
