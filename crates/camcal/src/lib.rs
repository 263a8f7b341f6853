//! Checkerboard camera calibration.
//!
//! This crate ties the workspace together:
//! - re-exports of the geometry core, the corner detector and the solvers;
//! - [`session::CalibrationSession`]: per-image state, parallel detection and
//!   reject-and-recalibrate loops;
//! - [`io`]: camera-parameter and hand-eye JSON files;
//! - [`store`]: per-image records keyed by file name;
//! - [`robot`]: robot controller pose logs for hand-eye calibration.
//!
//! ## Quickstart
//!
//! ```no_run
//! use camcal::{CalibrationSession, ImageFileDetector};
//! use camcal::core::CalibrationBoard;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let board = CalibrationBoard::with_size(9, 12, 20.0)?;
//! let mut session = CalibrationSession::new(board, Box::new(ImageFileDetector::default()));
//! session.register_images(["img/0001.png", "img/0002.png", "img/0003.png"]);
//! session.detect_all(true);
//!
//! let mut result = session.calibrate()?;
//! // Drop the worst image until every view is below half a pixel.
//! while let Some(worst) = session.worst_image() {
//!     let err = session.record(worst).and_then(|r| r.reprojection_error);
//!     if err.is_none_or(|e| e < 0.5) || result.view_count() <= 3 {
//!         break;
//!     }
//!     result = session.reject_and_recalibrate(worst)?;
//! }
//! println!("rms {:.3} px", result.rms_error());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `camcal::core`: board, camera model, pose math, homography, [`CalibErr`].
//! - `camcal::corners`: ChESS / saddle corner detection on `image::GrayImage`.
//! - `camcal::solve`: mono, stereo, PnP and hand-eye solvers.

pub use camcal_core as core;
pub use camcal_detect as corners;
pub use camcal_solve as solve;

pub use camcal_core::{CalibErr, CalibrationBoard, CameraModel, Pose};
pub use camcal_detect::{CornerDetector, Detection, DetectorConfig, DetectorKind};
pub use camcal_solve::{
    calibrate_hand_eye, calibrate_mono, calibrate_stereo, HandEyeMethod, HandEyeOptions,
    HandEyeResult, HandEyeSample, MotionPairing,
};

mod config;
pub mod detect;
pub mod io;
#[cfg(feature = "cli")]
pub mod logging;
pub mod robot;
pub mod session;
pub mod store;

pub use config::SessionConfig;
pub use detect::{BoardDetector, DetectError, ImageFileDetector};
pub use session::{CalibrationSession, ImageId, ImageRecord, ImageState, SessionCalibration};
pub use store::{JsonFileStore, MemoryStore, RecordStore, StoredRecord};
