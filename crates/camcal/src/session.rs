//! Image bookkeeping for an interactive calibration run.
//!
//! A [`CalibrationSession`] owns one record per registered image (or stereo
//! pair) and moves it through
//!
//! ```text
//! Pending ──detect──> Detected ──calibrate──> Calibrated
//!    │                   │                        │
//!    └──> Rejected <─────┴──── reject ────────────┘
//!                        └──> Excluded
//! ```
//!
//! Registering images or changing the board sends every record back to
//! `Pending`. Detection failures never abort a batch: the record is rejected
//! and the rest carry on.

use crate::core::{CalibErr, CalibrationBoard, Pose};
use crate::detect::BoardDetector;
use crate::solve::{
    calibrate_mono, calibrate_stereo, CalibrationResult, MonoOptions, StereoOptions, StereoResult,
};
use crate::store::{RecordStore, StoredRecord};
use nalgebra::Point2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Stable index of a record in its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageId(pub usize);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageState {
    #[default]
    Pending,
    Detected,
    Rejected,
    Calibrated,
    Excluded,
}

impl ImageState {
    /// Records in these states feed [`CalibrationSession::calibrate`].
    pub fn is_usable(self) -> bool {
        matches!(self, ImageState::Detected | ImageState::Calibrated)
    }
}

/// One image (or the left image of a stereo pair) and what is known about it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    /// Right image of a stereo pair.
    pub right_path: Option<PathBuf>,
    pub state: ImageState,
    /// Row-major, `rows * cols` entries, index-aligned with the board.
    pub detected_corners: Option<Vec<Point2<f64>>>,
    pub right_corners: Option<Vec<Point2<f64>>>,
    pub image_size: Option<(u32, u32)>,
    /// Board-to-camera pose from the last calibration (left camera for pairs).
    pub pose: Option<Pose>,
    /// RMS reprojection error in pixels from the last calibration.
    pub reprojection_error: Option<f64>,
}

impl ImageRecord {
    fn new(path: PathBuf, right_path: Option<PathBuf>) -> Self {
        Self {
            path,
            right_path,
            state: ImageState::Pending,
            detected_corners: None,
            right_corners: None,
            image_size: None,
            pose: None,
            reprojection_error: None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.path), self.right_path.take());
    }

    fn clear_solution(&mut self) {
        self.pose = None;
        self.reprojection_error = None;
    }
}

/// Result of [`CalibrationSession::calibrate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionCalibration {
    Mono(CalibrationResult),
    Stereo(StereoResult),
}

impl SessionCalibration {
    pub fn rms_error(&self) -> f64 {
        match self {
            SessionCalibration::Mono(r) => r.rms_error,
            SessionCalibration::Stereo(r) => r.rms_error,
        }
    }

    pub fn view_count(&self) -> usize {
        match self {
            SessionCalibration::Mono(r) => r.per_view_poses.len(),
            SessionCalibration::Stereo(r) => r.left.per_view_poses.len(),
        }
    }
}

/// Counts after one detection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectSummary {
    pub detected: usize,
    pub rejected: usize,
    /// Pending records left unscheduled because the stop flag was raised.
    pub skipped: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Mono,
    Stereo,
}

struct Outcome {
    corners: Option<Vec<Point2<f64>>>,
    right_corners: Option<Vec<Point2<f64>>>,
    image_size: Option<(u32, u32)>,
}

impl Outcome {
    fn found(&self, stereo: bool) -> bool {
        self.corners.is_some() && (!stereo || self.right_corners.is_some())
    }
}

fn detect_or_warn(
    detector: &dyn BoardDetector,
    board: &CalibrationBoard,
    path: &Path,
) -> Option<crate::corners::Detection> {
    match detector.detect(board, path) {
        Ok(d) => Some(d),
        Err(err) => {
            log::warn!("{err}");
            None
        }
    }
}

fn detect_record(
    detector: &dyn BoardDetector,
    board: &CalibrationBoard,
    path: &Path,
    right_path: Option<&Path>,
) -> Outcome {
    let left = detect_or_warn(detector, board, path);
    let image_size = left.as_ref().map(|d| d.image_size);
    let corners = left.and_then(|d| d.corners);

    let right_corners = match right_path {
        // A pair is only usable when both sides are found.
        Some(right) if corners.is_some() => {
            detect_or_warn(detector, board, right).and_then(|d| d.corners)
        }
        _ => None,
    };

    Outcome {
        corners,
        right_corners,
        image_size,
    }
}

/// Explicit calibration session over one board and one image set.
pub struct CalibrationSession {
    board: CalibrationBoard,
    detector: Box<dyn BoardDetector>,
    records: Vec<ImageRecord>,
    mode: Mode,
    mono_options: MonoOptions,
    stereo_options: StereoOptions,
    last: Option<SessionCalibration>,
}

impl fmt::Debug for CalibrationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalibrationSession")
            .field("board", &self.board.spec())
            .field("records", &self.records.len())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl CalibrationSession {
    pub fn new(board: CalibrationBoard, detector: Box<dyn BoardDetector>) -> Self {
        Self {
            board,
            detector,
            records: Vec::new(),
            mode: Mode::Mono,
            mono_options: MonoOptions::default(),
            stereo_options: StereoOptions::default(),
            last: None,
        }
    }

    /// Build from a [`SessionConfig`](crate::SessionConfig) with the default
    /// image-file detector.
    pub fn from_config(config: &crate::SessionConfig) -> Result<Self, CalibErr> {
        let detector = crate::detect::ImageFileDetector::new(config.detector.clone());
        let mut session = Self::new(config.board()?, Box::new(detector));
        session.mono_options = config.mono.clone();
        session.stereo_options = config.stereo.clone();
        Ok(session)
    }

    pub fn with_mono_options(mut self, options: MonoOptions) -> Self {
        self.mono_options = options;
        self
    }

    pub fn with_stereo_options(mut self, options: StereoOptions) -> Self {
        self.stereo_options = options;
        self
    }

    pub fn board(&self) -> &CalibrationBoard {
        &self.board
    }

    pub fn is_stereo(&self) -> bool {
        self.mode == Mode::Stereo
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn record(&self, id: ImageId) -> Option<&ImageRecord> {
        self.records.get(id.0)
    }

    /// Ids of records currently in `state`, in registration order.
    pub fn ids_in_state(&self, state: ImageState) -> Vec<ImageId> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == state)
            .map(|(i, _)| ImageId(i))
            .collect()
    }

    pub fn count(&self, state: ImageState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    /// Most recent successful calibration.
    pub fn last_calibration(&self) -> Option<&SessionCalibration> {
        self.last.as_ref()
    }

    fn reset_all(&mut self) {
        self.records.iter_mut().for_each(ImageRecord::reset);
        self.last = None;
    }

    fn switch_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            if !self.records.is_empty() {
                log::info!("switching to {mode:?} images, dropping {} records", self.records.len());
            }
            self.records.clear();
            self.mode = mode;
        }
    }

    /// Add images. Every record, old or new, goes back to `Pending`; paths
    /// already registered keep their id.
    pub fn register_images<I, P>(&mut self, paths: I) -> Vec<ImageId>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.switch_mode(Mode::Mono);
        self.reset_all();
        paths
            .into_iter()
            .map(|p| self.insert(p.into(), None))
            .collect()
    }

    /// Add synchronized `(left, right)` pairs; same reset rules as
    /// [`register_images`](Self::register_images).
    pub fn register_stereo_pairs<I, P>(&mut self, pairs: I) -> Vec<ImageId>
    where
        I: IntoIterator<Item = (P, P)>,
        P: Into<PathBuf>,
    {
        self.switch_mode(Mode::Stereo);
        self.reset_all();
        pairs
            .into_iter()
            .map(|(l, r)| self.insert(l.into(), Some(r.into())))
            .collect()
    }

    fn insert(&mut self, path: PathBuf, right_path: Option<PathBuf>) -> ImageId {
        if let Some(i) = self.records.iter().position(|r| r.path == path) {
            self.records[i].right_path = right_path;
            return ImageId(i);
        }
        self.records.push(ImageRecord::new(path, right_path));
        ImageId(self.records.len() - 1)
    }

    /// Replace the board; all records return to `Pending`.
    pub fn set_board(&mut self, board: CalibrationBoard) {
        self.board = board;
        self.reset_all();
    }

    pub fn detect_all(&mut self, parallel: bool) -> DetectSummary {
        self.detect_all_with_stop(parallel, &AtomicBool::new(false))
    }

    /// Detect every `Pending` record. `stop` is checked before each image is
    /// started; records not started stay `Pending`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, stop), fields(records = self.records.len()))
    )]
    pub fn detect_all_with_stop(&mut self, parallel: bool, stop: &AtomicBool) -> DetectSummary {
        let jobs: Vec<(usize, PathBuf, Option<PathBuf>)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == ImageState::Pending)
            .map(|(i, r)| (i, r.path.clone(), r.right_path.clone()))
            .collect();

        let detector = self.detector.as_ref();
        let board = &self.board;
        let run = |(i, path, right): &(usize, PathBuf, Option<PathBuf>)| {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            Some((*i, detect_record(detector, board, path, right.as_deref())))
        };
        let outcomes: Vec<Option<(usize, Outcome)>> = if parallel {
            jobs.par_iter().map(run).collect()
        } else {
            jobs.iter().map(run).collect()
        };

        let stereo = self.is_stereo();
        let mut summary = DetectSummary::default();
        for outcome in outcomes {
            let Some((i, outcome)) = outcome else {
                summary.skipped += 1;
                continue;
            };
            let record = &mut self.records[i];
            record.image_size = outcome.image_size;
            if outcome.found(stereo) {
                record.state = ImageState::Detected;
                record.detected_corners = outcome.corners;
                record.right_corners = outcome.right_corners;
                summary.detected += 1;
            } else {
                log::info!("{}: board not found, rejected", record.path.display());
                record.state = ImageState::Rejected;
                record.detected_corners = None;
                record.right_corners = None;
                summary.rejected += 1;
            }
        }

        log::info!(
            "detection: {} detected, {} rejected, {} skipped",
            summary.detected,
            summary.rejected,
            summary.skipped
        );
        summary
    }

    /// Calibrate from every `Detected`/`Calibrated` record and write poses and
    /// per-image errors back.
    ///
    /// On failure no earlier result survives: the last calibration is cleared
    /// and calibrated records fall back to `Detected` without a pose.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(records = self.records.len()))
    )]
    pub fn calibrate(&mut self) -> Result<SessionCalibration, CalibErr> {
        let outcome = self.solve_usable();
        if let Err(err) = &outcome {
            log::warn!("calibration failed: {err}");
            self.last = None;
            for record in &mut self.records {
                if record.state == ImageState::Calibrated {
                    record.state = ImageState::Detected;
                    record.clear_solution();
                }
            }
        }
        outcome
    }

    fn solve_usable(&mut self) -> Result<SessionCalibration, CalibErr> {
        let used: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state.is_usable() && r.detected_corners.is_some())
            .map(|(i, _)| i)
            .collect();
        if used.is_empty() {
            return Err(CalibErr::NoCorners);
        }

        let image_shape = self.image_shape(&used)?;
        let left: Vec<Vec<Point2<f64>>> = used
            .iter()
            .filter_map(|&i| self.records[i].detected_corners.clone())
            .collect();

        let (result, poses, errors) = match self.mode {
            Mode::Mono => {
                let r = calibrate_mono(&self.board, &left, image_shape, &self.mono_options)?;
                let poses = r.per_view_poses.clone();
                let errors = r.per_view_errors.clone();
                (SessionCalibration::Mono(r), poses, errors)
            }
            Mode::Stereo => {
                let right: Vec<Vec<Point2<f64>>> = used
                    .iter()
                    .filter_map(|&i| self.records[i].right_corners.clone())
                    .collect();
                let res =
                    calibrate_stereo(&self.board, &left, &right, image_shape, &self.stereo_options)?;
                let poses = res.left.per_view_poses.clone();
                let errors: Vec<f64> = res
                    .left
                    .per_view_errors
                    .iter()
                    .zip(&res.right.per_view_errors)
                    .map(|(l, r)| ((l * l + r * r) / 2.0).sqrt())
                    .collect();
                (SessionCalibration::Stereo(res), poses, errors)
            }
        };

        for (k, &i) in used.iter().enumerate() {
            let record = &mut self.records[i];
            record.pose = poses.get(k).copied();
            record.reprojection_error = errors.get(k).copied();
            record.state = ImageState::Calibrated;
        }
        log::info!(
            "calibrated from {} images, rms {:.4} px",
            used.len(),
            result.rms_error()
        );
        self.last = Some(result.clone());
        Ok(result)
    }

    fn image_shape(&self, used: &[usize]) -> Result<(u32, u32), CalibErr> {
        let mut sizes = used.iter().filter_map(|&i| self.records[i].image_size);
        let first = sizes.next().ok_or(CalibErr::NoCorners)?;
        if sizes.any(|s| s != first) {
            log::warn!("images differ in size, using {}x{}", first.0, first.1);
        }
        Ok(first)
    }

    fn record_mut(&mut self, id: ImageId) -> Result<&mut ImageRecord, CalibErr> {
        self.records
            .get_mut(id.0)
            .ok_or(CalibErr::UnknownImage { id: id.0 })
    }

    /// Reject one record and recalibrate from the rest.
    pub fn reject_and_recalibrate(&mut self, id: ImageId) -> Result<SessionCalibration, CalibErr> {
        let record = self.record_mut(id)?;
        record.state = ImageState::Rejected;
        record.clear_solution();
        log::info!("{}: rejected by caller", record.path.display());
        self.calibrate()
    }

    /// Set a detected record aside without recalibrating. Returns `false` when
    /// the record is not in a detected or calibrated state.
    pub fn exclude(&mut self, id: ImageId) -> Result<bool, CalibErr> {
        let record = self.record_mut(id)?;
        if !record.state.is_usable() {
            return Ok(false);
        }
        record.state = ImageState::Excluded;
        record.clear_solution();
        Ok(true)
    }

    /// Calibrated record with the highest reprojection error.
    pub fn worst_image(&self) -> Option<ImageId> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == ImageState::Calibrated)
            .filter_map(|(i, r)| r.reprojection_error.map(|e| (i, e)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| ImageId(i))
    }

    /// Write every record to `store`.
    pub fn persist(&self, store: &mut dyn RecordStore) -> Result<(), CalibErr> {
        for record in &self.records {
            store.set(StoredRecord::from_record(record))?;
        }
        Ok(())
    }
}
