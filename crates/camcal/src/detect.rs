//! Image-file front end for the corner detector.

use crate::core::CalibrationBoard;
use crate::corners::{CornerDetector, DetectorConfig, Detection};
use image::ImageReader;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced while turning a file or buffer into a detection.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },
}

/// Something that finds a board's corners in the image stored at a path.
///
/// The session runs one call per image on the rayon pool, so implementations
/// must be shareable across threads.
pub trait BoardDetector: Send + Sync {
    fn detect(&self, board: &CalibrationBoard, path: &Path) -> Result<Detection, DetectError>;
}

impl<F> BoardDetector for F
where
    F: Fn(&CalibrationBoard, &Path) -> Result<Detection, DetectError> + Send + Sync,
{
    fn detect(&self, board: &CalibrationBoard, path: &Path) -> Result<Detection, DetectError> {
        self(board, path)
    }
}

/// Load any format the `image` crate understands as 8-bit gray.
pub fn load_gray(path: &Path) -> Result<image::GrayImage, DetectError> {
    let reader = ImageReader::open(path).map_err(|source| DetectError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = reader.with_guessed_format().map_err(|source| DetectError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let img = reader.decode().map_err(|source| DetectError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_luma8())
}

/// Wrap a raw row-major 8-bit buffer.
pub fn gray_from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<image::GrayImage, DetectError> {
    let expected = width as usize * height as usize;
    let got = data.len();
    image::GrayImage::from_raw(width, height, data)
        .ok_or(DetectError::InvalidGrayBuffer { expected, got })
}

/// Default [`BoardDetector`]: decode with `image`, detect with
/// [`CornerDetector`].
#[derive(Clone, Debug, Default)]
pub struct ImageFileDetector {
    pub config: DetectorConfig,
}

impl ImageFileDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }
}

impl BoardDetector for ImageFileDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, board), fields(path = %path.display()))
    )]
    fn detect(&self, board: &CalibrationBoard, path: &Path) -> Result<Detection, DetectError> {
        let img = load_gray(path)?;
        let detection = CornerDetector::new(board, self.config.clone()).detect(&img);
        log::debug!(
            "{}: {}",
            path.display(),
            if detection.found() { "board found" } else { "board not found" }
        );
        Ok(detection)
    }
}
