use crate::assemble::assemble_board;
use crate::chess::detect_chess_corners;
use crate::corner::Corner;
use crate::params::{DetectorConfig, DetectorKind};
use crate::saddle::detect_saddle_corners;
use crate::subpix::refine_corners;
use camcal_core::{CalibErr, CalibrationBoard, GrayImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome of one detection attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `rows * cols` refined corners, row-major; `None` when the board was not found.
    pub corners: Option<Vec<Point2<f64>>>,
    /// `(width, height)` of the searched image.
    pub image_size: (u32, u32),
}

impl Detection {
    pub fn found(&self) -> bool {
        self.corners.is_some()
    }

    /// Corners, or [`CalibErr::CornerNotFound`].
    pub fn into_corners(self) -> Result<Vec<Point2<f64>>, CalibErr> {
        self.corners.ok_or(CalibErr::CornerNotFound)
    }
}

/// Checkerboard inner-corner detector for one board geometry.
#[derive(Clone, Debug)]
pub struct CornerDetector {
    rows: usize,
    cols: usize,
    config: DetectorConfig,
}

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

impl CornerDetector {
    pub fn new(board: &CalibrationBoard, config: DetectorConfig) -> Self {
        Self {
            rows: board.rows(),
            cols: board.cols(),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Raw corner candidates from the configured front end.
    pub fn raw_corners(&self, img: &image::GrayImage) -> Vec<Corner> {
        match self.config.kind {
            DetectorKind::Chess => detect_chess_corners(img, &self.config.chess),
            DetectorKind::Saddle => detect_saddle_corners(&gray_view(img), &self.config.saddle),
        }
    }

    /// Find the board's inner corners, row-major and index-aligned with
    /// [`CalibrationBoard::object_points`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, img), fields(width = img.width(), height = img.height()))
    )]
    pub fn detect(&self, img: &image::GrayImage) -> Detection {
        let image_size = (img.width(), img.height());
        let raw = self.raw_corners(img);
        log::debug!("{:?} front end: {} raw corners", self.config.kind, raw.len());

        let Some(grid) = assemble_board(&raw, self.rows, self.cols, &self.config.graph) else {
            return Detection {
                corners: None,
                image_size,
            };
        };

        let corners = if self.config.no_refine {
            grid.points
        } else {
            refine_corners(&gray_view(img), &grid.points, grid.spacing, &self.config.subpix)
        };
        log::info!(
            "board {}x{} found, spacing {:.1} px{}",
            self.rows,
            self.cols,
            grid.spacing,
            if grid.transposed { ", transposed" } else { "" }
        );

        Detection {
            corners: Some(corners),
            image_size,
        }
    }
}
