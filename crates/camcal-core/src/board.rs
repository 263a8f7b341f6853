//! Planar checkerboard layout.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Static board description.
///
/// `rows`/`cols` are **inner corner** counts, `cell_size` is the square edge in
/// millimetres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub rows: u32,
    pub cols: u32,
    pub cell_size: f64,
}

/// Board specification validation errors.
#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("rows and cols must be >= 2")]
    InvalidSize,
    #[error("cell_size must be finite and > 0")]
    InvalidCellSize,
}

/// Validated checkerboard with its object points.
///
/// Object points lie on the Z=0 plane in row-major order: index `r * cols + c`
/// sits at `(c * cell_size, r * cell_size, 0)`.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationBoard {
    spec: BoardSpec,
    object_points: Vec<Point3<f64>>,
}

impl CalibrationBoard {
    pub fn new(spec: BoardSpec) -> Result<Self, BoardError> {
        if spec.rows < 2 || spec.cols < 2 {
            return Err(BoardError::InvalidSize);
        }
        if !spec.cell_size.is_finite() || spec.cell_size <= 0.0 {
            return Err(BoardError::InvalidCellSize);
        }

        let mut object_points = Vec::with_capacity((spec.rows * spec.cols) as usize);
        for r in 0..spec.rows {
            for c in 0..spec.cols {
                object_points.push(Point3::new(
                    c as f64 * spec.cell_size,
                    r as f64 * spec.cell_size,
                    0.0,
                ));
            }
        }

        Ok(Self {
            spec,
            object_points,
        })
    }

    /// Convenience constructor from inner-corner counts and square size (mm).
    pub fn with_size(rows: u32, cols: u32, cell_size: f64) -> Result<Self, BoardError> {
        Self::new(BoardSpec {
            rows,
            cols,
            cell_size,
        })
    }

    #[inline]
    pub fn spec(&self) -> BoardSpec {
        self.spec
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.spec.rows as usize
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.spec.cols as usize
    }

    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.spec.cell_size
    }

    /// Number of inner corners, i.e. the required length of every corner set.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.object_points.len()
    }

    #[inline]
    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    /// Row-major index of the inner corner at `(row, col)`.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows() && col < self.cols()).then(|| row * self.cols() + col)
    }
}
