//! Checkerboard inner-corner detection.
//!
//! Pipeline:
//! 1. Raw X-junction candidates from either the ChESS response
//!    (`chess-corners`) or a dense Hessian saddle response.
//! 2. A KD-tree neighbor graph keeps edges whose endpoints have orthogonal
//!    orientations and whose direction sits at ~45° to both.
//! 3. BFS assigns integer grid coordinates per connected component; the
//!    component holding exactly one full board-sized window wins.
//! 4. Corners are ordered row-major (rotated by 90° for a transposed board)
//!    and refined to subpixel accuracy.
//!
//! ```no_run
//! use camcal_core::CalibrationBoard;
//! use camcal_detect::{CornerDetector, DetectorConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = image::ImageReader::open("board.png")?.decode()?.to_luma8();
//! let board = CalibrationBoard::with_size(9, 12, 20.0)?;
//! let detection = CornerDetector::new(&board, DetectorConfig::default()).detect(&img);
//! println!("found: {}", detection.found());
//! # Ok(())
//! # }
//! ```

mod assemble;
mod chess;
mod corner;
mod detector;
mod gridgraph;
mod params;
mod render;
mod saddle;
mod subpix;

pub use assemble::{assemble_board, BoardGrid};
pub use chess::detect_chess_corners;
pub use corner::Corner;
pub use detector::{gray_view, CornerDetector, Detection};
pub use gridgraph::{GridGraph, Link, Step};
pub use params::{
    ChessParams, DetectorConfig, DetectorKind, GridGraphParams, SaddleParams, SubpixParams,
};
pub use render::{project_board, render_board, RenderParams};
pub use saddle::detect_saddle_corners;
pub use subpix::{refine_corner, refine_corners};
