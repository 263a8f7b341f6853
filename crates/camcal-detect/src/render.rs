//! Synthetic checkerboard images.
//!
//! Every pixel is mapped back to the board plane through the inverse of a
//! plane-to-image homography and supersampled on a regular sub-grid. Squares
//! alternate starting with a dark square at the top-left outer cell; a light
//! quiet zone surrounds the squares.

use camcal_core::{CalibrationBoard, Homography};
use image::{GrayImage, Luma};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Appearance of a rendered board.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderParams {
    /// Sub-samples per pixel along each axis.
    pub supersample: u32,
    pub dark: u8,
    pub light: u8,
    /// Value outside the quiet zone.
    pub background: u8,
    /// Quiet zone width in cells.
    pub quiet_zone: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            supersample: 4,
            dark: 30,
            light: 220,
            background: 160,
            quiet_zone: 1.0,
        }
    }
}

/// Image positions of the board's inner corners under `plane_to_image`.
pub fn project_board(board: &CalibrationBoard, plane_to_image: &Homography) -> Vec<Point2<f64>> {
    board
        .object_points()
        .iter()
        .map(|p| plane_to_image.apply(Point2::new(p.x, p.y)))
        .collect()
}

/// Render `board` seen through `plane_to_image` (board mm to pixels).
///
/// Returns `None` when the homography cannot be inverted.
pub fn render_board(
    board: &CalibrationBoard,
    plane_to_image: &Homography,
    width: u32,
    height: u32,
    params: &RenderParams,
) -> Option<GrayImage> {
    let image_to_plane = plane_to_image.inverse()?;
    let s = board.cell_size();
    let (cols, rows) = (board.cols() as f64, board.rows() as f64);
    let qz = params.quiet_zone.max(0.0) * s;
    let n = params.supersample.max(1);
    let inv = 1.0 / n as f64;

    let shade = |x: f64, y: f64| -> f64 {
        // Squares span one cell beyond the outermost inner corners.
        let inside = |lo: f64, hi: f64, v: f64| v >= lo && v < hi;
        if inside(-s, cols * s, x) && inside(-s, rows * s, y) {
            let (i, j) = ((x / s).floor() as i64, (y / s).floor() as i64);
            if (i + j).rem_euclid(2) == 0 {
                params.dark as f64
            } else {
                params.light as f64
            }
        } else if inside(-s - qz, cols * s + qz, x) && inside(-s - qz, rows * s + qz, y) {
            params.light as f64
        } else {
            params.background as f64
        }
    };

    let mut img = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for sy in 0..n {
                for sx in 0..n {
                    let px = x as f64 + (sx as f64 + 0.5) * inv - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) * inv - 0.5;
                    let q = image_to_plane.apply(Point2::new(px, py));
                    acc += if q.x.is_finite() && q.y.is_finite() {
                        shade(q.x, q.y)
                    } else {
                        params.background as f64
                    };
                }
            }
            let v = (acc / (n * n) as f64).round().clamp(0.0, 255.0) as u8;
            img.put_pixel(x, y, Luma([v]));
        }
    }
    Some(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    #[test]
    fn axis_aligned_board_has_expected_squares() {
        let board = CalibrationBoard::with_size(3, 4, 10.0).expect("board");
        // 2 px per mm, inner corner (0, 0) at pixel (40, 40).
        let h = Homography::new(Matrix3::new(2.0, 0.0, 40.0, 0.0, 2.0, 40.0, 0.0, 0.0, 1.0));
        let img = render_board(&board, &h, 160, 140, &RenderParams::default()).expect("render");

        // Outer top-left square is dark, its right neighbor light.
        assert_eq!(img.get_pixel(30, 30)[0], 30);
        assert_eq!(img.get_pixel(50, 30)[0], 220);
        // Quiet zone (one cell, out to -20 mm) and background past it.
        assert_eq!(img.get_pixel(10, 30)[0], 220);
        assert_eq!(img.get_pixel(2, 2)[0], 220);
        assert_eq!(img.get_pixel(150, 130)[0], 160);

        let pts = project_board(&board, &h);
        assert_eq!(pts.len(), 12);
        assert_eq!(pts[5], Point2::new(60.0, 60.0));
    }

    #[test]
    fn quiet_zone_width_follows_params() {
        let board = CalibrationBoard::with_size(3, 4, 10.0).expect("board");
        let h = Homography::new(Matrix3::new(2.0, 0.0, 40.0, 0.0, 2.0, 40.0, 0.0, 0.0, 1.0));
        let params = RenderParams {
            quiet_zone: 0.5,
            ..Default::default()
        };
        let img = render_board(&board, &h, 160, 140, &params).expect("render");

        // Pixel (2, 2) is plane (-19, -19) mm, past a -15 mm quiet zone.
        assert_eq!(img.get_pixel(2, 2)[0], 160);
        assert_eq!(img.get_pixel(12, 30)[0], 220);
    }

    #[test]
    fn singular_homography_is_none() {
        let board = CalibrationBoard::with_size(3, 4, 10.0).expect("board");
        let h = Homography::new(Matrix3::zeros());
        assert!(render_board(&board, &h, 8, 8, &RenderParams::default()).is_none());
    }
}
