//! Gradient-orthogonality subpixel refinement.
//!
//! At the true corner `q`, every image gradient `g(p)` in the surrounding
//! window is orthogonal to `p − q`. Each iteration solves the weighted normal
//! equations `Σ w g gᵀ q = Σ w g gᵀ p` and re-centres the window on `q`.

use crate::params::SubpixParams;
use camcal_core::{gradient_bilinear, GrayImageView};
use nalgebra::Point2;

/// Refine one corner with a window of `half_window` pixels each side.
///
/// Returns `start` unchanged when the normal equations are degenerate or the
/// estimate drifts further than the window from where it began.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    half_window: usize,
    params: &SubpixParams,
) -> Point2<f64> {
    let hw = half_window.max(1) as i32;
    let inv_sigma2 = 1.0 / (hw * hw) as f64;
    let eps2 = params.eps * params.eps;
    let mut q = start;

    for _ in 0..params.max_iters.max(1) {
        let (mut a, mut b, mut c, mut bx, mut by) = (0.0f64, 0.0, 0.0, 0.0, 0.0);
        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let px = q.x + dx as f64;
                let py = q.y + dy as f64;
                let (gx, gy) = gradient_bilinear(img, px as f32, py as f32);
                let (gx, gy) = (gx as f64, gy as f64);
                let w = (-((dx * dx + dy * dy) as f64) * inv_sigma2).exp();

                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                a += gxx;
                b += gxy;
                c += gyy;
                bx += gxx * px + gxy * py;
                by += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
            return start;
        }
        let next = Point2::new((c * bx - b * by) / det, (a * by - b * bx) / det);
        let shift2 = (next - q).norm_squared();
        q = next;
        if shift2 <= eps2 {
            break;
        }
    }

    let limit = hw as f64;
    if (q.x - start.x).abs() > limit || (q.y - start.y).abs() > limit || !q.x.is_finite() || !q.y.is_finite() {
        return start;
    }
    q
}

/// Refine a batch with the window from [`SubpixParams::half_window_for`].
pub fn refine_corners(
    img: &GrayImageView<'_>,
    points: &[Point2<f64>],
    spacing: f64,
    params: &SubpixParams,
) -> Vec<Point2<f64>> {
    let half_window = params.half_window_for(spacing);
    log::trace!("subpixel refinement: {} corners, half window {half_window}", points.len());
    points
        .iter()
        .map(|&p| refine_corner(img, p, half_window, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    /// Anti-aliased X-junction centred at `(cx, cy)`.
    fn x_junction(cx: f64, cy: f64) -> GrayImage {
        GrayImage::from_fn(48, 48, |x, y| {
            let mut acc = 0.0f64;
            for sy in 0..4 {
                for sx in 0..4 {
                    let px = x as f64 + (sx as f64 + 0.5) / 4.0 - 0.5 - cx;
                    let py = y as f64 + (sy as f64 + 0.5) / 4.0 - 0.5 - cy;
                    acc += if (px < 0.0) == (py < 0.0) { 230.0 } else { 20.0 };
                }
            }
            (acc / 16.0).round() as u8
        })
    }

    #[test]
    fn converges_to_true_corner() {
        let (cx, cy) = (23.37, 24.71);
        let img = x_junction(cx, cy);
        let refined = refine_corner(
            &img.view(),
            Point2::new(22.0, 26.0),
            6,
            &SubpixParams::default(),
        );
        assert!((refined.x - cx).abs() < 0.1, "x {}", refined.x);
        assert!((refined.y - cy).abs() < 0.1, "y {}", refined.y);
    }

    #[test]
    fn flat_patch_keeps_start() {
        let img = GrayImage::from_fn(32, 32, |_, _| 90);
        let start = Point2::new(15.0, 15.0);
        let refined = refine_corner(&img.view(), start, 5, &SubpixParams::default());
        assert_eq!(refined, start);
    }

    #[test]
    fn window_cap_follows_the_spacing_fraction() {
        let params = SubpixParams::default();
        assert_eq!(params.half_window_for(100.0), 9);
        assert_eq!(params.half_window_for(10.0), 4);
        assert_eq!(params.half_window_for(3.0), 2);

        let fixed = SubpixParams {
            spacing_fraction: 0.0,
            ..Default::default()
        };
        assert_eq!(fixed.half_window_for(10.0), 9);
    }

    #[test]
    fn window_is_capped_by_spacing() {
        let (cx, cy) = (20.5, 21.25);
        let img = x_junction(cx, cy);
        let out = refine_corners(
            &img.view(),
            &[Point2::new(21.0, 21.0)],
            10.0,
            &SubpixParams::default(),
        );
        assert!((out[0].x - cx).abs() < 0.15);
        assert!((out[0].y - cy).abs() < 0.15);
    }
}
