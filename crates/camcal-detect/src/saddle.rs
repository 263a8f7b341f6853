//! Dense Hessian saddle-point corner front end.
//!
//! The image is smoothed with a separable Gaussian, the Hessian is taken by
//! finite differences and the response `max(0, Ixy² − Ixx·Iyy)` is positive
//! only where the two principal curvatures have opposite signs, which is the
//! signature of a checkerboard X-junction. Peaks survive a relative threshold
//! and square non-maximum suppression. A ring test on the raw image then
//! keeps only candidates with four light/dark alternations around them.

use crate::corner::Corner;
use crate::params::SaddleParams;
use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let sigma = sigma.max(0.1);
    let radius = (3.0 * sigma).ceil() as i32;
    let mut k: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = k.iter().sum();
    k.iter_mut().for_each(|v| *v /= sum);
    k
}

/// Separable Gaussian blur with edge clamping, as `f32`.
fn blur(src: &GrayImageView<'_>, sigma: f32) -> Vec<f32> {
    let (w, h) = (src.width, src.height);
    let k = gaussian_kernel(sigma);
    let r = (k.len() / 2) as i32;

    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            tmp[y * w + x] = k
                .iter()
                .enumerate()
                .map(|(i, kv)| kv * src.get_clamped(x as i32 + i as i32 - r, y as i32))
                .sum();
        }
    }

    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = k
                .iter()
                .enumerate()
                .map(|(i, kv)| {
                    let yy = (y as i32 + i as i32 - r).clamp(0, h as i32 - 1) as usize;
                    kv * tmp[yy * w + x]
                })
                .sum();
        }
    }
    out
}

struct SaddleMap {
    width: usize,
    height: usize,
    response: Vec<f32>,
    orientation: Vec<f32>,
}

fn saddle_map(smooth: &[f32], width: usize, height: usize) -> SaddleMap {
    let mut response = vec![0.0f32; width * height];
    let mut orientation = vec![0.0f32; width * height];
    let at = |x: usize, y: usize| smooth[y * width + x];

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let c = at(x, y);
            let ixx = at(x + 1, y) - 2.0 * c + at(x - 1, y);
            let iyy = at(x, y + 1) - 2.0 * c + at(x, y - 1);
            let ixy = 0.25
                * (at(x + 1, y + 1) - at(x + 1, y - 1) - at(x - 1, y + 1) + at(x - 1, y - 1));

            let idx = y * width + x;
            response[idx] = (ixy * ixy - ixx * iyy).max(0.0);
            // Axis of the positive curvature: the bright diagonal.
            orientation[idx] = 0.5 * (2.0 * ixy).atan2(ixx - iyy);
        }
    }

    SaddleMap {
        width,
        height,
        response,
        orientation,
    }
}

fn non_max_suppression(map: &SaddleMap, threshold: f32, radius: usize) -> Vec<Corner> {
    let (w, h) = (map.width, map.height);
    let r = radius as i64;
    let mut out = Vec::new();

    for y in 1..h.saturating_sub(1) {
        'pixel: for x in 1..w.saturating_sub(1) {
            let idx = y * w + x;
            let v = map.response[idx];
            if v <= threshold {
                continue;
            }
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    let nv = map.response[nidx];
                    // Ties go to the earlier pixel in scan order.
                    if nv > v || (nv == v && nidx < idx) {
                        continue 'pixel;
                    }
                }
            }
            out.push(Corner {
                position: Point2::new(x as f32, y as f32),
                orientation: map.orientation[idx],
                strength: v,
            });
        }
    }
    out
}

const RING_SAMPLES: usize = 24;

/// Number of sign changes of `I − mean` on a circle around `(x, y)`.
fn ring_alternations(img: &GrayImageView<'_>, x: f32, y: f32, radius: f32) -> usize {
    let samples: Vec<f32> = (0..RING_SAMPLES)
        .map(|k| {
            let a = k as f32 * std::f32::consts::TAU / RING_SAMPLES as f32;
            sample_bilinear(img, x + radius * a.cos(), y + radius * a.sin())
        })
        .collect();
    let mean = samples.iter().sum::<f32>() / RING_SAMPLES as f32;
    let signs: Vec<bool> = samples.iter().map(|v| *v > mean).collect();
    (0..RING_SAMPLES)
        .filter(|&k| signs[k] != signs[(k + 1) % RING_SAMPLES])
        .count()
}

/// Saddle-point corners over the whole image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(width = img.width, height = img.height))
)]
pub fn detect_saddle_corners(img: &GrayImageView<'_>, params: &SaddleParams) -> Vec<Corner> {
    if img.width < 3 || img.height < 3 {
        return Vec::new();
    }
    let smooth = blur(img, params.sigma);
    let map = saddle_map(&smooth, img.width, img.height);
    let max = map.response.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let mut corners = non_max_suppression(&map, params.threshold_rel * max, params.nms_radius);
    let before = corners.len();
    corners.retain(|c| ring_alternations(img, c.position.x, c.position.y, params.ring_radius) == 4);
    log::debug!(
        "saddle detector: {} candidates, {} pass the ring test",
        before,
        corners.len()
    );
    corners
}
