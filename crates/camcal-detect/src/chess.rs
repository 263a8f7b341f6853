//! ChESS front end on top of `chess-corners`.

use crate::corner::Corner;
use crate::params::ChessParams;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

impl From<&CornerDescriptor> for Corner {
    fn from(c: &CornerDescriptor) -> Self {
        Corner {
            position: Point2::new(c.x, c.y),
            orientation: c.orientation,
            strength: c.response,
        }
    }
}

/// Single-scale `chess-corners` configuration for `params`.
pub(crate) fn chess_config(params: &ChessParams) -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = params.threshold_rel;
    cfg.params.nms_radius = params.nms_radius;
    cfg
}

fn clear_of_border(p: &Point2<f32>, width: f32, height: f32, margin: f32) -> bool {
    p.x >= margin && p.y >= margin && p.x <= width - 1.0 - margin && p.y <= height - 1.0 - margin
}

/// Raw ChESS corners over the whole image, minus the border band.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(width = img.width(), height = img.height()))
)]
pub fn detect_chess_corners(img: &image::GrayImage, params: &ChessParams) -> Vec<Corner> {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let margin = params.border_margin.max(0.0);
    find_chess_corners_image(img, &chess_config(params))
        .iter()
        .map(Corner::from)
        .filter(|c| clear_of_border(&c.position, w, h, margin))
        .collect()
}
