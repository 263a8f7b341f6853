use serde::{Deserialize, Serialize};

/// Neighbor search limits for the corner grid graph.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 400.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Iterative gradient-based subpixel refinement.
///
/// The nominal window is 19x19. On small boards that window would reach the
/// neighbouring corners, so by default it shrinks to `spacing_fraction` of the
/// corner spacing (never below 5x5). Set `spacing_fraction` to 0 to always use
/// the full `half_window`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubpixParams {
    /// Half size of the search window; 9 gives a 19x19 window.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once the per-iteration shift drops to this many pixels.
    pub eps: f64,
    /// Cap on the half window as a fraction of the corner spacing; `<= 0`
    /// disables the cap.
    pub spacing_fraction: f64,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 9,
            max_iters: 3000,
            eps: 1e-5,
            spacing_fraction: 0.4,
        }
    }
}

impl SubpixParams {
    /// Half window used for corners `spacing` pixels apart.
    pub fn half_window_for(&self, spacing: f64) -> usize {
        if self.spacing_fraction <= 0.0 {
            return self.half_window;
        }
        let cap = (self.spacing_fraction * spacing).floor().max(2.0) as usize;
        self.half_window.min(cap)
    }
}

/// ChESS front-end settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessParams {
    /// Response threshold relative to the strongest corner in the image.
    pub threshold_rel: f32,
    pub nms_radius: u32,
    /// Corners closer than this many pixels to the image border are dropped.
    pub border_margin: f32,
}

impl Default for ChessParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
            border_margin: 0.0,
        }
    }
}

/// Dense saddle-point detector settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SaddleParams {
    /// Gaussian pre-smoothing sigma in pixels.
    pub sigma: f32,
    /// Response threshold relative to the strongest saddle in the image.
    pub threshold_rel: f32,
    pub nms_radius: usize,
    /// Radius of the intensity ring that must alternate four times around an
    /// X-junction. Rejects T- and L-junctions on the board border.
    pub ring_radius: f32,
}

impl Default for SaddleParams {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            threshold_rel: 0.1,
            nms_radius: 3,
            ring_radius: 4.0,
        }
    }
}

/// Which raw corner locator feeds the grid assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// ChESS response via the `chess-corners` crate.
    #[default]
    Chess,
    /// Hessian saddle response computed densely over the image.
    Saddle,
}

/// Full detector configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub chess: ChessParams,
    pub saddle: SaddleParams,
    pub graph: GridGraphParams,
    pub subpix: SubpixParams,
    /// Skip subpixel refinement entirely.
    pub no_refine: bool,
}
