use crate::core::{BoardSpec, CalibErr, CalibrationBoard};
use crate::corners::DetectorConfig;
use crate::solve::{MonoOptions, StereoOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a session or CLI run needs besides the images.
///
/// Only `board` is required in JSON:
///
/// ```json
/// { "board": { "rows": 9, "cols": 12, "cell_size": 20.0 },
///   "detector": { "kind": "saddle" } }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub board: BoardSpec,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub mono: MonoOptions,
    #[serde(default)]
    pub stereo: StereoOptions,
    /// Detect on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

impl SessionConfig {
    pub fn new(board: BoardSpec) -> Self {
        Self {
            board,
            detector: DetectorConfig::default(),
            mono: MonoOptions::default(),
            stereo: StereoOptions::default(),
            parallel: default_parallel(),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self, CalibErr> {
        crate::io::load_json(path)
    }

    /// Validated board.
    pub fn board(&self) -> Result<CalibrationBoard, CalibErr> {
        Ok(CalibrationBoard::new(self.board)?)
    }
}
