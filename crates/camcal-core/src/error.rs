use crate::board::BoardError;

/// Errors produced by the calibration engine.
///
/// Per-image detection failures (`CornerNotFound`) and skipped validation pairs
/// (`SingularMatrix`) are normally absorbed by the caller; the remaining variants
/// are returned for a whole calibration attempt.
#[derive(thiserror::Error, Debug)]
pub enum CalibErr {
    #[error("checkerboard corners not found")]
    CornerNotFound,
    #[error("no usable corner sets for calibration")]
    NoCorners,
    #[error("size mismatch: expected {expected}, got {got}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("singular matrix in {context}")]
    SingularMatrix { context: &'static str },
    #[error("invalid camera parameter file: bad or missing field `{field}`")]
    InvalidCameraParameterFile { field: String },
    #[error("need at least {needed} samples, got {got}")]
    TooFewSamples { needed: usize, got: usize },
    #[error("quaternion norm is zero")]
    InvalidQuaternion,
    #[error("no image with id {id}")]
    UnknownImage { id: usize },
    #[error("optimization produced non-finite parameters")]
    Diverged,
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CalibErr {
    /// Shorthand for [`CalibErr::InvalidCameraParameterFile`].
    pub fn field(name: impl Into<String>) -> Self {
        Self::InvalidCameraParameterFile { field: name.into() }
    }
}
