//! Error types for the portfolio policy.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for portfolio policy operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Debug, Error)]
pub enum PortfolioError {
    /// A feed matrix does not match the dimensions the model was built for
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("empty trajectory: a feed needs at least one timestep")]
    EmptyTrajectory,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid feed parameter: {0}")]
    InvalidFeed(String),

    #[error("invalid data in {}: {message}", .path.display())]
    InvalidData { path: PathBuf, message: String },

    #[error("checkpoint not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("unknown objective `{0}` (expected reward, sharpe or sortino)")]
    UnknownObjective(String),

    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("array shape error: {0}")]
    Array(#[from] ndarray::ShapeError),
}

impl PortfolioError {
    pub fn shape_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}
