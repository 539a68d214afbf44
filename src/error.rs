//! Error taxonomy for the tracking pipeline.
//!
//! Per-cycle errors (`InvalidInput`, `DetectionFailed`, `Link`) are absorbed by
//! the pipeline. Only `FrameUnavailable` terminates a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// Frame does not match the fixed format a stage expects.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The detection capability failed; treated as "no detections".
    #[error("detection failed: {0}")]
    DetectionFailed(String),

    /// The frame source faulted or is exhausted.
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),

    /// Opening or writing the actuator link failed.
    #[error("actuator link error: {0}")]
    Link(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// True for errors that end the pipeline run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerError::FrameUnavailable(_))
    }
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;
