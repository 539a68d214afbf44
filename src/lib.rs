//! Camera-guided actuator tracking.
//!
//! This crate drives a pan/tilt or pick-style arm from a video stream: it
//! locates a target object in each frame and turns its screen position into
//! serial commands for the arm controller.
//!
//! # Architecture
//!
//! The frame loop and the detector run on separate threads and share exactly
//! one value: a single-slot handoff of the newest detection result.
//!
//! 1. **Cadence**: the loop only blocks on the camera and the serial write.
//! 2. **Drop, never queue**: frames offered while detection runs are dropped.
//! 3. **Freshest result wins**: an unfetched result is replaced by a newer one.
//! 4. **Optional hardware**: a missing serial port degrades to headless mode.
//!
//! # Module Structure
//!
//! - `frame`: fixed-format RGB frames
//! - `ingest`: frame sources (synthetic, V4L2)
//! - `detect`: detector backends, gateway, background worker
//! - `track`: target selection, smoothing, pixel-to-angle mapping
//! - `actuator`: wire format and serial link
//! - `overlay`: annotated frames and sinks
//! - `pipeline`: the orchestrating loop

pub mod actuator;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod track;

pub use actuator::{ActuatorChannel, ActuatorCommand, Link, SendOutcome, SerialSettings};
pub use config::TrackerConfig;
pub use detect::{
    BackendRegistry, BoundingBox, DetectedObject, DetectionResult, DetectionWorker,
    DetectorBackend, DetectorGateway,
};
pub use error::{TrackerError, TrackerResult};
pub use frame::{Frame, FrameFormat};
pub use ingest::{open_source, FrameSource, SourceConfig};
pub use pipeline::{CycleOutcome, CycleReport, Pipeline};
pub use track::{ActuatorState, CoordinateMapper, GripperState, PositionFilter, TargetSelector, TrackState};
