//! Per-cycle tracking stages: selection, smoothing, mapping.
//!
//! All three are plain values with no interior state. The pipeline owns the
//! `TrackState` and threads it through `PositionFilter::apply` explicitly.

mod filter;
mod mapper;
mod select;

pub use filter::{PixelOffset, PositionFilter, TrackState};
pub use mapper::{
    norm_to_angle, ActuatorState, CoordinateMapper, GripperState, ANGLE_MAX, ANGLE_MIN,
    DEFAULT_GRIP_THRESHOLD, DEFAULT_MAX_AREA_RATIO, DEFAULT_MIN_AREA,
};
pub use select::TargetSelector;
