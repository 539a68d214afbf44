use std::fmt;

use crate::detect::BoundingBox;
use crate::error::{TrackerError, TrackerResult};
use crate::frame::FrameFormat;
use crate::track::filter::PixelOffset;

pub const ANGLE_MIN: u8 = 0;
pub const ANGLE_MAX: u8 = 180;
pub const DEFAULT_MIN_AREA: f64 = 2000.0;
pub const DEFAULT_MAX_AREA_RATIO: f64 = 0.6;
pub const DEFAULT_GRIP_THRESHOLD: f64 = 0.10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GripperState {
    Open,
    Close,
}

impl fmt::Display for GripperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GripperState::Open => f.write_str("OPEN"),
            GripperState::Close => f.write_str("CLOSE"),
        }
    }
}

/// Actuator pose for one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActuatorState {
    /// Base rotation, 0..=180.
    pub angle_x: u8,
    /// Shoulder elevation, 0..=180.
    pub angle_y: u8,
    /// 0.0 (touching) ..= 1.0 (far).
    pub depth: f64,
    pub gripper: GripperState,
}

/// Stateless pixel-space to actuator-space mapping.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper {
    format: FrameFormat,
    min_area: f64,
    max_area: f64,
    grip_threshold: f64,
}

impl CoordinateMapper {
    /// Mapper with the default area bounds: 2000 px² up to 60% of the frame.
    pub fn new(format: FrameFormat) -> TrackerResult<Self> {
        Self::with_bounds(
            format,
            DEFAULT_MIN_AREA,
            format.area() * DEFAULT_MAX_AREA_RATIO,
            DEFAULT_GRIP_THRESHOLD,
        )
    }

    pub fn with_bounds(
        format: FrameFormat,
        min_area: f64,
        max_area: f64,
        grip_threshold: f64,
    ) -> TrackerResult<Self> {
        if format.width == 0 || format.height == 0 {
            return Err(TrackerError::Config("frame dimensions must be non-zero".into()));
        }
        if !(min_area.is_finite() && max_area.is_finite() && min_area >= 0.0 && min_area < max_area) {
            return Err(TrackerError::Config(format!(
                "area bounds must satisfy 0 <= min < max (got min={}, max={})",
                min_area, max_area
            )));
        }
        if !(0.0..=1.0).contains(&grip_threshold) {
            return Err(TrackerError::Config(format!(
                "grip threshold must lie in [0, 1], got {}",
                grip_threshold
            )));
        }
        Ok(Self {
            format,
            min_area,
            max_area,
            grip_threshold,
        })
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Offset of the box center from the frame center.
    pub fn center_offset(&self, bbox: &BoundingBox) -> PixelOffset {
        let (cx, cy) = bbox.center();
        PixelOffset::new(cx - self.format.half_width(), cy - self.format.half_height())
    }

    /// Base and shoulder angles for a smoothed offset.
    ///
    /// The vertical axis is flipped so a target above center raises the angle.
    pub fn angles(&self, offset: PixelOffset) -> (u8, u8) {
        let nx = offset.dx / self.format.half_width();
        let ny = offset.dy / self.format.half_height();
        (norm_to_angle(nx), norm_to_angle(-ny))
    }

    /// Inverse-area distance proxy in `[0, 1]`.
    pub fn depth(&self, area: f64) -> f64 {
        let area = area.clamp(self.min_area, self.max_area);
        let depth = 1.0 - (area - self.min_area) / (self.max_area - self.min_area);
        depth.clamp(0.0, 1.0)
    }

    pub fn gripper(&self, depth: f64) -> GripperState {
        if depth < self.grip_threshold {
            GripperState::Close
        } else {
            GripperState::Open
        }
    }

    pub fn map(&self, offset: PixelOffset, bbox: &BoundingBox) -> ActuatorState {
        let (angle_x, angle_y) = self.angles(offset);
        let depth = self.depth(bbox.area() as f64);
        ActuatorState {
            angle_x,
            angle_y,
            depth,
            gripper: self.gripper(depth),
        }
    }
}

/// `[-1, 1]` to a servo angle, rounded and clamped to `0..=180`.
pub fn norm_to_angle(norm: f64) -> u8 {
    if norm.is_nan() {
        return ANGLE_MAX / 2;
    }
    let angle = (((norm + 1.0) / 2.0) * ANGLE_MAX as f64).round();
    angle.clamp(ANGLE_MIN as f64, ANGLE_MAX as f64) as u8
}
