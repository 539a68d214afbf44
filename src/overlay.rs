//! Annotated frames for remote viewing.
//!
//! The pipeline draws the followed box onto a copy of each frame and hands it
//! to an optional `FrameSink`. Streaming transports live outside this crate;
//! `SnapshotSink` covers the local case by keeping a JPEG on disk current.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::track::ActuatorState;

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const CENTER_COLOR: [u8; 3] = [255, 0, 0];
const STATUS_ON: [u8; 3] = [0, 200, 0];
const STATUS_OFF: [u8; 3] = [200, 0, 0];
const BOX_THICKNESS: u32 = 2;
const CENTER_RADIUS: i64 = 5;
const STATUS_BAR_HEIGHT: u32 = 8;
/// Gauge colors for base angle, shoulder angle and depth, top row first.
const READOUT_COLORS: [[u8; 3]; 3] = [[0, 255, 255], [255, 0, 255], [255, 255, 0]];
const READOUT_ROW_HEIGHT: i64 = 3;
const READOUT_GAP: i64 = 2;

/// Receives annotated frames.
pub trait FrameSink {
    fn publish(&mut self, frame: &Frame) -> Result<()>;
}

/// What to draw on one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct Annotation {
    pub tracking: bool,
    pub target: Option<BoundingBox>,
    /// Pose sent for `target`, drawn as gauges above the box.
    pub pose: Option<ActuatorState>,
}

/// Draw `annotation` onto `frame` in place.
pub fn annotate(frame: &mut Frame, annotation: &Annotation) {
    if let Some(bbox) = &annotation.target {
        draw_rect(frame, bbox, BOX_COLOR, BOX_THICKNESS);
        let (cx, cy) = bbox.center();
        fill_circle(frame, cx as i64, cy as i64, CENTER_RADIUS, CENTER_COLOR);
        if let Some(pose) = &annotation.pose {
            draw_readout(frame, bbox, pose);
        }
    }
    let color = if annotation.tracking {
        STATUS_ON
    } else {
        STATUS_OFF
    };
    let bar = STATUS_BAR_HEIGHT.min(frame.height);
    for y in 0..bar {
        for x in 0..frame.width {
            frame.put_pixel(x, y, color);
        }
    }
}

fn draw_rect(frame: &mut Frame, bbox: &BoundingBox, color: [u8; 3], thickness: u32) {
    let max_x = frame.width as i64 - 1;
    let max_y = frame.height as i64 - 1;
    let x0 = (bbox.x1 as i64).clamp(0, max_x);
    let y0 = (bbox.y1 as i64).clamp(0, max_y);
    let x1 = (bbox.x2 as i64).clamp(0, max_x);
    let y1 = (bbox.y2 as i64).clamp(0, max_y);
    for t in 0..thickness as i64 {
        let (xx0, yy0, xx1, yy1) = (x0 + t, y0 + t, x1 - t, y1 - t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            frame.put_pixel(x as u32, yy0 as u32, color);
            frame.put_pixel(x as u32, yy1 as u32, color);
        }
        for y in yy0..=yy1 {
            frame.put_pixel(xx0 as u32, y as u32, color);
            frame.put_pixel(xx1 as u32, y as u32, color);
        }
    }
}

/// One bar per actuator axis, filled to the axis value across the box width.
fn draw_readout(frame: &mut Frame, bbox: &BoundingBox, pose: &ActuatorState) {
    let fractions = [
        pose.angle_x as f64 / 180.0,
        pose.angle_y as f64 / 180.0,
        pose.depth.clamp(0.0, 1.0),
    ];
    let width = (bbox.x2 - bbox.x1) as f64;
    let top = bbox.y1 as i64 - READOUT_GAP - READOUT_ROW_HEIGHT * fractions.len() as i64;
    for (row, (fraction, color)) in fractions.iter().zip(READOUT_COLORS).enumerate() {
        let y0 = top + row as i64 * READOUT_ROW_HEIGHT;
        let x_end = bbox.x1 as i64 + (width * fraction).round() as i64;
        for y in y0.max(0)..y0 + READOUT_ROW_HEIGHT {
            for x in (bbox.x1 as i64).max(0)..x_end {
                frame.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn fill_circle(frame: &mut Frame, cx: i64, cy: i64, radius: i64, color: [u8; 3]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 {
                frame.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Writes the latest frame to a JPEG file, at most once per interval.
pub struct SnapshotSink {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    written: u64,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_write: None,
            written: 0,
        }
    }

    /// Snapshots written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for SnapshotSink {
    fn publish(&mut self, frame: &Frame) -> Result<()> {
        if self
            .last_write
            .is_some_and(|last| last.elapsed() < self.interval)
        {
            return Ok(());
        }
        // Failed writes are throttled like successful ones.
        self.last_write = Some(Instant::now());
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        image
            .save_with_format(&self.path, image::ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }
}
