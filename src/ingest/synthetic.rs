//! Synthetic frame source (`stub://`).
//!
//! Renders a solid square on a flat gray background. The square orbits the
//! frame center so the tracker has something to follow without a camera.

use anyhow::Result;
use rand::Rng;

use super::{FrameSource, SourceConfig, SourceStats};
use crate::error::{TrackerError, TrackerResult};
use crate::frame::{Frame, FrameFormat};

const BACKGROUND: [u8; 3] = [128, 128, 128];

/// What the synthetic camera looks at.
#[derive(Clone, Debug)]
pub struct SyntheticScene {
    pub target_rgb: [u8; 3],
    /// Side of the square in pixels.
    pub target_side: u32,
    /// Orbit radius around the frame center; 0 keeps the square still.
    pub orbit_radius: f64,
    pub degrees_per_frame: f64,
    /// Uniform random offset applied per frame, in pixels.
    pub jitter_px: u32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            target_rgb: [220, 30, 30],
            target_side: 100,
            orbit_radius: 120.0,
            degrees_per_frame: 2.0,
            jitter_px: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    /// Top-left corner of the square for frame `n`.
    fn target_origin(&self, n: u64) -> (i64, i64) {
        let scene = &self.config.scene;
        let angle = (n as f64 * scene.degrees_per_frame).to_radians();
        let cx = self.config.width as f64 / 2.0 + scene.orbit_radius * angle.cos();
        let cy = self.config.height as f64 / 2.0 + scene.orbit_radius * angle.sin();
        let half = scene.target_side as f64 / 2.0;
        let (mut x, mut y) = ((cx - half).round() as i64, (cy - half).round() as i64);
        if scene.jitter_px > 0 {
            let j = scene.jitter_px as i64;
            let mut rng = rand::thread_rng();
            x += rng.gen_range(-j..=j);
            y += rng.gen_range(-j..=j);
        }
        (x, y)
    }

    fn render(&self, n: u64) -> TrackerResult<Frame> {
        let (w, h) = (self.config.width, self.config.height);
        let mut frame = Frame::filled(w, h, BACKGROUND, n)?;
        let (x0, y0) = self.target_origin(n);
        let side = self.config.scene.target_side as i64;
        let x_range = x0.max(0)..(x0 + side).min(w as i64);
        let y_range = y0.max(0)..(y0 + side).min(h as i64);
        for y in y_range {
            for x in x_range.clone() {
                frame.put_pixel(x as u32, y as u32, self.config.scene.target_rgb);
            }
        }
        Ok(frame)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn read(&mut self) -> TrackerResult<Frame> {
        if !self.connected {
            return Err(TrackerError::FrameUnavailable(format!(
                "{} is not connected",
                self.config.url
            )));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Err(TrackerError::FrameUnavailable(format!(
                "{} exhausted after {} frames",
                self.config.url, self.frame_count
            )));
        }
        self.frame_count += 1;
        self.render(self.frame_count)
    }

    fn format(&self) -> FrameFormat {
        self.config.format()
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }

    fn close(&mut self) {
        if self.connected {
            self.connected = false;
            log::info!("SyntheticSource: {} closed", self.config.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still_config(max_frames: Option<u64>) -> SourceConfig {
        SourceConfig {
            url: "stub://test".to_string(),
            max_frames,
            scene: SyntheticScene {
                orbit_radius: 0.0,
                ..SyntheticScene::default()
            },
            ..SourceConfig::default()
        }
    }

    #[test]
    fn still_square_is_centered() -> Result<()> {
        let mut source = SyntheticSource::new(still_config(None));
        source.connect()?;
        let frame = source.read()?;
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.pixel(320, 240), Some([220, 30, 30]));
        assert_eq!(frame.pixel(270, 190), Some([220, 30, 30]));
        assert_eq!(frame.pixel(269, 240), Some(BACKGROUND));
        assert_eq!(frame.pixel(370, 240), Some(BACKGROUND));
        Ok(())
    }

    #[test]
    fn read_before_connect_fails() {
        let mut source = SyntheticSource::new(still_config(None));
        assert!(matches!(source.read(), Err(TrackerError::FrameUnavailable(_))));
    }

    #[test]
    fn bounded_source_runs_dry() -> Result<()> {
        let mut source = SyntheticSource::new(still_config(Some(2)));
        source.connect()?;
        source.read()?;
        source.read()?;
        let err = source.read().unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn orbiting_square_moves() {
        let config = SourceConfig {
            url: "stub://orbit".to_string(),
            scene: SyntheticScene {
                degrees_per_frame: 90.0,
                ..SyntheticScene::default()
            },
            ..SourceConfig::default()
        };
        let source = SyntheticSource::new(config);
        assert_ne!(source.target_origin(1), source.target_origin(2));
    }
}
