//! Frame ingestion sources.
//!
//! This module provides the sources the pipeline pulls frames from:
//! - Synthetic scenes (`stub://` URLs) for tests and dry runs
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Every source produces fixed-format RGB24 `Frame`s with increasing sequence
//! numbers. A source never reconnects by itself: once `read` fails with
//! `FrameUnavailable` the pipeline shuts down.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::error::TrackerResult;
use crate::frame::{Frame, FrameFormat};

pub use synthetic::{SyntheticScene, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A camera-like producer of frames.
pub trait FrameSource {
    /// Open the underlying device.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. Blocks until one is available.
    fn read(&mut self) -> TrackerResult<Frame>;

    /// Format of the frames `read` returns.
    fn format(&self) -> FrameFormat;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the device. Called once at pipeline shutdown.
    fn close(&mut self) {}
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://<name>` or a device path such as `/dev/video0`.
    pub url: String,
    /// Target frame rate (frames per second); 0 runs as fast as frames arrive.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Synthetic sources end after this many frames.
    pub max_frames: Option<u64>,
    pub scene: SyntheticScene,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            max_frames: None,
            scene: SyntheticScene::default(),
        }
    }
}

impl SourceConfig {
    pub fn format(&self) -> FrameFormat {
        FrameFormat::new(self.width, self.height)
    }
}

/// Build the source named by `config.url`. The source is not yet connected.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    if !config.url.contains("://") {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(Box::new(V4l2Source::new(config.clone())));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "camera device {} requires the ingest-v4l2 feature",
                config.url
            ));
        }
    }
    Err(anyhow!("unsupported frame source '{}'", config.url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_source() -> Result<()> {
        let mut source = open_source(&SourceConfig::default())?;
        source.connect()?;
        let frame = source.read()?;
        assert_eq!(frame.format(), FrameFormat::new(640, 480));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn network_urls_are_rejected() {
        let config = SourceConfig {
            url: "rtsp://camera-1/stream".to_string(),
            ..SourceConfig::default()
        };
        assert!(open_source(&config).is_err());
    }
}
