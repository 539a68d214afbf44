//! Local camera capture through V4L2.
//!
//! The driver is asked for RGB3 at the configured size. YUYV and NV12 are
//! converted when the driver insists on them; a different size is refused
//! because the mapper and detector are built for one frame format.

use anyhow::{anyhow, bail, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceConfig, SourceStats};
use crate::error::{TrackerError, TrackerResult};
use crate::frame::{Frame, FrameFormat};

const MMAP_BUFFERS: u32 = 4;

pub struct V4l2Source {
    config: SourceConfig,
    session: Option<Session>,
    frames: u64,
    last_frame_at: Option<Instant>,
    failing: bool,
}

/// An open device together with the stream borrowing it.
#[self_referencing]
struct OpenCamera {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, v4l::Device>,
}

struct Session {
    camera: OpenCamera,
    layout: PixelFormat,
}

impl V4l2Source {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            session: None,
            frames: 0,
            last_frame_at: None,
            failing: false,
        }
    }

    /// Frames may stall for six frame periods, never less than two seconds.
    fn stall_limit(&self) -> Duration {
        let period_ms = match self.config.target_fps {
            0 => 0,
            fps => 1000 / fps as u64,
        };
        Duration::from_millis((period_ms * 6).max(2_000))
    }

    fn negotiate(&self, device: &mut v4l::Device) -> Result<PixelFormat> {
        let url = &self.config.url;
        let mut wanted = device.format().context("query capture format")?;
        wanted.width = self.config.width;
        wanted.height = self.config.height;
        wanted.fourcc = v4l::FourCC::new(b"RGB3");

        let granted = device.set_format(&wanted).or_else(|err| {
            log::warn!("V4l2Source: {} rejected RGB3 {}x{}: {}", url, wanted.width, wanted.height, err);
            device.format().context("query capture format")
        })?;

        if (granted.width, granted.height) != (self.config.width, self.config.height) {
            bail!(
                "{} only offers {}x{} (configured {}x{})",
                url,
                granted.width,
                granted.height,
                self.config.width,
                self.config.height
            );
        }
        let layout = PixelFormat::from_fourcc(&granted.fourcc.repr)
            .ok_or_else(|| anyhow!("{} captures {}, which cannot be converted to RGB", url, granted.fourcc))?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Source: {} ignored {} fps: {}", url, self.config.target_fps, err);
            }
        }
        Ok(layout)
    }

    fn grab(&mut self) -> Result<Vec<u8>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("{} is not connected", self.config.url))?;
        let raw = session
            .camera
            .with_mut(|fields| fields.stream.next().map(|(buf, _)| buf.to_vec()))
            .context("dequeue buffer")?;
        normalize_to_rgb(&raw, self.config.width, self.config.height, session.layout)
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        let opened = v4l::Device::with_path(&self.config.url)
            .with_context(|| format!("open {}", self.config.url))
            .and_then(|mut device| Ok((self.negotiate(&mut device)?, device)));
        let (layout, device) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                self.failing = true;
                return Err(err);
            }
        };

        let camera = OpenCameraTryBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .context("map capture buffers")
            },
        }
        .try_build();
        let camera = match camera {
            Ok(camera) => camera,
            Err(err) => {
                self.failing = true;
                return Err(err);
            }
        };

        log::info!(
            "V4l2Source: streaming {} at {}x{} ({:?})",
            self.config.url,
            self.config.width,
            self.config.height,
            layout
        );
        self.session = Some(Session { camera, layout });
        self.failing = false;
        Ok(())
    }

    fn read(&mut self) -> TrackerResult<Frame> {
        let rgb = self.grab().map_err(|err| {
            self.failing = true;
            TrackerError::FrameUnavailable(format!("{}: {:#}", self.config.url, err))
        })?;
        self.failing = false;
        self.frames += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(rgb, self.config.width, self.config.height, self.frames)
    }

    fn format(&self) -> FrameFormat {
        self.config.format()
    }

    fn is_healthy(&self) -> bool {
        !self.failing
            && self
                .last_frame_at
                .map_or(true, |at| at.elapsed() <= self.stall_limit())
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames,
            source: self.config.url.clone(),
        }
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_connect() {
        let config = SourceConfig {
            url: "/dev/video-does-not-exist".to_string(),
            ..SourceConfig::default()
        };
        let mut source = V4l2Source::new(config);
        assert!(source.connect().is_err());
        assert!(!source.is_healthy());
        assert!(matches!(source.read(), Err(TrackerError::FrameUnavailable(_))));
    }
}
