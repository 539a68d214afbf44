//! Fixed-format frame buffers.
//!
//! - `FrameFormat`: width/height of an RGB24 image (3 interleaved 8-bit channels).
//! - `Frame`: owned pixel buffer plus the sequence number assigned by its source.
//!
//! Every stage that consumes pixels (detector gateway, overlay) checks the frame
//! against the `FrameFormat` it was configured with before touching bytes.


use crate::error::{TrackerError, TrackerResult};

/// Bytes per pixel for RGB24.
pub const FRAME_CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
}

impl FrameFormat {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Expected buffer length in bytes, `None` on overflow.
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(FRAME_CHANNELS))
    }

    /// Frame area in square pixels.
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn half_width(&self) -> f64 {
        self.width as f64 / 2.0
    }

    pub fn half_height(&self) -> f64 {
        self.height as f64 / 2.0
    }

    /// Reject `frame` unless it has exactly this format.
    pub fn check(&self, frame: &Frame) -> TrackerResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(TrackerError::InvalidInput(format!(
                "frame size {}x{} does not match expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// RGB24 frame, row-major.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source counter, starting at 1.
    pub sequence: u64,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the length disagrees with the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> TrackerResult<Self> {
        if width == 0 || height == 0 {
            return Err(TrackerError::InvalidInput(format!(
                "frame dimensions must be non-zero (got {}x{})",
                width, height
            )));
        }
        let expected = FrameFormat::new(width, height)
            .byte_len()
            .ok_or_else(|| TrackerError::InvalidInput("frame dimensions overflow".into()))?;
        if data.len() != expected {
            return Err(TrackerError::InvalidInput(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Solid-color frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> TrackerResult<Self> {
        let len = FrameFormat::new(width, height)
            .byte_len()
            .ok_or_else(|| TrackerError::InvalidInput("frame dimensions overflow".into()))?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len / FRAME_CHANNELS {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, sequence)
    }

    pub fn format(&self) -> FrameFormat {
        FrameFormat::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at `(x, y)`; `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let idx = self.index(x, y)?;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Overwrite the pixel at `(x, y)`; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if let Some(idx) = self.index(x, y) {
            self.data[idx..idx + FRAME_CHANNELS].copy_from_slice(&rgb);
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * FRAME_CHANNELS)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_length_mismatch() {
        let err = Frame::new(vec![0u8; 10], 2, 2, 1).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(Frame::new(Vec::new(), 0, 480, 1).is_err());
    }

    #[test]
    fn format_check_reports_mismatch() {
        let frame = Frame::filled(320, 240, [0, 0, 0], 1).unwrap();
        let expected = FrameFormat::new(640, 480);
        assert!(expected.check(&frame).is_err());
        assert!(frame.format().check(&frame).is_ok());
    }

    #[test]
    fn put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::filled(4, 4, [1, 2, 3], 1).unwrap();
        frame.put_pixel(10, 10, [9, 9, 9]);
        frame.put_pixel(1, 2, [200, 100, 50]);
        assert_eq!(frame.pixel(1, 2), Some([200, 100, 50]));
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(frame.pixel(4, 0), None);
    }
}
