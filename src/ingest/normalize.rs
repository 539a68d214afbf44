//! Camera pixel layouts to RGB24.

use anyhow::{anyhow, ensure, Result};

/// Layouts a V4L2 camera may hand back instead of the RGB3 we ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
    /// Planar luma followed by interleaved 2x2-subsampled `U V`.
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }

    /// Bytes a full frame occupies in this layout.
    fn frame_len(self, width: usize, height: usize) -> Option<usize> {
        let pixels = width.checked_mul(height)?;
        match self {
            Self::Rgb24 => pixels.checked_mul(3),
            Self::Yuyv => pixels.checked_mul(2),
            Self::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

/// Convert one captured buffer to tightly packed RGB24.
///
/// Drivers may pad the mmap buffer past the frame, so trailing bytes are
/// ignored; a short buffer is an error.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let needed = format
        .frame_len(w, h)
        .ok_or_else(|| anyhow!("{}x{} frame does not fit in memory", width, height))?;
    ensure!(
        pixels.len() >= needed,
        "{:?} buffer holds {} bytes, {}x{} needs {}",
        format,
        pixels.len(),
        width,
        height,
        needed
    );
    let pixels = &pixels[..needed];

    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Yuyv => {
            ensure!(w % 2 == 0, "YUYV needs an even width, got {}", width);
            let mut rgb = Vec::with_capacity(w * h * 3);
            for quad in pixels.chunks_exact(4) {
                rgb.extend_from_slice(&ycbcr_to_rgb(quad[0], quad[1], quad[3]));
                rgb.extend_from_slice(&ycbcr_to_rgb(quad[2], quad[1], quad[3]));
            }
            Ok(rgb)
        }
        PixelFormat::Nv12 => {
            let (luma, chroma) = pixels.split_at(w * h);
            let mut rgb = Vec::with_capacity(w * h * 3);
            for (row, luma_row) in luma.chunks_exact(w).enumerate() {
                let chroma_row = &chroma[(row / 2) * w..];
                for (col, &y) in luma_row.iter().enumerate() {
                    let uv = (col / 2) * 2;
                    rgb.extend_from_slice(&ycbcr_to_rgb(y, chroma_row[uv], chroma_row[uv + 1]));
                }
            }
            Ok(rgb)
        }
    }
}

/// Full-range BT.601.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        to_u8(y + 1.402 * cr),
        to_u8(y - 0.344_136 * cb - 0.714_136 * cr),
        to_u8(y + 1.772 * cb),
    ]
}
