use anyhow::{anyhow, Result};
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, DetectedObject, DetectionResult};
use crate::frame::Frame;

/// Inclusive HSV band in 8-bit OpenCV convention (H 0..=180, S/V 0..=255).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvBand {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvBand {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// One or two HSV bands. Red needs two because its hue wraps around 180.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorRange {
    pub primary: HsvBand,
    pub secondary: Option<HsvBand>,
}

impl ColorRange {
    pub const RED: ColorRange = ColorRange {
        primary: HsvBand::new([0, 50, 50], [10, 255, 255]),
        secondary: Some(HsvBand::new([170, 50, 50], [180, 255, 255])),
    };
    pub const ORANGE: ColorRange = ColorRange::single([11, 100, 100], [25, 255, 255]);
    pub const YELLOW: ColorRange = ColorRange::single([26, 100, 100], [35, 255, 255]);
    pub const GREEN: ColorRange = ColorRange::single([36, 50, 50], [85, 255, 255]);
    pub const LIGHT_BLUE: ColorRange = ColorRange::single([86, 50, 50], [100, 255, 255]);
    pub const BLUE: ColorRange = ColorRange::single([101, 50, 50], [130, 255, 255]);
    pub const VIOLET: ColorRange = ColorRange::single([131, 50, 50], [145, 255, 255]);
    pub const PURPLE: ColorRange = ColorRange::single([146, 50, 50], [160, 255, 255]);
    pub const PINK: ColorRange = ColorRange::single([161, 50, 50], [169, 255, 255]);
    pub const GRAY: ColorRange = ColorRange::single([0, 0, 40], [180, 18, 230]);
    pub const BLACK: ColorRange = ColorRange::single([0, 0, 0], [180, 255, 50]);
    pub const WHITE: ColorRange = ColorRange::single([0, 0, 200], [180, 30, 255]);
    pub const BROWN: ColorRange = ColorRange {
        primary: HsvBand::new([10, 100, 20], [20, 255, 200]),
        secondary: Some(HsvBand::new([10, 50, 50], [25, 255, 200])),
    };
    pub const BEIGE: ColorRange = ColorRange::single([5, 20, 130], [30, 120, 255]);

    pub const fn single(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            primary: HsvBand::new(lower, upper),
            secondary: None,
        }
    }

    /// Look up a named preset.
    pub fn preset(name: &str) -> Option<Self> {
        let range = match name.to_ascii_lowercase().as_str() {
            "red" => Self::RED,
            "orange" => Self::ORANGE,
            "yellow" => Self::YELLOW,
            "green" => Self::GREEN,
            "light_blue" => Self::LIGHT_BLUE,
            "blue" => Self::BLUE,
            "violet" => Self::VIOLET,
            "purple" => Self::PURPLE,
            "pink" => Self::PINK,
            "gray" | "grey" => Self::GRAY,
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "brown" => Self::BROWN,
            "beige" => Self::BEIGE,
            _ => return None,
        };
        Some(range)
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        self.primary.contains(hsv) || self.secondary.is_some_and(|band| band.contains(hsv))
    }
}

pub const DEFAULT_MIN_PIXELS: u64 = 1500;

/// Color-segmentation backend.
///
/// Marks every pixel whose HSV value falls in the configured range, splits the
/// mask into 8-connected blobs and reports each blob of at least `min_pixels`
/// pixels as its own object, in raster order of the blob's first pixel.
/// Confidence is the share of the blob's box that is marked.
pub struct ColorBackend {
    name: &'static str,
    label: String,
    range: ColorRange,
    min_pixels: u64,
}

impl ColorBackend {
    pub fn new(label: impl Into<String>, range: ColorRange) -> Self {
        Self {
            name: "color",
            label: label.into(),
            range,
            min_pixels: DEFAULT_MIN_PIXELS,
        }
    }

    /// Build from a preset name; the preset name doubles as the label.
    pub fn from_preset(name: &str) -> Result<Self> {
        let range =
            ColorRange::preset(name).ok_or_else(|| anyhow!("unknown color preset '{}'", name))?;
        Ok(Self::new(name.to_ascii_lowercase(), range))
    }

    /// Override the registry name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Report under a different label than the preset name.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Minimum pixels a single blob needs to be reported.
    pub fn with_min_pixels(mut self, min_pixels: u64) -> Self {
        self.min_pixels = min_pixels.max(1);
        self
    }
}

impl DetectorBackend for ColorBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_label(&self, label: &str) -> bool {
        self.label == label
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let mask: Vec<u8> = frame
            .pixels()
            .chunks_exact(3)
            .map(|px| {
                if self.range.contains(rgb_to_hsv([px[0], px[1], px[2]])) {
                    u8::MAX
                } else {
                    0
                }
            })
            .collect();
        let mask = GrayImage::from_raw(frame.width, frame.height, mask)
            .ok_or_else(|| anyhow!("color mask does not match {}x{}", frame.width, frame.height))?;
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut blobs: Vec<Blob> = Vec::new();
        for (x, y, Luma([label])) in labels.enumerate_pixels() {
            let Some(index) = (*label as usize).checked_sub(1) else {
                continue;
            };
            if index >= blobs.len() {
                blobs.resize(index + 1, Blob::default());
            }
            blobs[index].add(x, y);
        }
        blobs.sort_by_key(|blob| (blob.first.1, blob.first.0));

        let mut result = DetectionResult::empty_for(frame.sequence);
        for blob in blobs.iter().filter(|blob| blob.pixels >= self.min_pixels) {
            let bbox = blob
                .bbox()
                .ok_or_else(|| anyhow!("color blob produced a degenerate box"))?;
            let confidence = (blob.pixels as f64 / bbox.area() as f64).clamp(0.0, 1.0) as f32;
            result
                .objects
                .push(DetectedObject::new(self.label.clone(), bbox, confidence));
        }
        Ok(result)
    }
}

/// Pixel count and extent of one connected component.
#[derive(Clone, Copy)]
struct Blob {
    pixels: u64,
    /// First pixel in raster order.
    first: (u32, u32),
    min: (u32, u32),
    max: (u32, u32),
}

impl Default for Blob {
    fn default() -> Self {
        Self {
            pixels: 0,
            first: (u32::MAX, u32::MAX),
            min: (u32::MAX, u32::MAX),
            max: (0, 0),
        }
    }
}

impl Blob {
    fn add(&mut self, x: u32, y: u32) {
        if self.pixels == 0 {
            self.first = (x, y);
        }
        self.pixels += 1;
        self.min = (self.min.0.min(x), self.min.1.min(y));
        self.max = (self.max.0.max(x), self.max.1.max(y));
    }

    fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::new(
            self.min.0 as i32,
            self.min.1 as i32,
            self.max.0 as i32 + 1,
            self.max.1 as i32 + 1,
        )
    }
}

/// RGB to 8-bit HSV (H halved into 0..=180, as OpenCV does).
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };

    [
        (hue / 2.0).round().clamp(0.0, 180.0) as u8,
        (saturation * 255.0).round() as u8,
        (max * 255.0).round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame::filled(width, height, [128, 128, 128], 7).unwrap()
    }

    fn paint(frame: &mut Frame, color: [u8; 3], x0: u32, y0: u32, side: u32) {
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                frame.put_pixel(x, y, color);
            }
        }
    }

    #[test]
    fn hsv_conversion_matches_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn red_range_wraps_hue() {
        assert!(ColorRange::RED.contains([175, 200, 200]));
        assert!(ColorRange::RED.contains([3, 200, 200]));
        assert!(!ColorRange::RED.contains([60, 200, 200]));
    }

    #[test]
    fn neutral_presets_cover_gray_black_and_white() {
        let gray = ColorRange::preset("grey").unwrap();
        assert!(gray.contains(rgb_to_hsv([128, 128, 128])));
        assert!(ColorRange::preset("black").unwrap().contains(rgb_to_hsv([10, 10, 10])));
        assert!(ColorRange::preset("white").unwrap().contains(rgb_to_hsv([250, 250, 250])));
        assert!(!ColorRange::preset("white").unwrap().contains(rgb_to_hsv([220, 20, 20])));
        assert!(ColorRange::preset("brown").unwrap().contains(rgb_to_hsv([140, 80, 30])));
        assert!(ColorRange::preset("beige").is_some());
    }

    #[test]
    fn reports_bounding_box_of_one_blob() -> Result<()> {
        let mut frame = gray_frame(64, 48);
        paint(&mut frame, [220, 20, 20], 10, 5, 20);
        let mut backend = ColorBackend::from_preset("red")?
            .with_label("cup")
            .with_min_pixels(100);
        let result = backend.detect(&frame)?;

        assert_eq!(result.frame_sequence, 7);
        assert_eq!(result.len(), 1);
        let object = &result.objects[0];
        assert_eq!(object.label, "cup");
        assert_eq!(object.bbox, BoundingBox::new(10, 5, 30, 25).unwrap());
        assert!((object.confidence - 1.0).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn separate_blobs_are_separate_objects() -> Result<()> {
        let mut frame = gray_frame(640, 480);
        paint(&mut frame, [220, 20, 20], 20, 20, 60);
        paint(&mut frame, [220, 20, 20], 560, 400, 60);
        // A stray pixel must neither merge the blobs nor be reported.
        frame.put_pixel(300, 240, [220, 20, 20]);

        let mut backend = ColorBackend::from_preset("red")?;
        let result = backend.detect(&frame)?;

        let boxes: Vec<BoundingBox> = result.objects.iter().map(|o| o.bbox).collect();
        assert_eq!(
            boxes,
            vec![
                BoundingBox::new(20, 20, 80, 80).unwrap(),
                BoundingBox::new(560, 400, 620, 460).unwrap(),
            ]
        );
        assert!(result.objects.iter().all(|o| (o.confidence - 1.0).abs() < f32::EPSILON));
        Ok(())
    }

    #[test]
    fn ignores_blobs_below_min_pixels() -> Result<()> {
        let mut frame = gray_frame(64, 48);
        paint(&mut frame, [20, 20, 220], 0, 0, 5);
        let mut backend = ColorBackend::from_preset("blue")?;
        assert!(backend.detect(&frame)?.is_empty());
        let mut sensitive = ColorBackend::from_preset("blue")?.with_min_pixels(10);
        assert_eq!(sensitive.detect(&frame)?.len(), 1);
        Ok(())
    }

    #[test]
    fn unknown_preset_is_an_error() {
        assert!(ColorBackend::from_preset("chartreuse").is_err());
    }
}
