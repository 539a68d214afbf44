use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuator::SerialSettings;
use crate::detect::backends::color::DEFAULT_MIN_PIXELS as DEFAULT_COLOR_MIN_PIXELS;
use crate::error::TrackerResult;
use crate::frame::FrameFormat;
use crate::ingest::{SourceConfig, SyntheticScene};
use crate::track::{
    CoordinateMapper, DEFAULT_GRIP_THRESHOLD, DEFAULT_MAX_AREA_RATIO, DEFAULT_MIN_AREA,
};

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "color";
const DEFAULT_FRAME_SKIP: u32 = 2;
const DEFAULT_INPUT_SIZE: u32 = 320;
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_COLOR_PRESET: &str = "red";
const DEFAULT_TARGET_LABEL: &str = "cup";
const DEFAULT_ALPHA: f64 = 0.65;
const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    tracking: Option<TrackingConfigFile>,
    mapping: Option<MappingConfigFile>,
    serial: Option<SerialConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    frame_skip: Option<u32>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    color: Option<String>,
    min_pixels: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    target_label: Option<String>,
    min_confidence: Option<f32>,
    alpha: Option<f64>,
    enabled: Option<bool>,
    hold_last_result: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct MappingConfigFile {
    min_area: Option<f64>,
    max_area_ratio: Option<f64>,
    grip_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    port: Option<String>,
    baud: Option<u32>,
    settle_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotConfigFile {
    path: PathBuf,
    interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub tracking: TrackingSettings,
    pub mapping: MappingSettings,
    pub serial: SerialSettings,
    pub snapshot: Option<SnapshotSettings>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registry name: `stub`, `color` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Submit every Nth frame to the detector.
    pub frame_skip: u32,
    pub input_size: u32,
    pub confidence: f32,
    /// Color preset used by the `color` backend.
    pub color_preset: String,
    pub color_min_pixels: u64,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub target_label: String,
    pub min_confidence: Option<f32>,
    pub alpha: f64,
    pub enabled: bool,
    pub hold_last_result: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MappingSettings {
    pub min_area: f64,
    pub max_area_ratio: f64,
    pub grip_threshold: f64,
}

impl MappingSettings {
    pub fn mapper(&self, format: FrameFormat) -> TrackerResult<CoordinateMapper> {
        CoordinateMapper::with_bounds(
            format,
            self.min_area,
            format.area() * self.max_area_ratio,
            self.grip_threshold,
        )
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub path: PathBuf,
    pub interval: Duration,
}

impl TrackerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRACKER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path, ignoring `TRACKER_CONFIG` but still
    /// applying the environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackerConfigFile) -> Self {
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            max_frames: source_file.max_frames,
            scene: SyntheticScene::default(),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file.model_path,
            frame_skip: detector_file.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence: detector_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            color_preset: detector_file
                .color
                .unwrap_or_else(|| DEFAULT_COLOR_PRESET.to_string()),
            color_min_pixels: detector_file
                .min_pixels
                .unwrap_or(DEFAULT_COLOR_MIN_PIXELS),
        };

        let tracking_file = file.tracking.unwrap_or_default();
        let tracking = TrackingSettings {
            target_label: tracking_file
                .target_label
                .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
            min_confidence: tracking_file.min_confidence,
            alpha: tracking_file.alpha.unwrap_or(DEFAULT_ALPHA),
            enabled: tracking_file.enabled.unwrap_or(true),
            hold_last_result: tracking_file.hold_last_result.unwrap_or(false),
        };

        let mapping_file = file.mapping.unwrap_or_default();
        let mapping = MappingSettings {
            min_area: mapping_file.min_area.unwrap_or(DEFAULT_MIN_AREA),
            max_area_ratio: mapping_file
                .max_area_ratio
                .unwrap_or(DEFAULT_MAX_AREA_RATIO),
            grip_threshold: mapping_file
                .grip_threshold
                .unwrap_or(DEFAULT_GRIP_THRESHOLD),
        };

        let serial_file = file.serial.unwrap_or_default();
        let serial_defaults = SerialSettings::default();
        let serial = SerialSettings {
            port: serial_file.port.unwrap_or(serial_defaults.port),
            baud: serial_file.baud.unwrap_or(serial_defaults.baud),
            timeout: serial_file
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(serial_defaults.timeout),
            settle: serial_file
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or(serial_defaults.settle),
        };

        let snapshot = file.snapshot.map(|snapshot| SnapshotSettings {
            path: snapshot.path,
            interval: Duration::from_millis(
                snapshot
                    .interval_ms
                    .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_MS),
            ),
        });

        Self {
            source,
            detector,
            tracking,
            mapping,
            serial,
            snapshot,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_var("TRACKER_SOURCE") {
            self.source.url = url;
        }
        if let Some(backend) = non_empty_var("TRACKER_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_var("TRACKER_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(label) = non_empty_var("TRACKER_TARGET_LABEL") {
            self.tracking.target_label = label;
        }
        if let Some(port) = non_empty_var("TRACKER_SERIAL_PORT") {
            self.serial.port = port;
        }
        if let Some(baud) = non_empty_var("TRACKER_SERIAL_BAUD") {
            self.serial.baud = baud
                .parse()
                .map_err(|_| anyhow!("TRACKER_SERIAL_BAUD must be an integer baud rate"))?;
        }
        if let Some(alpha) = non_empty_var("TRACKER_ALPHA") {
            self.tracking.alpha = alpha
                .parse()
                .map_err(|_| anyhow!("TRACKER_ALPHA must be a number in (0, 1)"))?;
        }
        if let Some(skip) = non_empty_var("TRACKER_FRAME_SKIP") {
            self.detector.frame_skip = skip
                .parse()
                .map_err(|_| anyhow!("TRACKER_FRAME_SKIP must be a positive integer"))?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        let alpha = self.tracking.alpha;
        if !(alpha.is_finite() && alpha > 0.0 && alpha < 1.0) {
            return Err(anyhow!("tracking.alpha must lie in (0, 1), got {}", alpha));
        }
        if self.detector.frame_skip == 0 {
            return Err(anyhow!("detector.frame_skip must be at least 1"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "source dimensions must be non-zero, got {}x{}",
                self.source.width,
                self.source.height
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be non-zero"));
        }
        check_unit("detector.confidence", self.detector.confidence)?;
        if let Some(min_confidence) = self.tracking.min_confidence {
            check_unit("tracking.min_confidence", min_confidence)?;
        }

        self.tracking.target_label = self.tracking.target_label.trim().to_string();
        if self.tracking.target_label.is_empty() {
            return Err(anyhow!("tracking.target_label must not be empty"));
        }
        self.detector.backend = self.detector.backend.trim().to_ascii_lowercase();

        let max_area = self.source.format().area() * self.mapping.max_area_ratio;
        if !(self.mapping.min_area >= 0.0 && self.mapping.min_area < max_area) {
            return Err(anyhow!(
                "mapping.min_area ({}) must be below the max area ({})",
                self.mapping.min_area,
                max_area
            ));
        }
        if !(0.0..=1.0).contains(&self.mapping.grip_threshold) {
            return Err(anyhow!(
                "mapping.grip_threshold must lie in [0, 1], got {}",
                self.mapping.grip_threshold
            ));
        }
        if self.serial.baud == 0 {
            return Err(anyhow!("serial.baud must be greater than zero"));
        }
        if let Some(snapshot) = &self.snapshot {
            if snapshot.interval.is_zero() {
                return Err(anyhow!("snapshot.interval_ms must be greater than zero"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TrackerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn check_unit(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(anyhow!("{} must lie in [0, 1], got {}", field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_takes_defaults() -> Result<()> {
        let mut cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        cfg.validate()?;
        assert_eq!(cfg.source.url, "stub://camera");
        assert_eq!((cfg.source.width, cfg.source.height), (640, 480));
        assert_eq!(cfg.detector.backend, "color");
        assert_eq!(cfg.detector.frame_skip, 2);
        assert_eq!(cfg.tracking.target_label, "cup");
        assert!(cfg.tracking.enabled);
        assert!(!cfg.tracking.hold_last_result);
        assert_eq!(cfg.serial.port, "/dev/ttyUSB0");
        assert_eq!(cfg.serial.settle, Duration::from_millis(2000));
        assert!(cfg.snapshot.is_none());
        Ok(())
    }

    #[test]
    fn default_mapper_matches_frame_area() -> Result<()> {
        let cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        let mapper = cfg.mapping.mapper(cfg.source.format())?;
        assert!((mapper.depth(10_000.0) - 0.956).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn toml_sections_parse() -> Result<()> {
        let file: TrackerConfigFile = toml::from_str(
            r#"
                [detector]
                backend = "stub"
                frame_skip = 1

                [snapshot]
                path = "/tmp/tracker.jpg"
            "#,
        )?;
        let cfg = TrackerConfig::from_file(file);
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.detector.frame_skip, 1);
        let snapshot = cfg.snapshot.expect("snapshot section");
        assert_eq!(snapshot.interval, Duration::from_millis(1000));
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        cfg.tracking.alpha = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        cfg.detector.frame_skip = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        cfg.tracking.target_label = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        cfg.mapping.min_area = 1_000_000.0;
        assert!(cfg.validate().is_err());

        let mut cfg = TrackerConfig::from_file(TrackerConfigFile::default());
        cfg.detector.confidence = 1.5;
        assert!(cfg.validate().is_err());
    }
}
