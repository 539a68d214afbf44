use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use arm_tracker::config::TrackerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TRACKER_CONFIG",
        "TRACKER_SOURCE",
        "TRACKER_BACKEND",
        "TRACKER_MODEL_PATH",
        "TRACKER_TARGET_LABEL",
        "TRACKER_SERIAL_PORT",
        "TRACKER_SERIAL_BAUD",
        "TRACKER_ALPHA",
        "TRACKER_FRAME_SKIP",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "url": "/dev/video2",
            "target_fps": 15,
            "width": 320,
            "height": 240
        },
        "detector": {
            "backend": "tract",
            "model_path": "/opt/models/yolov8n.onnx",
            "frame_skip": 3,
            "confidence": 0.5
        },
        "tracking": {
            "target_label": "bottle",
            "alpha": 0.5,
            "hold_last_result": true
        },
        "serial": {
            "port": "/dev/ttyACM0",
            "baud": 57600,
            "settle_ms": 500
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("TRACKER_CONFIG", file.path());
    std::env::set_var("TRACKER_TARGET_LABEL", "cup");
    std::env::set_var("TRACKER_SERIAL_PORT", "auto");
    std::env::set_var("TRACKER_FRAME_SKIP", "1");

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "/dev/video2");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/opt/models/yolov8n.onnx"))
    );
    assert_eq!(cfg.detector.frame_skip, 1);
    assert_eq!(cfg.detector.confidence, 0.5);
    assert_eq!(cfg.tracking.target_label, "cup");
    assert_eq!(cfg.tracking.alpha, 0.5);
    assert!(cfg.tracking.hold_last_result);
    assert_eq!(cfg.serial.port, "auto");
    assert_eq!(cfg.serial.baud, 57600);
    assert_eq!(cfg.serial.settle, Duration::from_millis(500));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [detector]
        backend = "Color"
        color = "blue"

        [mapping]
        min_area = 1000.0
        grip_threshold = 0.2

        [snapshot]
        path = "/tmp/arm-tracker.jpg"
        interval_ms = 250
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("TRACKER_CONFIG", file.path());

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.detector.backend, "color");
    assert_eq!(cfg.detector.color_preset, "blue");
    assert_eq!(cfg.mapping.min_area, 1000.0);
    assert_eq!(cfg.mapping.grip_threshold, 0.2);
    let snapshot = cfg.snapshot.expect("snapshot settings");
    assert_eq!(snapshot.interval, Duration::from_millis(250));
    assert_eq!(cfg.source.url, "stub://camera");

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = TrackerConfig::load().expect("load config");
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.source.target_fps, 10);
    assert_eq!(cfg.detector.backend, "color");
    assert_eq!(cfg.detector.frame_skip, 2);
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.tracking.target_label, "cup");
    assert_eq!(cfg.tracking.alpha, 0.65);
    assert!(cfg.tracking.enabled);
    assert_eq!(cfg.serial.port, "/dev/ttyUSB0");
    assert_eq!(cfg.serial.baud, 115_200);

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TRACKER_ALPHA", "1.5");
    let err = TrackerConfig::load().unwrap_err();
    assert!(err.to_string().contains("alpha"));

    clear_env();
    std::env::set_var("TRACKER_SERIAL_BAUD", "fast");
    let err = TrackerConfig::load().unwrap_err();
    assert!(err.to_string().contains("TRACKER_SERIAL_BAUD"));

    clear_env();
    std::env::set_var("TRACKER_FRAME_SKIP", "0");
    assert!(TrackerConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ \"tracking\": { \"alpha\": \"high\" } }")
        .expect("write config");
    std::env::set_var("TRACKER_CONFIG", file.path());

    let err = TrackerConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
