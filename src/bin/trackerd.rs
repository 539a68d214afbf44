//! trackerd - camera-guided actuator tracking daemon
//!
//! This daemon:
//! 1. Loads layered configuration (file, environment, flags)
//! 2. Opens the frame source and the serial link (best-effort)
//! 3. Runs detection on a background worker, every Nth frame
//! 4. Sends smoothed X/Y/Z commands to the arm until Ctrl-C or the source ends

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arm_tracker::config::SnapshotSettings;
use arm_tracker::detect::{ColorBackend, SharedBackend, StubBackend};
use arm_tracker::{ActuatorChannel, BackendRegistry, Pipeline, TrackerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension). Overrides TRACKER_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial port of the arm controller, or "auto".
    #[arg(long)]
    port: Option<String>,
    /// Label of the object to follow.
    #[arg(long)]
    target: Option<String>,
    /// Detector backend: stub, color or tract.
    #[arg(long)]
    backend: Option<String>,
    /// Do not open the serial port.
    #[arg(long)]
    headless: bool,
    /// Start with tracking paused.
    #[arg(long)]
    no_track: bool,
    /// Write annotated frames to this JPEG file.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load()?,
    };
    apply_args(&mut config, &args);
    config.validate()?;

    let registry = build_registry(&config)?;
    let (backend, backend_name) =
        select_backend(&registry, &config.detector.backend, &config.tracking.target_label)?;

    let channel = if args.headless {
        log::info!("trackerd: headless, serial link disabled");
        ActuatorChannel::headless()
    } else {
        ActuatorChannel::open(&config.serial)
    };

    let mut pipeline = Pipeline::from_config(&config, backend, channel)?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "trackerd running. source={} target='{}' backend={}",
        config.source.url,
        config.tracking.target_label,
        backend_name
    );
    match pipeline.run(&stop) {
        Ok(()) => log::info!("trackerd: shutdown signal received"),
        Err(err) if err.is_terminal() => log::info!("trackerd: {}", err),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn apply_args(config: &mut TrackerConfig, args: &Args) {
    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(target) = &args.target {
        config.tracking.target_label = target.clone();
    }
    if let Some(backend) = &args.backend {
        config.detector.backend = backend.clone();
    }
    if args.no_track {
        config.tracking.enabled = false;
    }
    if let Some(path) = &args.snapshot {
        config.snapshot = Some(SnapshotSettings {
            path: path.clone(),
            interval: config
                .snapshot
                .as_ref()
                .map(|snapshot| snapshot.interval)
                .unwrap_or(Duration::from_secs(1)),
        });
    }
}

/// The default backend when it reports `label`, otherwise the registered
/// backend that does. Returns the handle together with its name.
fn select_backend(
    registry: &BackendRegistry,
    requested: &str,
    label: &str,
) -> Result<(SharedBackend, &'static str)> {
    let default_backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    let backend = match registry.backend_for_label(label) {
        Ok(backend) => backend,
        Err(err) => {
            log::warn!("trackerd: {}; keeping backend {}", err, requested);
            default_backend.clone()
        }
    };
    let name = backend
        .lock()
        .map(|guard| guard.name())
        .map_err(|_| anyhow!("detector backend lock poisoned"))?;
    if !Arc::ptr_eq(&backend, &default_backend) {
        log::warn!(
            "trackerd: backend {} does not report '{}'; using backend {}",
            requested,
            label,
            name
        );
    }
    Ok((backend, name))
}

fn build_registry(config: &TrackerConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new(Vec::new()));
    registry.register(
        ColorBackend::from_preset(&config.detector.color_preset)?
            .with_label(config.tracking.target_label.clone())
            .with_min_pixels(config.detector.color_min_pixels),
    );

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &config.detector.model_path {
        let backend = arm_tracker::detect::TractBackend::new(model_path, config.detector.input_size)?
            .with_threshold(config.detector.confidence);
        registry.register(backend);
    }
    #[cfg(not(feature = "backend-tract"))]
    if config.detector.model_path.is_some() {
        log::warn!("trackerd: model_path set but built without backend-tract; ignoring");
    }

    registry
        .set_default(&config.detector.backend)
        .with_context(|| format!("registered backends: {}", registry.list().join(", ")))?;
    Ok(registry)
}
