//! Pipeline orchestrator.
//!
//! One loop pulls frames from the source, offers every Nth frame to the
//! detection worker and acts on whatever result the worker has finished.
//! The loop never waits on detection; it blocks only on the frame source and
//! the short serial write.
//!
//! Per cycle:
//! 1. read a frame (source exhaustion ends the pipeline)
//! 2. submit it when the frame counter hits the skip interval
//! 3. fetch the newest finished result, if any
//! 4. select, smooth, map and send
//! 5. annotate and publish the frame to the optional sink

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::actuator::{ActuatorChannel, SendOutcome};
use crate::config::TrackerConfig;
use crate::detect::{
    BoundingBox, DetectionResult, DetectionWorker, DetectorGateway, SharedBackend, WorkerStats,
};
use crate::error::{TrackerError, TrackerResult};
use crate::frame::Frame;
use crate::ingest::{open_source, FrameSource};
use crate::overlay::{annotate, Annotation, FrameSink, SnapshotSink};
use crate::track::{
    ActuatorState, CoordinateMapper, PositionFilter, TargetSelector, TrackState,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What one cycle did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Tracking is paused; the frame was only annotated.
    TrackingOff,
    /// No detection result was available this cycle.
    NoResult,
    /// A result arrived but held no matching object.
    NoCandidate,
    Tracked {
        state: ActuatorState,
        bbox: BoundingBox,
        sent: SendOutcome,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    pub sequence: u64,
    /// The frame was handed to the detection worker.
    pub submitted: bool,
    pub outcome: CycleOutcome,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub cycles: u64,
    pub submitted: u64,
    pub tracked: u64,
    pub no_candidate: u64,
    pub no_result: u64,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    worker: DetectionWorker,
    selector: TargetSelector,
    filter: PositionFilter,
    mapper: CoordinateMapper,
    channel: ActuatorChannel,
    sink: Option<Box<dyn FrameSink>>,
    track: TrackState,
    last_result: Option<DetectionResult>,
    frame_counter: u64,
    frame_skip: u32,
    frame_period: Option<Duration>,
    tracking: bool,
    hold_last_result: bool,
    stats: PipelineStats,
    shut_down: bool,
}

impl Pipeline {
    /// Assemble a pipeline from connected parts.
    ///
    /// The mapper must use the source's frame format.
    pub fn new(
        source: Box<dyn FrameSource>,
        worker: DetectionWorker,
        selector: TargetSelector,
        filter: PositionFilter,
        mapper: CoordinateMapper,
        channel: ActuatorChannel,
    ) -> TrackerResult<Self> {
        if mapper.format() != source.format() {
            return Err(TrackerError::Config(format!(
                "mapper expects {:?} but the source delivers {:?}",
                mapper.format(),
                source.format()
            )));
        }
        Ok(Self {
            source,
            worker,
            selector,
            filter,
            mapper,
            channel,
            sink: None,
            track: TrackState::default(),
            last_result: None,
            frame_counter: 0,
            frame_skip: 1,
            frame_period: None,
            tracking: true,
            hold_last_result: false,
            stats: PipelineStats::default(),
            shut_down: false,
        })
    }

    /// Build the whole pipeline from configuration: open and connect the
    /// source, start the worker on `backend`, attach the snapshot sink.
    pub fn from_config(
        config: &TrackerConfig,
        backend: SharedBackend,
        channel: ActuatorChannel,
    ) -> Result<Self> {
        let mut source = open_source(&config.source)?;
        source
            .connect()
            .with_context(|| format!("connect frame source {}", config.source.url))?;
        let format = source.format();

        let gateway = DetectorGateway::new(backend, format);
        gateway.warm_up()?;
        let worker = DetectionWorker::spawn(gateway)?;

        let mut selector = TargetSelector::new(config.tracking.target_label.clone());
        if let Some(min_confidence) = config.tracking.min_confidence {
            selector = selector.with_min_confidence(min_confidence);
        }
        let filter = PositionFilter::new(config.tracking.alpha)?;
        let mapper = config.mapping.mapper(format)?;

        let mut pipeline = Self::new(source, worker, selector, filter, mapper, channel)?
            .with_frame_skip(config.detector.frame_skip)
            .with_target_fps(config.source.target_fps)
            .with_tracking(config.tracking.enabled)
            .with_hold_last_result(config.tracking.hold_last_result);
        if let Some(snapshot) = &config.snapshot {
            log::info!(
                "Pipeline: writing snapshots to {} every {:?}",
                snapshot.path.display(),
                snapshot.interval
            );
            pipeline = pipeline.with_sink(Box::new(SnapshotSink::new(
                snapshot.path.clone(),
                snapshot.interval,
            )));
        }
        Ok(pipeline)
    }

    /// Submit every `frame_skip`th frame to detection (minimum 1).
    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.frame_skip = frame_skip.max(1);
        self
    }

    /// Pace `run` to this rate; 0 runs as fast as the source delivers.
    pub fn with_target_fps(mut self, target_fps: u32) -> Self {
        self.frame_period =
            (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / target_fps as f64));
        self
    }

    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.tracking = enabled;
        self
    }

    pub fn with_hold_last_result(mut self, hold: bool) -> Self {
        self.hold_last_result = hold;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn set_tracking(&mut self, enabled: bool) {
        if self.tracking != enabled {
            log::info!(
                "Pipeline: tracking {}",
                if enabled { "enabled" } else { "paused" }
            );
        }
        self.tracking = enabled;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn track_state(&self) -> TrackState {
        self.track
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.worker.stats()
    }

    pub fn channel(&self) -> &ActuatorChannel {
        &self.channel
    }

    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    /// Run one cycle. Only frame source errors are returned; everything
    /// downstream of the read is absorbed and reported in the outcome.
    pub fn step(&mut self) -> TrackerResult<CycleReport> {
        let mut frame = self.source.read()?;
        self.stats.cycles += 1;
        let sequence = frame.sequence;

        if !self.tracking {
            self.publish(&mut frame, None, None);
            return Ok(CycleReport {
                sequence,
                submitted: false,
                outcome: CycleOutcome::TrackingOff,
            });
        }

        self.frame_counter += 1;
        let submitted =
            self.frame_counter % self.frame_skip as u64 == 0 && self.worker.submit(&frame);
        if submitted {
            self.stats.submitted += 1;
        }

        let fresh = self.worker.try_fetch_latest();
        let result = if self.hold_last_result {
            if fresh.is_some() {
                self.last_result = fresh;
            }
            self.last_result.as_ref()
        } else {
            fresh.as_ref()
        };

        let outcome = match result {
            None => {
                self.stats.no_result += 1;
                CycleOutcome::NoResult
            }
            Some(result) => match self.selector.select(result) {
                None => {
                    self.stats.no_candidate += 1;
                    log::debug!(
                        "Pipeline: no '{}' in result for frame {}",
                        self.selector.label(),
                        result.frame_sequence
                    );
                    CycleOutcome::NoCandidate
                }
                Some(target) => {
                    let bbox = target.bbox;
                    let raw = self.mapper.center_offset(&bbox);
                    let smoothed = self.filter.apply(&mut self.track, raw);
                    let state = self.mapper.map(smoothed, &bbox);
                    let sent = self.channel.send_state(&state);
                    self.stats.tracked += 1;
                    CycleOutcome::Tracked { state, bbox, sent }
                }
            },
        };

        let (target, pose) = match outcome {
            CycleOutcome::Tracked { bbox, state, .. } => (Some(bbox), Some(state)),
            _ => (None, None),
        };
        self.publish(&mut frame, target, pose);

        Ok(CycleReport {
            sequence,
            submitted,
            outcome,
        })
    }

    /// Cycle until `stop` is set or the source runs dry, then shut down.
    ///
    /// Returns `Ok` when stopped on request and the source error when the
    /// source ended the run.
    pub fn run(&mut self, stop: &AtomicBool) -> TrackerResult<()> {
        log::info!(
            "Pipeline: running (target '{}', backend {}, frame_skip {})",
            self.selector.label(),
            self.worker.backend_name(),
            self.frame_skip
        );
        let mut last_health_log = Instant::now();
        let mut exit = Ok(());

        while !stop.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            match self.step() {
                Ok(_) => {}
                Err(err) if err.is_terminal() => {
                    log::warn!("Pipeline: frame source ended: {}", err);
                    exit = Err(err);
                    break;
                }
                Err(err) => log::warn!("Pipeline: frame dropped: {}", err),
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health_log = Instant::now();
            }

            if let Some(rest) = self
                .frame_period
                .and_then(|period| period.checked_sub(cycle_start.elapsed()))
            {
                thread::sleep(rest);
            }
        }

        self.shutdown();
        exit
    }

    /// Stop the worker, close the link, release the source. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.worker.stop();
        self.channel.close();
        self.source.close();
        let stats = self.stats;
        log::info!(
            "Pipeline: shut down after {} cycles ({} tracked, {} without candidate, {} without result)",
            stats.cycles,
            stats.tracked,
            stats.no_candidate,
            stats.no_result
        );
    }

    fn publish(
        &mut self,
        frame: &mut Frame,
        target: Option<BoundingBox>,
        pose: Option<ActuatorState>,
    ) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        annotate(
            frame,
            &Annotation {
                tracking: self.tracking,
                target,
                pose,
            },
        );
        if let Err(err) = sink.publish(frame) {
            log::warn!("Pipeline: frame sink failed: {:#}", err);
        }
    }

    fn log_health(&self) {
        let source = self.source.stats();
        let worker = self.worker.stats();
        let channel = self.channel.stats();
        log::info!(
            "Pipeline: source {} health={} frames={} | worker submitted={} dropped={} completed={} failed={} overwritten={} | link written={} skipped={} failed={}",
            source.source,
            self.source.is_healthy(),
            source.frames_captured,
            worker.submitted,
            worker.dropped,
            worker.completed,
            worker.failed,
            worker.overwritten,
            channel.written,
            channel.skipped,
            channel.failed
        );
        if let Some(command) = self.channel.last_command() {
            log::info!("Pipeline: last command {}", command);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
