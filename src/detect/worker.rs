use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::detect::gateway::DetectorGateway;
use crate::detect::result::DetectionResult;
use crate::error::{TrackerError, TrackerResult};
use crate::frame::Frame;

/// Counters kept by the detection worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Frames accepted by `submit`.
    pub submitted: u64,
    /// Frames dropped because the worker was busy or stopping.
    pub dropped: u64,
    /// Detections that finished and published a result.
    pub completed: u64,
    /// Detections that failed and published an empty result.
    pub failed: u64,
    /// Frames the gateway rejected as invalid input. Nothing is published.
    pub rejected: u64,
    /// Results replaced before the orchestrator fetched them.
    pub overwritten: u64,
}

// State shared between the worker thread and the orchestrator.
#[derive(Default)]
struct Slot {
    pending: Option<Frame>,
    // True from an accepted submit until the detection for it completes.
    busy: bool,
    result: Option<DetectionResult>,
    stop_request: bool,
    stats: WorkerStats,
}

struct Shared {
    slot: Mutex<Slot>,
    // Signalled when a frame is submitted or a stop is requested.
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs the detector gateway on its own thread behind a single-slot handoff.
///
/// At most one frame is in flight and at most one finished result waits to be
/// fetched. `submit` never queues: a frame offered while a detection is running
/// is dropped. A newly finished result replaces an unfetched older one, so the
/// orchestrator always sees the newest detection.
pub struct DetectionWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    backend_name: &'static str,
}

impl DetectionWorker {
    pub fn spawn(gateway: DetectorGateway) -> TrackerResult<Self> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            wake: Condvar::new(),
        });
        let backend_name = gateway.backend_name();
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("detection-worker".into())
            .spawn(move || Self::worker(worker_shared, gateway))
            .map_err(|e| TrackerError::DetectionFailed(format!("spawn detection worker: {}", e)))?;
        log::info!("DetectionWorker: started with backend {}", backend_name);
        Ok(Self {
            shared,
            handle: Some(handle),
            backend_name,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Offer a frame for detection. Returns false (and drops it) when busy.
    pub fn submit(&self, frame: &Frame) -> bool {
        let mut slot = self.shared.lock();
        if slot.busy || slot.stop_request {
            slot.stats.dropped += 1;
            return false;
        }
        slot.pending = Some(frame.clone());
        slot.busy = true;
        slot.stats.submitted += 1;
        drop(slot);
        self.shared.wake.notify_one();
        true
    }

    /// Take the newest finished result, if one arrived since the last fetch.
    pub fn try_fetch_latest(&self) -> Option<DetectionResult> {
        self.shared.lock().result.take()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock().busy
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.lock().stats
    }

    /// Ask the thread to exit and join it. A running detection finishes first.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.lock().stop_request = true;
        self.shared.wake.notify_all();
        if handle.join().is_err() {
            log::error!("DetectionWorker: worker thread panicked");
        }
        log::info!("DetectionWorker: stopped");
    }

    fn worker(shared: Arc<Shared>, gateway: DetectorGateway) {
        loop {
            let frame = {
                let mut slot = shared.lock();
                loop {
                    if slot.stop_request {
                        return;
                    }
                    if let Some(frame) = slot.pending.take() {
                        break frame;
                    }
                    slot = shared
                        .wake
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };

            let outcome = gateway.detect(&frame);

            let mut slot = shared.lock();
            let published = match outcome {
                Ok(result) => {
                    slot.stats.completed += 1;
                    Some(result)
                }
                Err(TrackerError::InvalidInput(msg)) => {
                    slot.stats.rejected += 1;
                    log::warn!("DetectionWorker: frame {} rejected: {}", frame.sequence, msg);
                    None
                }
                Err(e) => {
                    slot.stats.failed += 1;
                    log::warn!("DetectionWorker: frame {}: {}", frame.sequence, e);
                    Some(DetectionResult::empty_for(frame.sequence))
                }
            };
            if let Some(result) = published {
                if slot.result.replace(result).is_some() {
                    slot.stats.overwritten += 1;
                }
            }
            slot.busy = false;
        }
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
