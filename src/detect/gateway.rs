use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::detect::backend::DetectorBackend;
use crate::detect::registry::SharedBackend;
use crate::detect::result::{DetectedObject, DetectionResult};
use crate::error::{TrackerError, TrackerResult};
use crate::frame::{Frame, FrameFormat};

/// Synchronous entry point to the detection capability.
///
/// The gateway pins the frame format the backend was set up for. A frame of any
/// other size is rejected with `InvalidInput` before the backend sees it. Every
/// backend failure, including a panic, comes back as `DetectionFailed`.
pub struct DetectorGateway {
    backend: SharedBackend,
    backend_name: &'static str,
    format: FrameFormat,
}

impl DetectorGateway {
    pub fn new(backend: SharedBackend, format: FrameFormat) -> Self {
        let backend_name = backend
            .lock()
            .map(|guard| guard.name())
            .unwrap_or("unknown");
        Self {
            backend,
            backend_name,
            format,
        }
    }

    pub fn from_backend<B: DetectorBackend + 'static>(backend: B, format: FrameFormat) -> Self {
        Self::new(Arc::new(Mutex::new(backend)), format)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn warm_up(&self) -> TrackerResult<()> {
        let mut guard = self.lock_backend()?;
        guard
            .warm_up()
            .map_err(|e| TrackerError::DetectionFailed(format!("{} warm-up: {:#}", self.backend_name, e)))
    }

    /// Run the backend on `frame`.
    pub fn detect(&self, frame: &Frame) -> TrackerResult<DetectionResult> {
        self.format.check(frame)?;

        let mut guard = self.lock_backend()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| guard.detect(frame)));
        drop(guard);

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(TrackerError::DetectionFailed(format!(
                    "{}: {:#}",
                    self.backend_name, e
                )))
            }
            Err(_) => {
                return Err(TrackerError::DetectionFailed(format!(
                    "{} panicked during detection",
                    self.backend_name
                )))
            }
        };

        let before = result.objects.len();
        result.objects.retain(is_well_formed);
        if result.objects.len() != before {
            log::debug!(
                "DetectorGateway: discarded {} malformed detections from {}",
                before - result.objects.len(),
                self.backend_name
            );
        }
        result.frame_sequence = frame.sequence;
        Ok(result)
    }

    fn lock_backend(&self) -> TrackerResult<std::sync::MutexGuard<'_, dyn DetectorBackend + 'static>> {
        self.backend
            .lock()
            .map_err(|_| TrackerError::DetectionFailed("backend lock poisoned".into()))
    }
}

fn is_well_formed(object: &DetectedObject) -> bool {
    let b = object.bbox;
    (0.0..=1.0).contains(&object.confidence) && b.x1 < b.x2 && b.y1 < b.y2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use crate::detect::result::BoundingBox;

    struct PanickingBackend;

    impl DetectorBackend for PanickingBackend {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn supports_label(&self, _label: &str) -> bool {
            true
        }

        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
            panic!("inference kernel exploded");
        }
    }

    fn cup(confidence: f32) -> DetectedObject {
        DetectedObject::new("cup", BoundingBox::new(100, 100, 200, 200).unwrap(), confidence)
    }

    #[test]
    fn rejects_wrong_frame_size() {
        let gateway = DetectorGateway::from_backend(StubBackend::new(vec![cup(0.9)]), FrameFormat::new(640, 480));
        let frame = Frame::filled(320, 240, [0, 0, 0], 1).unwrap();
        assert!(matches!(gateway.detect(&frame), Err(TrackerError::InvalidInput(_))));
    }

    #[test]
    fn backend_error_becomes_detection_failed() {
        let backend = StubBackend::new(vec![cup(0.9)]).failing("cuda out of memory");
        let gateway = DetectorGateway::from_backend(backend, FrameFormat::new(4, 4));
        let frame = Frame::filled(4, 4, [0, 0, 0], 1).unwrap();
        match gateway.detect(&frame) {
            Err(TrackerError::DetectionFailed(msg)) => assert!(msg.contains("cuda out of memory")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn backend_panic_is_contained() {
        let gateway = DetectorGateway::from_backend(PanickingBackend, FrameFormat::new(4, 4));
        let frame = Frame::filled(4, 4, [0, 0, 0], 1).unwrap();
        assert!(matches!(gateway.detect(&frame), Err(TrackerError::DetectionFailed(_))));
        // The backend mutex is not poisoned; the gateway keeps answering.
        assert!(matches!(gateway.detect(&frame), Err(TrackerError::DetectionFailed(_))));
    }

    #[test]
    fn drops_out_of_range_confidence_and_stamps_sequence() -> anyhow::Result<()> {
        let backend = StubBackend::new(vec![cup(0.9), cup(1.5), cup(f32::NAN)]);
        let gateway = DetectorGateway::from_backend(backend, FrameFormat::new(4, 4));
        let frame = Frame::filled(4, 4, [0, 0, 0], 42)?;
        let result = gateway.detect(&frame)?;
        assert_eq!(result.len(), 1);
        assert_eq!(result.frame_sequence, 42);
        Ok(())
    }
}
