use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectedObject, DetectionResult};
use crate::frame::Frame;

/// Stub backend for testing and dry runs. Replays scripted detections.
///
/// Each call pops the next scripted result; once the script is down to one
/// entry that entry is returned forever.
pub struct StubBackend {
    script: VecDeque<Vec<DetectedObject>>,
    latency: Duration,
    fail_with: Option<String>,
    calls: u64,
}

impl StubBackend {
    /// Return the same detections on every call.
    pub fn new(objects: Vec<DetectedObject>) -> Self {
        Self::sequence(vec![objects])
    }

    /// Return each entry once, in order, then keep repeating the last one.
    pub fn sequence(results: Vec<Vec<DetectedObject>>) -> Self {
        let mut script: VecDeque<_> = results.into();
        if script.is_empty() {
            script.push_back(Vec::new());
        }
        Self {
            script,
            latency: Duration::ZERO,
            fail_with: None,
            calls: 0,
        }
    }

    /// Sleep this long inside every `detect` call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every `detect` call fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports_label(&self, label: &str) -> bool {
        self.script
            .iter()
            .flatten()
            .any(|object| object.label == label)
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        self.calls += 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if let Some(message) = &self.fail_with {
            return Err(anyhow!("{}", message));
        }

        let objects = if self.script.len() > 1 {
            self.script.pop_front().unwrap_or_default()
        } else {
            self.script.front().cloned().unwrap_or_default()
        };

        Ok(DetectionResult {
            frame_sequence: frame.sequence,
            objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn cup() -> DetectedObject {
        DetectedObject::new("cup", BoundingBox::new(100, 100, 200, 200).unwrap(), 0.9)
    }

    #[test]
    fn sequence_repeats_last_entry() -> Result<()> {
        let frame = Frame::filled(8, 8, [0, 0, 0], 3)?;
        let mut backend = StubBackend::sequence(vec![vec![cup()], vec![]]);

        let r1 = backend.detect(&frame)?;
        assert_eq!(r1.len(), 1);
        assert_eq!(r1.frame_sequence, 3);
        assert!(backend.detect(&frame)?.is_empty());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn failing_backend_reports_error() -> Result<()> {
        let frame = Frame::filled(8, 8, [0, 0, 0], 1)?;
        let mut backend = StubBackend::new(vec![cup()]).failing("model crashed");
        assert!(backend.detect(&frame).is_err());
        assert!(backend.supports_label("cup"));
        assert!(!backend.supports_label("person"));
        Ok(())
    }
}
