use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// A backend is the opaque detection capability: frame in, labelled boxes out.
/// The pipeline only ever reaches it through `DetectorGateway`, which validates
/// the frame first and turns any error into "no detections".
///
/// `detect` may be slow (tens to hundreds of milliseconds). It runs on the
/// detection worker thread, never on the frame loop.
pub trait DetectorBackend: Send {
    /// Registry key, also used in logs.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can report objects with this label.
    fn supports_label(&self, label: &str) -> bool;

    /// Box coordinates are in the frame's pixel space.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;

    /// Called once before the worker thread starts, e.g. to load a model.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
