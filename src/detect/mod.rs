mod backend;
pub mod backends;
mod gateway;
mod registry;
mod result;
mod worker;

pub use backend::DetectorBackend;
pub use backends::{ColorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use gateway::DetectorGateway;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{BoundingBox, DetectedObject, DetectionResult};
pub use worker::{DetectionWorker, WorkerStats};
