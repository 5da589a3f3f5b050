mod backend;
pub mod backends;
mod detector;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, StubBackend};
pub use detector::Detector;
pub use result::{BoundingBox, Detection};
