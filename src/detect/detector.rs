use std::path::Path;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::detect::result::Detection;
use crate::error::{LeafError, LeafResult};
use crate::frame::Frame;

/// Prefix selecting the checkpoint-free stub backend.
pub const STUB_MODEL_PREFIX: &str = "stub://";

/// Pretrained detector, loaded once at startup.
///
/// `detect` is synchronous and deterministic for a given checkpoint and
/// frame. The confidence threshold is fixed at construction and applied by
/// the backend itself.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
    confidence_threshold: f32,
}

impl Detector {
    pub fn new<B: DetectorBackend + 'static>(backend: B, confidence_threshold: f32) -> Self {
        Self {
            backend: Box::new(backend),
            confidence_threshold,
        }
    }

    /// Load the backend named by the settings' model path.
    ///
    /// Any failure here is an `Initialization` error; there is no degraded mode.
    pub fn load(settings: &DetectorSettings) -> LeafResult<Self> {
        let model_path = settings.model_path.as_str();
        if model_path.starts_with(STUB_MODEL_PREFIX) {
            log::warn!("detector: using stub backend for {}", model_path);
            return Ok(Self::new(StubBackend::new(), settings.confidence_threshold));
        }

        let path = Path::new(model_path);
        if !path.is_file() {
            return Err(LeafError::Initialization(format!(
                "model checkpoint {} not found",
                path.display()
            )));
        }
        Self::load_checkpoint(path, settings)
    }

    #[cfg(feature = "backend-tract")]
    fn load_checkpoint(path: &Path, settings: &DetectorSettings) -> LeafResult<Self> {
        use crate::detect::backends::TractBackend;

        let mut backend =
            TractBackend::new(path, settings.input_size, settings.class_names.clone())
                .map_err(LeafError::initialization)?
                .with_threshold(settings.confidence_threshold)
                .with_iou_threshold(settings.iou_threshold)
                .with_max_detections(settings.max_detections);
        backend.warm_up().map_err(LeafError::initialization)?;
        log::info!(
            "detector: loaded {} ({} classes, input {}px, conf {})",
            path.display(),
            settings.class_names.len(),
            settings.input_size,
            settings.confidence_threshold
        );
        Ok(Self::new(backend, settings.confidence_threshold))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn load_checkpoint(path: &Path, _settings: &DetectorSettings) -> LeafResult<Self> {
        Err(LeafError::Initialization(format!(
            "loading {} requires the backend-tract feature",
            path.display()
        )))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Run the model on a frame. The frame is not modified.
    pub fn detect(&mut self, frame: &Frame) -> LeafResult<Vec<Detection>> {
        let detections = self
            .backend
            .detect(frame)
            .map_err(LeafError::inference)?;
        log::debug!(
            "detector[{}]: frame {} -> {} detections",
            self.backend.name(),
            frame.short_id(),
            detections.len()
        );
        Ok(detections)
    }
}
