use crate::annotate::{Annotator, PredictionResult};
use crate::detect::Detector;
use crate::error::LeafResult;
use crate::frame::Frame;

/// Detect-and-annotate: frame in, annotated frame plus label out.
pub struct Pipeline {
    detector: Detector,
    annotator: Annotator,
}

impl Pipeline {
    pub fn new(detector: Detector, annotator: Annotator) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Run the detector on `frame` and draw the results onto a copy of it.
    pub fn predict(&mut self, frame: &Frame) -> LeafResult<PredictionResult> {
        let detections = self.detector.detect(frame)?;
        let result = self.annotator.annotate(frame, &detections);
        log::debug!(
            "pipeline: frame {} labelled '{}' ({} boxes)",
            frame.short_id(),
            result.label,
            result.detections.len()
        );
        Ok(result)
    }
}
