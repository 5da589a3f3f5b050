use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Backend that replays queued detection lists, one per call.
///
/// Once the queue is empty it keeps returning `fallback` (empty by default).
/// Frames it was called with are recorded by digest so callers can check
/// which frame a result came from.
#[derive(Default)]
pub struct ScriptedBackend {
    queue: VecDeque<Result<Vec<Detection>, String>>,
    fallback: Vec<Detection>,
    seen: Vec<[u8; 32]>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the detections returned by the next unserved call.
    pub fn push(mut self, detections: Vec<Detection>) -> Self {
        self.queue.push_back(Ok(detections));
        self
    }

    /// Queue a failure for the next unserved call.
    pub fn push_failure(mut self, message: impl Into<String>) -> Self {
        self.queue.push_back(Err(message.into()));
        self
    }

    /// Detections returned once the queue runs dry.
    pub fn with_fallback(mut self, detections: Vec<Detection>) -> Self {
        self.fallback = detections;
        self
    }

    pub fn seen(&self) -> &[[u8; 32]] {
        &self.seen
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.seen.push(frame.digest());
        match self.queue.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use crate::frame::PixelOrder;

    #[test]
    fn replays_queue_then_fallback() {
        let frame = Frame::from_raw(1, 1, 3, PixelOrder::Rgb, vec![0, 0, 0]).unwrap();
        let blight = Detection::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, "early_blight", 0.81);
        let mut backend = ScriptedBackend::new()
            .push(vec![blight.clone()])
            .push_failure("boom");

        assert_eq!(backend.detect(&frame).unwrap(), vec![blight]);
        assert!(backend.detect(&frame).is_err());
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.seen().len(), 3);
        assert_eq!(backend.seen()[0], frame.digest());
    }

    #[test]
    fn fallback_repeats_once_queue_is_drained() {
        let frame = Frame::from_raw(1, 1, 3, PixelOrder::Rgb, vec![0, 0, 0]).unwrap();
        let spot = Detection::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 2, "septoria_leaf_spot", 0.6);
        let mut backend = ScriptedBackend::new()
            .push(Vec::new())
            .with_fallback(vec![spot.clone()]);

        assert!(backend.detect(&frame).unwrap().is_empty());
        for _ in 0..2 {
            assert_eq!(backend.detect(&frame).unwrap(), vec![spot.clone()]);
        }
    }
}
