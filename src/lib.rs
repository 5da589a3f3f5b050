//! leafscan: tomato leaf disease detection front-end.
//!
//! A pretrained object detector finds diseased regions on a leaf image; the
//! annotator draws them and picks a single label for display; the capture
//! session drives the same pipeline from a live camera until the user freezes
//! a frame. The annotated result can be offered as a PNG download.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB image container
//! - `detect`: detector backends and YOLO post-processing
//! - `annotate`: box/label drawing and `PredictionResult`
//! - `pipeline`: detect-and-annotate
//! - `camera`: camera sources (V4L2, synthetic)
//! - `session`: live capture state machine
//! - `upload` / `export`: image files in and out
//! - `shell` / `app`: presentation boundary and user actions

pub mod annotate;
pub mod app;
pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod export;
pub mod frame;
pub mod pipeline;
pub mod session;
pub mod shell;
pub mod ui;
pub mod upload;

pub use annotate::{Annotator, LabelOverlay, PredictionResult, NO_DETECTION_LABEL};
pub use app::{App, LiveOptions, LiveSummary};
pub use camera::{CameraSource, CameraStream, V4l2Camera, V4l2Config};
pub use config::{AnnotateSettings, DetectorSettings, LeafscanConfig};
pub use detect::{BoundingBox, Detection, Detector, DetectorBackend};
pub use error::{LeafError, LeafResult};
pub use export::{download_filename, encode_png, Download};
pub use frame::{Frame, PixelOrder};
pub use pipeline::Pipeline;
pub use session::{CaptureSession, CaptureSessionState, CapturedFrame, SessionPhase, TickOutcome};
pub use shell::{PresentationShell, TerminalShell};

/// Build the annotator described by the settings.
///
/// `font_path` overrides the bundled label font. A configured font that
/// cannot be loaded is reported and the bundled one is used instead.
pub fn annotator_from_settings(settings: &AnnotateSettings) -> Annotator {
    let annotator = match &settings.font_path {
        Some(path) => match Annotator::from_font_file(path) {
            Ok(annotator) => annotator,
            Err(err) => {
                log::warn!("annotate: {:#}; using bundled font", err);
                Annotator::new()
            }
        },
        None => Annotator::new(),
    };
    annotator.with_text_scale(settings.text_scale)
}
