//! User actions wired to the pipeline.
//!
//! Each action catches its own errors and reports them through the shell.
//! Nothing here terminates the process; only detector initialization, which
//! happens before an `App` exists, is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::annotate::PredictionResult;
use crate::camera::CameraSource;
use crate::error::LeafResult;
use crate::frame::Frame;
use crate::pipeline::Pipeline;
use crate::session::{CaptureSession, SessionPhase, TickOutcome};
use crate::shell::PresentationShell;
use crate::ui::Ui;
use crate::upload::decode_upload;

/// How a live run is driven.
#[derive(Clone, Debug)]
pub struct LiveOptions {
    /// Stop after this many frames have been read, shown or not, even
    /// without a capture.
    pub max_ticks: Option<u64>,
    /// Request a freeze once this many frames have been shown.
    pub freeze_after: Option<u64>,
    /// Pause between ticks.
    pub tick_interval: Duration,
    /// Set from outside (e.g. Ctrl-C) to end the session.
    pub stop: Arc<AtomicBool>,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            max_ticks: None,
            freeze_after: None,
            tick_interval: Duration::from_millis(100),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveSummary {
    /// Frames read from the camera, including ones inference skipped.
    pub frames_read: u64,
    pub frames_shown: u64,
    pub captured: bool,
    pub device_lost: bool,
    pub stopped: bool,
}

pub struct App<S: PresentationShell> {
    pipeline: Pipeline,
    shell: S,
    ui: Option<Ui>,
}

impl<S: PresentationShell> App<S> {
    pub fn new(pipeline: Pipeline, shell: S) -> Self {
        Self {
            pipeline,
            shell,
            ui: None,
        }
    }

    /// Show a progress stage around each prediction.
    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn into_shell(self) -> S {
        self.shell
    }

    /// Upload tab: decode, predict, show, offer download.
    ///
    /// Invalid files are reported and `None` is returned; the upload flow
    /// simply resets.
    pub fn predict_upload(&mut self, filename: &str, bytes: &[u8]) -> Option<PredictionResult> {
        let frame = match decode_upload(filename, bytes) {
            Ok(frame) => frame,
            Err(err) => {
                self.shell.warn(&err.to_string());
                return None;
            }
        };
        self.shell.display("uploaded image", &frame);
        match self.present_prediction(&frame) {
            Ok(result) => Some(result),
            Err(err) => {
                self.shell.warn(&err.to_string());
                None
            }
        }
    }

    /// Live tab: stream until a freeze is served, the camera fails, the tick
    /// budget runs out or `stop` is raised.
    ///
    /// On a capture the session is left in `Captured` so the caller can
    /// retake or disable; every other exit leaves it `Idle`.
    pub fn run_live<C: CameraSource>(
        &mut self,
        session: &mut CaptureSession<C>,
        options: &LiveOptions,
    ) -> LiveSummary {
        let mut summary = LiveSummary::default();
        if let Err(err) = session.enable() {
            self.shell.warn(&err.to_string());
            return summary;
        }

        loop {
            if options.stop.load(Ordering::SeqCst) {
                session.disable();
                summary.stopped = true;
                break;
            }
            if options
                .max_ticks
                .is_some_and(|max| summary.frames_read >= max)
            {
                session.disable();
                break;
            }

            match session.tick(&mut self.pipeline) {
                TickOutcome::Frame(result) => {
                    summary.frames_read += 1;
                    summary.frames_shown += 1;
                    self.shell.display("live", &result.image);
                    if options.freeze_after == Some(summary.frames_shown) {
                        session.request_freeze();
                    }
                }
                TickOutcome::FrameSkipped { warning } => {
                    summary.frames_read += 1;
                    self.shell.warn(&warning);
                }
                TickOutcome::Captured(captured) => {
                    summary.frames_read += 1;
                    summary.captured = true;
                    self.shell.display("captured image", &captured.frame);
                    match captured.result {
                        Some(result) => {
                            if let Err(err) = self.present_result(&result) {
                                self.shell.warn(&err.to_string());
                            }
                        }
                        None => self.shell.warn("captured frame could not be analysed"),
                    }
                    break;
                }
                TickOutcome::DeviceLost { warning } => {
                    summary.device_lost = true;
                    self.shell.warn(&warning);
                    break;
                }
                TickOutcome::Idle | TickOutcome::Holding => break,
            }

            if session.phase() == SessionPhase::Streaming && !options.tick_interval.is_zero() {
                std::thread::sleep(options.tick_interval);
            }
        }
        summary
    }

    fn present_prediction(&mut self, frame: &Frame) -> LeafResult<PredictionResult> {
        let stage = self.ui.as_ref().map(|ui| ui.stage("processing"));
        let result = match self.pipeline.predict(frame) {
            Ok(result) => result,
            Err(err) => {
                if let Some(stage) = stage {
                    stage.fail(&err.to_string());
                }
                return Err(err);
            }
        };
        drop(stage);
        self.present_result(&result)?;
        Ok(result)
    }

    fn present_result(&mut self, result: &PredictionResult) -> LeafResult<()> {
        self.shell.display("detection result", &result.image);
        self.shell.show_label(&result.label);
        let download = result.download()?;
        self.shell.offer_download(download);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use crate::camera::{V4l2Camera, V4l2Config};
    use crate::detect::{Detector, ScriptedBackend};
    use crate::export::Download;

    #[derive(Default)]
    struct RecordingShell {
        captions: Vec<String>,
        labels: Vec<String>,
        warnings: Vec<String>,
        downloads: Vec<Download>,
    }

    impl PresentationShell for RecordingShell {
        fn display(&mut self, caption: &str, _frame: &Frame) {
            self.captions.push(caption.to_string());
        }

        fn show_label(&mut self, label: &str) {
            self.labels.push(label.to_string());
        }

        fn warn(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }

        fn offer_download(&mut self, download: Download) {
            self.downloads.push(download);
        }
    }

    fn app() -> App<RecordingShell> {
        let pipeline = Pipeline::new(Detector::new(ScriptedBackend::new(), 0.473), Annotator::new());
        App::new(pipeline, RecordingShell::default())
    }

    fn camera(device: &str) -> CaptureSession<V4l2Camera> {
        CaptureSession::new(V4l2Camera::new(V4l2Config {
            device: device.to_string(),
            width: 8,
            height: 8,
        }))
    }

    fn options(max_ticks: Option<u64>, freeze_after: Option<u64>) -> LiveOptions {
        LiveOptions {
            max_ticks,
            freeze_after,
            tick_interval: Duration::ZERO,
            ..LiveOptions::default()
        }
    }

    #[test]
    fn corrupt_upload_is_reported_not_fatal() {
        let mut app = app();
        assert!(app.predict_upload("leaf.png", b"garbage").is_none());
        let shell = app.into_shell();
        assert_eq!(shell.warnings.len(), 1);
        assert!(shell.downloads.is_empty());
    }

    #[test]
    fn live_run_captures_after_requested_frames() {
        let mut app = app();
        let mut session = camera("stub://cam");
        let summary = app.run_live(&mut session, &options(None, Some(2)));
        assert!(summary.captured);
        assert_eq!(summary.frames_shown, 2);
        assert_eq!(session.phase(), SessionPhase::Captured);

        let shell = app.into_shell();
        assert_eq!(shell.downloads.len(), 1);
        assert_eq!(shell.labels, vec!["no detection found"]);
        assert!(shell.captions.contains(&"captured image".to_string()));
    }

    #[test]
    fn live_run_stops_at_tick_budget() {
        let mut app = app();
        let mut session = camera("stub://cam");
        let summary = app.run_live(&mut session, &options(Some(3), None));
        assert_eq!(summary.frames_shown, 3);
        assert!(!summary.captured);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn failing_detector_still_counts_toward_tick_budget() {
        let backend = (0..6).fold(ScriptedBackend::new(), |b, i| {
            b.push_failure(format!("inference error {i}"))
        });
        let pipeline = Pipeline::new(Detector::new(backend, 0.473), Annotator::new());
        let mut app = App::new(pipeline, RecordingShell::default());
        let mut session = camera("stub://cam");

        let summary = app.run_live(&mut session, &options(Some(2), None));
        assert_eq!(summary.frames_read, 2);
        assert_eq!(summary.frames_shown, 0);
        assert_eq!(session.ticks(), 2);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(app.shell().warnings.len(), 2);
    }

    #[test]
    fn stop_flag_ends_session() {
        let mut app = app();
        let mut session = camera("stub://cam");
        let opts = options(None, None);
        opts.stop.store(true, Ordering::SeqCst);
        let summary = app.run_live(&mut session, &opts);
        assert!(summary.stopped);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn device_loss_is_a_warning() {
        let mut app = app();
        let mut session = camera("stub://cam?fail_after=1");
        let summary = app.run_live(&mut session, &options(Some(10), None));
        assert!(summary.device_lost);
        assert_eq!(summary.frames_shown, 1);
        assert_eq!(app.shell().warnings.len(), 1);
    }
}
