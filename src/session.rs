//! Live capture session.
//!
//! The polling camera loop is an explicit state machine driven by `tick()`.
//! Callers invoke `tick()` on whatever schedule they have (a timer, a UI
//! refresh, a plain loop); one tick reads at most one frame.
//!
//! ```text
//!            enable                     freeze served
//!   Idle ───────────────▶ Streaming ───────────────────▶ Captured
//!    ▲  ◀─────────────────   │  ▲   ◀──────────────────     │
//!    │   disable / read fail │  └──────── retake ───────────┘
//!    └────────────────────────────────── disable ───────────┘
//! ```
//!
//! The camera stream is held only while `Streaming`. It is dropped (released)
//! on disable, on read failure, when a freeze is served, and when the session
//! itself is dropped.

use crate::annotate::PredictionResult;
use crate::camera::{CameraSource, CameraStream};
use crate::error::{LeafError, LeafResult};
use crate::frame::Frame;
use crate::pipeline::Pipeline;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Camera off. Initial and resting state.
    Idle,
    /// Camera on, a frame is read and predicted every tick.
    Streaming,
    /// Camera on but released; a frozen frame is held for download.
    Captured,
}

/// User-visible session flags.
///
/// `frozen_frame` is only ever set while the camera is enabled, after a
/// freeze request has been served.
#[derive(Clone, Debug, Default)]
pub struct CaptureSessionState {
    pub camera_enabled: bool,
    pub freeze_requested: bool,
    pub frozen_frame: Option<Frame>,
}

/// A frozen frame and the prediction computed from exactly that frame.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub frame: Frame,
    /// `None` when the final inference pass failed; see session warnings.
    pub result: Option<PredictionResult>,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Camera is off; nothing was read.
    Idle,
    /// A frame was read and predicted; show it.
    Frame(PredictionResult),
    /// A frame was read but inference failed; streaming continues.
    FrameSkipped { warning: String },
    /// A freeze request was served on this tick.
    Captured(CapturedFrame),
    /// The camera read failed; the session is back to `Idle`.
    DeviceLost { warning: String },
    /// A frozen frame is held; polling is stopped until retake or disable.
    Holding,
}

pub struct CaptureSession<C: CameraSource> {
    camera: C,
    stream: Option<Box<dyn CameraStream>>,
    state: CaptureSessionState,
    frozen_result: Option<PredictionResult>,
    warnings: Vec<String>,
    ticks: u64,
}

impl<C: CameraSource> CaptureSession<C> {
    pub fn new(camera: C) -> Self {
        Self {
            camera,
            stream: None,
            state: CaptureSessionState::default(),
            frozen_result: None,
            warnings: Vec::new(),
            ticks: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.state.camera_enabled {
            SessionPhase::Idle
        } else if self.stream.is_some() {
            SessionPhase::Streaming
        } else {
            SessionPhase::Captured
        }
    }

    pub fn state(&self) -> &CaptureSessionState {
        &self.state
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Prediction for the frozen frame, if one was captured.
    pub fn frozen_result(&self) -> Option<&PredictionResult> {
        self.frozen_result.as_ref()
    }

    /// Warnings raised so far, oldest first.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Ticks that read a frame.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Turn the camera on. A no-op while already streaming; from `Captured`
    /// this behaves like `retake`.
    pub fn enable(&mut self) -> LeafResult<()> {
        match self.phase() {
            SessionPhase::Streaming => Ok(()),
            SessionPhase::Captured => self.retake(),
            SessionPhase::Idle => {
                self.acquire()?;
                self.state.camera_enabled = true;
                Ok(())
            }
        }
    }

    /// Turn the camera off, releasing it and dropping any frozen frame.
    pub fn disable(&mut self) {
        if self.state.camera_enabled {
            log::info!("session: camera disabled");
        }
        self.reset();
    }

    /// Ask for the next frame to be frozen. Ignored unless streaming.
    pub fn request_freeze(&mut self) -> bool {
        if self.phase() != SessionPhase::Streaming {
            return false;
        }
        self.state.freeze_requested = true;
        true
    }

    /// Discard the frozen frame and resume streaming.
    pub fn retake(&mut self) -> LeafResult<()> {
        if self.phase() != SessionPhase::Captured {
            return Ok(());
        }
        self.state.frozen_frame = None;
        self.frozen_result = None;
        if let Err(err) = self.acquire() {
            self.reset();
            return Err(err);
        }
        Ok(())
    }

    /// Advance the session by one step.
    pub fn tick(&mut self, pipeline: &mut Pipeline) -> TickOutcome {
        match self.phase() {
            SessionPhase::Idle => return TickOutcome::Idle,
            SessionPhase::Captured => return TickOutcome::Holding,
            SessionPhase::Streaming => {}
        }

        let read = match self.stream.as_mut() {
            Some(stream) => stream.read_frame(),
            None => return TickOutcome::Idle,
        };
        let frame = match read {
            Ok(frame) => frame,
            Err(err) => {
                let warning = format!("camera read failed: {err}");
                self.warn(warning.clone());
                self.reset();
                return TickOutcome::DeviceLost { warning };
            }
        };
        self.ticks += 1;

        if self.state.freeze_requested {
            return TickOutcome::Captured(self.serve_freeze(frame, pipeline));
        }

        match pipeline.predict(&frame) {
            Ok(result) => TickOutcome::Frame(result),
            Err(err) => {
                let warning = format!("inference failed on live frame: {err}");
                self.warn(warning.clone());
                TickOutcome::FrameSkipped { warning }
            }
        }
    }

    /// Store the raw frame, release the camera and re-run the pipeline on
    /// exactly the stored frame.
    fn serve_freeze(&mut self, frame: Frame, pipeline: &mut Pipeline) -> CapturedFrame {
        self.state.freeze_requested = false;
        self.stream = None;
        log::info!("session: froze frame {}", frame.short_id());

        let result = match pipeline.predict(&frame) {
            Ok(result) => Some(result),
            Err(err) => {
                self.warn(format!("inference failed on captured frame: {err}"));
                None
            }
        };
        self.frozen_result = result.clone();
        self.state.frozen_frame = Some(frame.clone());
        CapturedFrame { frame, result }
    }

    fn acquire(&mut self) -> LeafResult<()> {
        match self.camera.open() {
            Ok(stream) => {
                log::info!("session: camera {} acquired", self.camera.describe());
                self.stream = Some(stream);
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    LeafError::DeviceUnavailable(_) => err,
                    other => LeafError::DeviceUnavailable(other.to_string()),
                };
                self.warn(format!("cannot open camera {}: {}", self.camera.describe(), err));
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.stream = None;
        self.state = CaptureSessionState::default();
        self.frozen_result = None;
    }

    fn warn(&mut self, warning: String) {
        log::warn!("session: {}", warning);
        self.warnings.push(warning);
    }
}
