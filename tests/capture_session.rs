//! Capture session lifecycle against a mock camera that counts device
//! acquisitions and releases.

use std::cell::Cell;
use std::rc::Rc;

use image::{Rgb, RgbImage};
use leafscan::detect::ScriptedBackend;
use leafscan::{
    Annotator, BoundingBox, CameraSource, CameraStream, CaptureSession, Detection, Detector,
    Frame, LeafError, LeafResult, Pipeline, SessionPhase, TickOutcome,
};

#[derive(Default)]
struct Counters {
    acquired: Cell<u32>,
    released: Cell<u32>,
    reads: Cell<u32>,
}

impl Counters {
    fn balanced(&self) -> bool {
        self.acquired.get() == self.released.get()
    }
}

struct MockCamera {
    counters: Rc<Counters>,
    /// Total reads (across all acquisitions) after which reads fail.
    fail_on_read: Option<u32>,
    refuse_open: bool,
}

impl MockCamera {
    fn new(counters: Rc<Counters>) -> Self {
        Self {
            counters,
            fail_on_read: None,
            refuse_open: false,
        }
    }
}

struct MockStream {
    counters: Rc<Counters>,
    fail_on_read: Option<u32>,
}

impl CameraSource for MockCamera {
    fn describe(&self) -> String {
        "mock://0".to_string()
    }

    fn open(&mut self) -> LeafResult<Box<dyn CameraStream>> {
        if self.refuse_open {
            return Err(LeafError::DeviceUnavailable("mock://0 busy".into()));
        }
        let acquired = self.counters.acquired.get();
        assert!(
            self.counters.released.get() == acquired,
            "camera acquired while a previous handle is still held"
        );
        self.counters.acquired.set(acquired + 1);
        Ok(Box::new(MockStream {
            counters: self.counters.clone(),
            fail_on_read: self.fail_on_read,
        }))
    }
}

impl CameraStream for MockStream {
    fn read_frame(&mut self) -> LeafResult<Frame> {
        let n = self.counters.reads.get() + 1;
        self.counters.reads.set(n);
        if self.fail_on_read == Some(n) {
            return Err(LeafError::DeviceUnavailable("mock://0 unplugged".into()));
        }
        let shade = (n * 10) as u8;
        Frame::from_rgb_image(RgbImage::from_pixel(16, 16, Rgb([shade, 120, 40])))
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let released = self.counters.released.get() + 1;
        assert!(
            released <= self.counters.acquired.get(),
            "camera released more often than acquired"
        );
        self.counters.released.set(released);
    }
}

fn pipeline(backend: ScriptedBackend) -> Pipeline {
    Pipeline::new(Detector::new(backend, 0.473), Annotator::new())
}

#[test]
fn enable_disable_releases_camera_exactly_once() {
    let counters = Rc::new(Counters::default());
    let mut session = CaptureSession::new(MockCamera::new(counters.clone()));
    let mut p = pipeline(ScriptedBackend::new());

    for round in 1..=3 {
        session.enable().unwrap();
        assert_eq!(session.phase(), SessionPhase::Streaming);
        assert!(matches!(session.tick(&mut p), TickOutcome::Frame(_)));
        session.disable();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(counters.acquired.get(), round);
        assert_eq!(counters.released.get(), round);
    }

    session.disable();
    assert_eq!(counters.released.get(), 3);
}

#[test]
fn read_failure_on_third_tick_returns_to_idle() {
    let counters = Rc::new(Counters::default());
    let mut camera = MockCamera::new(counters.clone());
    camera.fail_on_read = Some(3);
    let mut session = CaptureSession::new(camera);
    let mut p = pipeline(ScriptedBackend::new());

    session.enable().unwrap();
    assert!(matches!(session.tick(&mut p), TickOutcome::Frame(_)));
    assert!(matches!(session.tick(&mut p), TickOutcome::Frame(_)));
    assert!(matches!(session.tick(&mut p), TickOutcome::DeviceLost { .. }));

    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(!session.state().camera_enabled);
    assert!(session.state().frozen_frame.is_none());
    assert_eq!(session.warnings().len(), 1);
    assert!(session.warnings()[0].contains("unplugged"));
    assert!(counters.balanced());
    assert_eq!(counters.released.get(), 1);

    assert!(matches!(session.tick(&mut p), TickOutcome::Idle));
}

#[test]
fn dropping_a_streaming_session_releases_the_camera() {
    let counters = Rc::new(Counters::default());
    {
        let mut session = CaptureSession::new(MockCamera::new(counters.clone()));
        session.enable().unwrap();
        assert_eq!(counters.acquired.get(), 1);
        assert_eq!(counters.released.get(), 0);
    }
    assert!(counters.balanced());
}

#[test]
fn refused_open_stays_idle_without_acquiring() {
    let counters = Rc::new(Counters::default());
    let mut camera = MockCamera::new(counters.clone());
    camera.refuse_open = true;
    let mut session = CaptureSession::new(camera);

    assert!(matches!(session.enable(), Err(LeafError::DeviceUnavailable(_))));
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(counters.acquired.get(), 0);
    assert_eq!(session.warnings().len(), 1);
}

#[test]
fn download_corresponds_to_frozen_frame_not_displayed_one() {
    let counters = Rc::new(Counters::default());
    let mut session = CaptureSession::new(MockCamera::new(counters.clone()));
    let spot = Detection::new(BoundingBox::new(2.0, 2.0, 8.0, 8.0), 0, "septoria_leaf_spot", 0.7);
    let mold = Detection::new(BoundingBox::new(1.0, 1.0, 5.0, 5.0), 1, "leaf_mold", 0.9);
    // Live frames 1 and 2, then exactly one pass over the frozen frame. A
    // second pass on the freeze tick would fall through to the fallback.
    let backend = ScriptedBackend::new()
        .push(vec![spot.clone()])
        .push(vec![spot.clone()])
        .push(vec![mold])
        .with_fallback(vec![spot]);
    let mut p = pipeline(backend);

    session.enable().unwrap();
    let shown = match session.tick(&mut p) {
        TickOutcome::Frame(result) => result,
        other => panic!("expected frame, got {other:?}"),
    };
    session.tick(&mut p);
    assert!(session.request_freeze());

    let captured = match session.tick(&mut p) {
        TickOutcome::Captured(captured) => captured,
        other => panic!("expected capture, got {other:?}"),
    };
    assert!(counters.balanced(), "camera released once the freeze is served");
    assert_eq!(session.phase(), SessionPhase::Captured);

    let frozen = session.state().frozen_frame.clone().expect("frozen frame");
    assert_eq!(frozen, captured.frame);
    assert!(!shown.was_computed_from(&frozen));

    let result = session.frozen_result().expect("final prediction");
    assert!(result.was_computed_from(&frozen));
    assert_eq!(result.label, "leaf_mold");

    let download = result.download().unwrap();
    assert!(download.filename.starts_with("leaf_mold_"));
    assert_eq!(
        leafscan::export::decode_png(&download.bytes).unwrap(),
        result.image
    );

    session.disable();
    assert!(session.state().frozen_frame.is_none());
    assert!(counters.balanced());
}

#[test]
fn retake_reacquires_and_clears_frozen_frame() {
    let counters = Rc::new(Counters::default());
    let mut session = CaptureSession::new(MockCamera::new(counters.clone()));
    let mut p = pipeline(ScriptedBackend::new());

    session.enable().unwrap();
    session.request_freeze();
    assert!(matches!(session.tick(&mut p), TickOutcome::Captured(_)));
    assert!(matches!(session.tick(&mut p), TickOutcome::Holding));

    session.enable().unwrap();
    assert_eq!(session.phase(), SessionPhase::Streaming);
    assert!(session.state().frozen_frame.is_none());
    assert_eq!(counters.acquired.get(), 2);
    assert_eq!(counters.released.get(), 1);

    session.disable();
    assert!(counters.balanced());
}
