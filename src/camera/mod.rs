//! Camera devices.
//!
//! A `CameraSource` hands out a `CameraStream` when opened. The stream owns
//! the device handle: dropping it releases the camera, so every exit path
//! from streaming (disable, read failure, session drop) releases exactly once.
//!
//! Sources:
//! - `stub://name` synthetic frames (tests, demos), optionally failing after
//!   N reads with `stub://name?fail_after=N`
//! - V4L2 devices such as `/dev/video0` (feature: camera-v4l2)

pub mod v4l2;

pub use v4l2::{V4l2Camera, V4l2Config};

use crate::error::LeafResult;
use crate::frame::Frame;

/// Something that can be opened to produce frames.
pub trait CameraSource {
    /// Device identifier for logs and warnings.
    fn describe(&self) -> String;

    /// Acquire the device. The returned stream releases it on drop.
    fn open(&mut self) -> LeafResult<Box<dyn CameraStream>>;
}

/// An acquired camera.
pub trait CameraStream {
    /// Read the next frame. A failure means the device is gone.
    fn read_frame(&mut self) -> LeafResult<Frame>;
}
