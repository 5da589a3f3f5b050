//! V4L2 camera source.
//!
//! `V4l2Camera` opens a local device node (default `/dev/video0`, the system's
//! first capture device) and reads frames in-memory. `stub://` paths produce
//! synthetic leaf-colored frames instead, so the capture flow can run without
//! hardware. No resolution or frame-rate controls are exposed to users; the
//! configured size is only a request to the driver.

use crate::camera::{CameraSource, CameraStream};
use crate::error::{LeafError, LeafResult};
use crate::frame::{Frame, PixelOrder, CHANNELS};

/// Prefix selecting the synthetic camera.
pub const STUB_DEVICE_PREFIX: &str = "stub://";

/// Configuration for a V4L2 camera.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0").
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// V4L2 camera source.
pub struct V4l2Camera {
    config: V4l2Config,
    opened: u64,
}

impl V4l2Camera {
    pub fn new(config: V4l2Config) -> Self {
        Self { config, opened: 0 }
    }

    /// Number of successful opens so far.
    pub fn times_opened(&self) -> u64 {
        self.opened
    }

    fn open_stream(&self) -> LeafResult<Box<dyn CameraStream>> {
        if self.config.device.starts_with(STUB_DEVICE_PREFIX) {
            return Ok(Box::new(SyntheticStream::new(&self.config)?));
        }
        open_device(&self.config)
    }
}

impl CameraSource for V4l2Camera {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn open(&mut self) -> LeafResult<Box<dyn CameraStream>> {
        let stream = self.open_stream()?;
        self.opened += 1;
        Ok(stream)
    }
}

#[cfg(feature = "camera-v4l2")]
fn open_device(config: &V4l2Config) -> LeafResult<Box<dyn CameraStream>> {
    Ok(Box::new(device::DeviceStream::connect(config)?))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(config: &V4l2Config) -> LeafResult<Box<dyn CameraStream>> {
    Err(LeafError::DeviceUnavailable(format!(
        "{}: V4L2 capture requires the camera-v4l2 feature",
        config.device
    )))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticStream {
    device: String,
    width: u32,
    height: u32,
    frame_count: u64,
    fail_after: Option<u64>,
}

impl SyntheticStream {
    fn new(config: &V4l2Config) -> LeafResult<Self> {
        let fail_after = parse_fail_after(&config.device)?;
        log::info!("camera: connected to {} (synthetic)", config.device);
        Ok(Self {
            device: config.device.clone(),
            width: config.width,
            height: config.height,
            frame_count: 0,
            fail_after,
        })
    }

    /// Leaf-green gradient that drifts a little every frame.
    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.width as u64, self.height as u64);
        let mut pixels = Vec::with_capacity((w * h) as usize * CHANNELS);
        for y in 0..h {
            for x in 0..w {
                let shade = ((x + y + self.frame_count) % 64) as u8;
                pixels.extend_from_slice(&[30 + shade / 2, 110 + shade, 40]);
            }
        }
        pixels
    }
}

impl CameraStream for SyntheticStream {
    fn read_frame(&mut self) -> LeafResult<Frame> {
        if let Some(limit) = self.fail_after {
            if self.frame_count >= limit {
                return Err(LeafError::DeviceUnavailable(format!(
                    "{}: synthetic read failure after {} frames",
                    self.device, limit
                )));
            }
        }
        self.frame_count += 1;
        Frame::from_raw(
            self.width,
            self.height,
            CHANNELS,
            PixelOrder::Rgb,
            self.generate_pixels(),
        )
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        log::info!(
            "camera: released {} after {} frames",
            self.device,
            self.frame_count
        );
    }
}

fn parse_fail_after(device: &str) -> LeafResult<Option<u64>> {
    let Some((_, query)) = device.split_once('?') else {
        return Ok(None);
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("fail_after=") {
            let n = value.parse().map_err(|_| {
                LeafError::DeviceUnavailable(format!("{device}: fail_after must be an integer"))
            })?;
            return Ok(Some(n));
        }
    }
    Ok(None)
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;

    use super::V4l2Config;
    use crate::camera::CameraStream;
    use crate::error::{LeafError, LeafResult};
    use crate::frame::{Frame, PixelOrder, CHANNELS};

    #[derive(Clone, Copy, Debug)]
    enum Encoding {
        Rgb,
        Bgr,
        Yuyv,
        Mjpeg,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    pub(super) struct DeviceStream {
        path: String,
        state: DeviceState,
        width: u32,
        height: u32,
        encoding: Encoding,
        frame_count: u64,
    }

    impl DeviceStream {
        pub(super) fn connect(config: &V4l2Config) -> LeafResult<Self> {
            Self::try_connect(config).map_err(|err| {
                LeafError::DeviceUnavailable(format!("{}: {:#}", config.device, err))
            })
        }

        fn try_connect(config: &V4l2Config) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let device = v4l::Device::with_path(&config.device)
                .with_context(|| format!("open v4l2 device {}", config.device))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = config.width;
            format.height = config.height;
            // Drivers that lack MJPG adjust the fourcc, usually to YUYV.
            format.fourcc = v4l::FourCC::new(b"MJPG");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "camera: failed to set format on {}: {}",
                        config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };

            let encoding = match &format.fourcc.repr {
                b"RGB3" => Encoding::Rgb,
                b"BGR3" => Encoding::Bgr,
                b"YUYV" => Encoding::Yuyv,
                b"MJPG" => Encoding::Mjpeg,
                other => {
                    return Err(anyhow!(
                        "unsupported pixel format {}",
                        String::from_utf8_lossy(other)
                    ))
                }
            };

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()?;

            log::info!(
                "camera: connected to {} ({}x{}, {:?})",
                config.device,
                format.width,
                format.height,
                encoding
            );
            Ok(Self {
                path: config.device.clone(),
                state,
                width: format.width,
                height: format.height,
                encoding,
                frame_count: 0,
            })
        }

        fn decode(&self, buf: &[u8]) -> LeafResult<Frame> {
            match self.encoding {
                Encoding::Rgb | Encoding::Bgr => {
                    let len = (self.width * self.height) as usize * CHANNELS;
                    let data = buf.get(..len).ok_or_else(|| {
                        LeafError::DeviceUnavailable(format!(
                            "{}: short frame ({} bytes)",
                            self.path,
                            buf.len()
                        ))
                    })?;
                    let order = match self.encoding {
                        Encoding::Bgr => PixelOrder::Bgr,
                        _ => PixelOrder::Rgb,
                    };
                    Frame::from_raw(self.width, self.height, CHANNELS, order, data.to_vec())
                }
                Encoding::Yuyv => Frame::from_yuyv(self.width, self.height, buf).map_err(|err| {
                    LeafError::DeviceUnavailable(format!("{}: bad yuyv frame: {err}", self.path))
                }),
                Encoding::Mjpeg => {
                    let image = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                        .map_err(|e| {
                            LeafError::DeviceUnavailable(format!("{}: bad mjpeg frame: {e}", self.path))
                        })?;
                    Frame::from_rgb_image(image.to_rgb8())
                }
            }
        }
    }

    impl CameraStream for DeviceStream {
        fn read_frame(&mut self) -> LeafResult<Frame> {
            use v4l::io::traits::CaptureStream;

            let buf = self
                .state
                .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
                .map_err(|err| {
                    LeafError::DeviceUnavailable(format!("{}: capture failed: {}", self.path, err))
                })?;
            self.frame_count += 1;
            self.decode(&buf)
        }
    }

    impl Drop for DeviceStream {
        fn drop(&mut self) {
            log::info!(
                "camera: released {} after {} frames",
                self.path,
                self.frame_count
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
