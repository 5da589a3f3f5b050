//! PNG export and download naming.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::ImageFormat;

use crate::error::{LeafError, LeafResult};
use crate::frame::Frame;

pub const PNG_MIME: &str = "image/png";

/// Timestamp layout used in download names.
const FILENAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Encode a frame as PNG bytes.
pub fn encode_png(frame: &Frame) -> LeafResult<Vec<u8>> {
    let mut bytes = Vec::new();
    frame
        .as_image()
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| LeafError::Export(format!("png encode failed: {e}")))?;
    Ok(bytes)
}

/// Decode PNG bytes back into a frame.
pub fn decode_png(bytes: &[u8]) -> LeafResult<Frame> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| LeafError::InvalidInput(format!("png decode failed: {e}")))?;
    Frame::from_rgb_image(image.to_rgb8())
}

/// Make a label safe for use in a file name.
///
/// Anything outside `[A-Za-z0-9_-]` becomes `_`, runs of `_` collapse and
/// leading/trailing `_` are dropped.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "prediction".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{label}_{YYYYMMDD_HHMMSS}.png`
pub fn download_filename(label: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.png",
        sanitize_label(label),
        at.format(FILENAME_TIME_FORMAT)
    )
}

/// An annotated image offered to the user as a file.
#[derive(Clone, Debug)]
pub struct Download {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn from_frame(frame: &Frame, label: &str, at: DateTime<Local>) -> LeafResult<Self> {
        Ok(Self {
            filename: download_filename(label, at),
            mime: PNG_MIME,
            bytes: encode_png(frame)?,
        })
    }

    /// Write the file into `dir`, creating the directory if needed.
    pub fn save_into(&self, dir: &Path) -> LeafResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes).map_err(|e| {
            LeafError::Export(format!("failed to write {}: {}", path.display(), e))
        })?;
        log::info!("download written to {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap()
    }

    #[test]
    fn filename_uses_label_and_timestamp() {
        assert_eq!(
            download_filename("early_blight", at()),
            "early_blight_20261018_090507.png"
        );
    }

    #[test]
    fn sentinel_label_becomes_snake_case() {
        assert_eq!(
            download_filename(crate::annotate::NO_DETECTION_LABEL, at()),
            "no_detection_found_20261018_090507.png"
        );
    }

    #[test]
    fn sanitize_strips_path_characters() {
        assert_eq!(sanitize_label("../late blight!"), "late_blight");
        assert_eq!(sanitize_label("Tomato___Leaf-Mold"), "Tomato_Leaf-Mold");
        assert_eq!(sanitize_label("///"), "prediction");
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let image = RgbImage::from_fn(17, 9, |x, y| Rgb([x as u8 * 13, y as u8 * 29, 200]));
        let frame = Frame::from_rgb_image(image).unwrap();
        let bytes = encode_png(&frame).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(decode_png(&bytes).unwrap(), frame);
    }

    #[test]
    fn download_saves_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::from_rgb_image(RgbImage::new(4, 4)).unwrap();
        let download = Download::from_frame(&frame, "healthy", at()).unwrap();
        assert_eq!(download.mime, "image/png");
        let path = download.save_into(&dir.path().join("out")).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), download.bytes);
    }
}
