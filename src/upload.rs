//! Decoding user-supplied image files.

use std::path::Path;

use image::{ColorType, ImageFormat};

use crate::error::{LeafError, LeafResult};
use crate::frame::Frame;

/// Extensions accepted for upload (compared case-insensitively).
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Map an upload's file name to its image format.
pub fn upload_format(filename: &str) -> LeafResult<ImageFormat> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| {
            LeafError::InvalidInput(format!("{filename}: missing file extension"))
        })?;
    match ext.as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        other => Err(LeafError::InvalidInput(format!(
            "{filename}: unsupported extension .{other} (expected one of {})",
            ACCEPTED_EXTENSIONS.join(", ")
        ))),
    }
}

/// Decode uploaded bytes into an RGB frame.
///
/// Grey and alpha images are converted to RGB; alpha is dropped.
pub fn decode_upload(filename: &str, bytes: &[u8]) -> LeafResult<Frame> {
    let format = upload_format(filename)?;
    if bytes.is_empty() {
        return Err(LeafError::InvalidInput(format!("{filename}: empty file")));
    }
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| LeafError::InvalidInput(format!("{filename}: {e}")))?;
    if image.color() != ColorType::Rgb8 {
        log::debug!("upload {}: converting {:?} to rgb8", filename, image.color());
    }
    let frame = Frame::from_rgb_image(image.to_rgb8())?;
    log::info!(
        "upload {}: decoded {}x{}",
        filename,
        frame.width(),
        frame.height()
    );
    Ok(frame)
}

/// Read and decode an image file from disk.
pub fn read_upload(path: &Path) -> LeafResult<Frame> {
    let bytes = std::fs::read(path).map_err(|e| {
        LeafError::InvalidInput(format!("failed to read {}: {}", path.display(), e))
    })?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    decode_upload(name, &bytes)
}
