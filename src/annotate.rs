//! Detection overlay rendering.
//!
//! Draws each detection's box and class name onto a copy of the input frame
//! and picks the primary label shown to the user. Confidence scores are never
//! rendered.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::error::LeafResult;
use crate::export::Download;
use crate::frame::Frame;

/// Label reported when the detector finds nothing.
pub const NO_DETECTION_LABEL: &str = "no detection found";

const BOX_THICKNESS: u32 = 2;
const DEFAULT_TEXT_SCALE: f32 = 18.0;
const BANNER_PADDING: u32 = 3;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// DejaVu Sans Mono, see `assets/DejaVuSansMono-LICENSE.txt`.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

/// Box color for a class id.
pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

/// Class of the first detection in output order, or the sentinel.
pub fn primary_label(detections: &[Detection]) -> String {
    detections
        .first()
        .map(|d| d.class_name.clone())
        .unwrap_or_else(|| NO_DETECTION_LABEL.to_string())
}

/// Text drawn next to one box.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelOverlay {
    pub text: String,
    /// Top-left corner of the label banner.
    pub x: i32,
    pub y: i32,
    pub color: [u8; 3],
    /// False when no font is configured and only the banner was drawn.
    pub text_rendered: bool,
}

/// Outcome of one detect-and-annotate call. Created per call, never stored.
#[derive(Clone, Debug)]
pub struct PredictionResult {
    /// Input frame with boxes and labels drawn.
    pub image: Frame,
    pub label: String,
    pub detections: Vec<Detection>,
    pub overlays: Vec<LabelOverlay>,
    /// Digest of the frame the detections were computed on.
    pub source_digest: [u8; 32],
    pub completed_at: DateTime<Local>,
}

impl PredictionResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// True when this result was computed from `frame`.
    pub fn was_computed_from(&self, frame: &Frame) -> bool {
        self.source_digest == frame.digest()
    }

    /// PNG download named after the label and completion time.
    pub fn download(&self) -> LeafResult<Download> {
        Download::from_frame(&self.image, &self.label, self.completed_at)
    }
}

// ----------------------------------------------------------------------------
// Annotator
// ----------------------------------------------------------------------------

pub struct Annotator {
    font: Option<FontVec>,
    text_scale: f32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Annotator using the bundled label font.
    pub fn new() -> Self {
        let font = match FontVec::try_from_vec(BUNDLED_FONT.to_vec()) {
            Ok(font) => Some(font),
            Err(err) => {
                log::warn!("annotate: bundled font unusable ({err}); labels drawn without text");
                None
            }
        };
        Self {
            font,
            text_scale: DEFAULT_TEXT_SCALE,
        }
    }

    /// Boxes and label banners only.
    pub fn without_font() -> Self {
        Self {
            font: None,
            text_scale: DEFAULT_TEXT_SCALE,
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_text_scale(mut self, scale: f32) -> Self {
        self.text_scale = scale;
        self
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(Self::without_font().with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `detections` onto a copy of `frame`.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> PredictionResult {
        let source_digest = frame.digest();
        let mut image = frame.clone();
        let mut overlays = Vec::with_capacity(detections.len());

        for detection in detections {
            if let Some(overlay) = self.draw_detection(image.canvas_mut(), detection) {
                overlays.push(overlay);
            }
        }

        PredictionResult {
            image,
            label: primary_label(detections),
            detections: detections.to_vec(),
            overlays,
            source_digest,
            completed_at: Local::now(),
        }
    }

    fn draw_detection(
        &self,
        canvas: &mut RgbImage,
        detection: &Detection,
    ) -> Option<LabelOverlay> {
        let (width, height) = canvas.dimensions();
        let x1 = detection.bbox.x.max(0.0).floor() as i32;
        let y1 = detection.bbox.y.max(0.0).floor() as i32;
        let x2 = detection.bbox.right().min(width as f32).ceil() as i32;
        let y2 = detection.bbox.bottom().min(height as f32).ceil() as i32;
        if x2 - x1 < 1 || y2 - y1 < 1 {
            log::debug!(
                "annotate: skipping degenerate box for {}",
                detection.class_name
            );
            return None;
        }

        let color = class_color(detection.class_id);
        let (box_w, box_h) = ((x2 - x1) as u32, (y2 - y1) as u32);
        for inset in 0..BOX_THICKNESS {
            let w = box_w.saturating_sub(2 * inset);
            let h = box_h.saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at(x1 + inset as i32, y1 + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, Rgb(color));
        }

        let text = detection.class_name.clone();
        let (text_w, text_h) = self.measure(&text);
        let banner_w = text_w + 2 * BANNER_PADDING;
        let banner_h = text_h + 2 * BANNER_PADDING;
        let banner_y = if y1 >= banner_h as i32 {
            y1 - banner_h as i32
        } else {
            y1
        };
        let banner = Rect::at(x1, banner_y).of_size(banner_w, banner_h);
        draw_filled_rect_mut(canvas, banner, Rgb(color));

        let text_rendered = match &self.font {
            Some(font) => {
                draw_text_mut(
                    canvas,
                    TEXT_COLOR,
                    x1 + BANNER_PADDING as i32,
                    banner_y + BANNER_PADDING as i32,
                    PxScale::from(self.text_scale),
                    font,
                    &text,
                );
                true
            }
            None => false,
        };

        Some(LabelOverlay {
            text,
            x: x1,
            y: banner_y,
            color,
            text_rendered,
        })
    }

    fn measure(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(self.text_scale), font, text);
                (w.max(1), h.max(1))
            }
            None => {
                let glyph_w = (self.text_scale * 0.6).ceil() as u32;
                let chars = text.chars().count().max(1) as u32;
                (glyph_w * chars, self.text_scale.ceil() as u32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn leaf(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([40, (x + y) as u8, 30]));
        Frame::from_rgb_image(image).unwrap()
    }

    fn detection(class_id: usize, name: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection::new(bbox, class_id, name, confidence)
    }

    #[test]
    fn empty_detections_leave_image_untouched() {
        let frame = leaf(64, 48);
        let result = Annotator::new().annotate(&frame, &[]);
        assert_eq!(result.label, NO_DETECTION_LABEL);
        assert_eq!(result.image, frame);
        assert!(result.overlays.is_empty());
        assert!(result.is_empty());
    }

    #[test]
    fn primary_label_follows_output_order_not_confidence() {
        let frame = leaf(200, 200);
        let dets = vec![
            detection(1, "leaf_mold", 0.5, BoundingBox::new(10.0, 60.0, 40.0, 40.0)),
            detection(0, "early_blight", 0.95, BoundingBox::new(100.0, 100.0, 50.0, 50.0)),
        ];
        let result = Annotator::new().annotate(&frame, &dets);
        assert_eq!(result.label, "leaf_mold");
        assert_eq!(result.overlays.len(), 2);
    }

    #[test]
    fn annotated_image_keeps_dimensions_and_draws_box() {
        let frame = leaf(120, 90);
        let bbox = BoundingBox::new(30.0, 40.0, 50.0, 30.0);
        let dets = [detection(0, "early_blight", 0.81, bbox)];
        let result = Annotator::new().annotate(&frame, &dets);

        assert_eq!(result.image.dimensions(), frame.dimensions());
        assert_ne!(result.image, frame);
        let edge = result.image.as_image().get_pixel(30, 60);
        assert_eq!(edge.0, class_color(0));
    }

    #[test]
    fn overlay_text_is_class_name_without_score() {
        let frame = leaf(120, 90);
        let bbox = BoundingBox::new(30.0, 40.0, 50.0, 30.0);
        let dets = [detection(0, "early_blight", 0.81, bbox)];
        let result = Annotator::new().annotate(&frame, &dets);
        let overlay = &result.overlays[0];
        assert_eq!(overlay.text, "early_blight");
        assert!(!overlay.text.chars().any(|c| c.is_ascii_digit()));
        assert!(overlay.text_rendered);
    }

    fn banner_pixels_off_fill(annotator: &Annotator) -> usize {
        let frame = leaf(160, 120);
        let bbox = BoundingBox::new(10.0, 60.0, 120.0, 40.0);
        let result = annotator.annotate(&frame, &[detection(0, "early_blight", 0.81, bbox)]);
        let overlay = &result.overlays[0];
        let (text_w, text_h) = annotator.measure(&overlay.text);
        let fill = class_color(0);
        let canvas = result.image.as_image();
        let mut off = 0;
        for y in overlay.y..overlay.y + (text_h + 2 * BANNER_PADDING) as i32 {
            for x in overlay.x..overlay.x + (text_w + 2 * BANNER_PADDING) as i32 {
                if canvas.get_pixel(x as u32, y as u32).0 != fill {
                    off += 1;
                }
            }
        }
        off
    }

    #[test]
    fn label_text_is_drawn_inside_banner() {
        let annotator = Annotator::new();
        assert!(annotator.has_font());
        assert!(banner_pixels_off_fill(&annotator) > 0);
    }

    #[test]
    fn fontless_annotator_paints_plain_banner() {
        let annotator = Annotator::without_font();
        assert!(!annotator.has_font());
        assert_eq!(banner_pixels_off_fill(&annotator), 0);
        let frame = leaf(160, 120);
        let bbox = BoundingBox::new(10.0, 60.0, 120.0, 40.0);
        let result = annotator.annotate(&frame, &[detection(0, "early_blight", 0.81, bbox)]);
        assert!(!result.overlays[0].text_rendered);
    }

    #[test]
    fn banner_moves_inside_box_at_top_edge() {
        let frame = leaf(100, 100);
        let bbox = BoundingBox::new(10.0, 0.0, 50.0, 50.0);
        let result = Annotator::new().annotate(&frame, &[detection(2, "healthy", 0.7, bbox)]);
        assert_eq!(result.overlays[0].y, 0);
    }

    #[test]
    fn degenerate_boxes_still_drive_the_label() {
        let frame = leaf(50, 50);
        let bbox = BoundingBox::new(80.0, 80.0, 10.0, 10.0);
        let result = Annotator::new().annotate(&frame, &[detection(3, "septoria", 0.6, bbox)]);
        assert_eq!(result.label, "septoria");
        assert!(result.overlays.is_empty());
        assert_eq!(result.image, frame);
    }

    #[test]
    fn result_records_its_source_frame() {
        let frame = leaf(20, 20);
        let other = leaf(21, 20);
        let result = Annotator::new().annotate(&frame, &[]);
        assert!(result.was_computed_from(&frame));
        assert!(!result.was_computed_from(&other));
    }
}
