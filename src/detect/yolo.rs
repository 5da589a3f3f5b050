//! Post-processing for YOLO-style detector heads.
//!
//! The head emits a `[4 + num_classes, num_candidates]` matrix (batch axis
//! already removed). Rows 0..4 are centre-x, centre-y, width, height at model
//! input scale; the remaining rows are per-class scores.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Parameters for turning raw head output into detections.
#[derive(Clone, Debug)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Horizontal scale from model input to source image.
    pub scale_x: f32,
    /// Vertical scale from model input to source image.
    pub scale_y: f32,
    /// Source image size, for clipping.
    pub image_width: f32,
    pub image_height: f32,
}

/// Decode a row-major `[4 + num_classes, num_candidates]` buffer.
///
/// Returns detections sorted by confidence (highest first) after class-wise NMS.
pub fn decode_yolo_output(
    data: &[f32],
    num_candidates: usize,
    class_names: &[String],
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    if num_candidates == 0 {
        return Ok(Vec::new());
    }
    if data.len() % num_candidates != 0 {
        return Err(anyhow!(
            "output length {} is not a multiple of {} candidates",
            data.len(),
            num_candidates
        ));
    }
    let rows = data.len() / num_candidates;
    if rows <= 4 {
        return Err(anyhow!("output has {} rows, expected at least 5", rows));
    }
    let num_classes = rows - 4;
    let at = |row: usize, col: usize| data[row * num_candidates + col];

    let mut candidates = Vec::new();
    for i in 0..num_candidates {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..num_classes {
            let score = at(4 + class, i);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < params.confidence_threshold {
            continue;
        }

        let cx = at(0, i) * params.scale_x;
        let cy = at(1, i) * params.scale_y;
        let w = at(2, i) * params.scale_x;
        let h = at(3, i) * params.scale_y;
        let x1 = (cx - w / 2.0).clamp(0.0, params.image_width);
        let y1 = (cy - h / 2.0).clamp(0.0, params.image_height);
        let x2 = (cx + w / 2.0).clamp(0.0, params.image_width);
        let y2 = (cy + h / 2.0).clamp(0.0, params.image_height);

        candidates.push(Detection::new(
            BoundingBox::from_corners(x1, y1, x2, y2),
            best_class,
            class_name(class_names, best_class),
            best_score,
        ));
    }

    let mut kept = nms(candidates, params.iou_threshold);
    kept.truncate(params.max_detections);
    Ok(kept)
}

/// Greedy class-wise non-maximum suppression.
///
/// Sorts by confidence descending and drops any box overlapping a kept box of
/// the same class by more than `iou_threshold`.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; detections.len()];
    let mut kept = Vec::new();
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if detections[j].class_id == detections[i].class_id
                && detections[i].bbox.iou(&detections[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
        kept.push(detections[i].clone());
    }
    kept
}

/// Human-readable class name, falling back to `class_<id>`.
pub fn class_name(class_names: &[String], id: usize) -> String {
    class_names
        .get(id)
        .cloned()
        .unwrap_or_else(|| format!("class_{id}"))
}
