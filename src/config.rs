use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::V4l2Config;

const DEFAULT_MODEL_PATH: &str = "yolov11.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.473;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_OUTPUT_DIR: &str = ".";
const DEFAULT_TICK_MS: u64 = 100;
const DEFAULT_TEXT_SCALE: f32 = 18.0;

/// Tomato leaf classes of the bundled checkpoint, in model output order.
const DEFAULT_LABELS: [&str; 10] = [
    "bacterial_spot",
    "early_blight",
    "healthy",
    "late_blight",
    "leaf_mold",
    "mosaic_virus",
    "septoria_leaf_spot",
    "spider_mites",
    "target_spot",
    "yellow_leaf_curl_virus",
];

#[derive(Debug, Deserialize, Default)]
struct LeafscanConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    annotate: Option<AnnotateConfigFile>,
    output_dir: Option<PathBuf>,
    tick_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<String>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
    max_detections: Option<usize>,
    labels: Option<Vec<String>>,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
    text_scale: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct LeafscanConfig {
    pub detector: DetectorSettings,
    pub camera: V4l2Config,
    pub annotate: AnnotateSettings,
    pub output_dir: PathBuf,
    pub tick_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub max_detections: usize,
    pub class_names: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            input_size: DEFAULT_INPUT_SIZE,
            max_detections: DEFAULT_MAX_DETECTIONS,
            class_names: default_labels(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotateSettings {
    /// Replaces the bundled label font.
    pub font_path: Option<PathBuf>,
    pub text_scale: f32,
}

impl Default for AnnotateSettings {
    fn default() -> Self {
        Self {
            font_path: None,
            text_scale: DEFAULT_TEXT_SCALE,
        }
    }
}

impl Default for LeafscanConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            camera: V4l2Config {
                device: DEFAULT_CAMERA_DEVICE.to_string(),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
            },
            annotate: AnnotateSettings::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
        }
    }
}

impl LeafscanConfig {
    /// File at `$LEAFSCAN_CONFIG` (if set), then environment overrides, then
    /// validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LEAFSCAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LeafscanConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let model = file.model.unwrap_or_default();
        let class_names = match (model.labels, model.labels_path) {
            (Some(labels), _) => labels,
            (None, Some(path)) => read_labels_file(&path)?,
            (None, None) => defaults.detector.class_names,
        };
        let detector = DetectorSettings {
            model_path: model.path.unwrap_or(defaults.detector.model_path),
            confidence_threshold: model
                .confidence_threshold
                .unwrap_or(defaults.detector.confidence_threshold),
            iou_threshold: model.iou_threshold.unwrap_or(defaults.detector.iou_threshold),
            input_size: model.input_size.unwrap_or(defaults.detector.input_size),
            max_detections: model
                .max_detections
                .unwrap_or(defaults.detector.max_detections),
            class_names,
        };
        let camera = file.camera.unwrap_or_default();
        let camera = V4l2Config {
            device: camera.device.unwrap_or(defaults.camera.device),
            width: camera.width.unwrap_or(defaults.camera.width),
            height: camera.height.unwrap_or(defaults.camera.height),
        };
        let annotate = file.annotate.unwrap_or_default();
        let annotate = AnnotateSettings {
            font_path: annotate.font_path,
            text_scale: annotate.text_scale.unwrap_or(defaults.annotate.text_scale),
        };
        Ok(Self {
            detector,
            camera,
            annotate,
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            tick_interval: file
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LEAFSCAN_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = path;
            }
        }
        if let Ok(conf) = std::env::var("LEAFSCAN_CONFIDENCE") {
            self.detector.confidence_threshold = conf
                .trim()
                .parse()
                .map_err(|_| anyhow!("LEAFSCAN_CONFIDENCE must be a number"))?;
        }
        if let Ok(device) = std::env::var("LEAFSCAN_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(dir) = std::env::var("LEAFSCAN_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(font) = std::env::var("LEAFSCAN_FONT_PATH") {
            if !font.trim().is_empty() {
                self.annotate.font_path = Some(PathBuf::from(font));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if !(d.confidence_threshold > 0.0 && d.confidence_threshold <= 1.0) {
            return Err(anyhow!(
                "confidence threshold must be in (0, 1], got {}",
                d.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&d.iou_threshold) {
            return Err(anyhow!(
                "iou threshold must be in [0, 1], got {}",
                d.iou_threshold
            ));
        }
        if d.input_size == 0 || d.input_size % 32 != 0 {
            return Err(anyhow!(
                "model input size must be a positive multiple of 32, got {}",
                d.input_size
            ));
        }
        if d.class_names.is_empty() {
            return Err(anyhow!("at least one class label is required"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera size must be non-zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        if self.annotate.text_scale <= 0.0 {
            return Err(anyhow!("text scale must be positive"));
        }
        Ok(())
    }
}

/// Default class list.
pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

fn read_config_file(path: &Path) -> Result<LeafscanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// One class name per line; blank lines and `#` comments are skipped.
fn read_labels_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
