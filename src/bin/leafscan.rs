//! leafscan - tomato leaf disease detection from images or a live camera
//!
//! `predict` runs the detector on an uploaded image file, prints the label and
//! writes the annotated PNG. `live` streams the camera through the same
//! pipeline, freezes a frame and writes its annotated PNG.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use leafscan::ui::{Ui, UiMode};
use leafscan::{
    annotator_from_settings, App, CaptureSession, Detector, LeafscanConfig, LiveOptions, Pipeline,
    TerminalShell, V4l2Camera,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Progress display style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto, global = true)]
    ui: UiMode,
    /// Model checkpoint (overrides config).
    #[arg(long, global = true, env = "LEAFSCAN_MODEL_PATH")]
    model: Option<String>,
    /// Directory for downloaded results (overrides config).
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict on an image file (.jpg, .jpeg, .png).
    Predict {
        /// Image to analyse.
        image: PathBuf,
    },
    /// Stream the camera and capture one frame.
    Live {
        /// Camera device (overrides config), e.g. /dev/video0 or stub://demo.
        #[arg(long)]
        device: Option<String>,
        /// Freeze after this many frames have been shown.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        freeze_after: u64,
        /// Give up after reading this many frames without a capture.
        #[arg(long)]
        ticks: Option<u64>,
        /// Milliseconds between frames (overrides config).
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = LeafscanConfig::load().context("loading configuration")?;
    if let Some(model) = &args.model {
        cfg.detector.model_path = model.clone();
    }
    if let Some(out) = &args.out {
        cfg.output_dir = out.clone();
    }

    let ui = Ui::detect(args.ui);
    let detector = {
        let stage = ui.stage("load model");
        match Detector::load(&cfg.detector) {
            Ok(detector) => detector,
            Err(err) => {
                stage.fail("fatal");
                return Err(anyhow!(err)).context("model could not be loaded");
            }
        }
    };
    let pipeline = Pipeline::new(detector, annotator_from_settings(&cfg.annotate));
    log::info!(
        "model {} ready (backend {}, conf {}, label text {})",
        cfg.detector.model_path,
        pipeline.detector().backend_name(),
        pipeline.detector().confidence_threshold(),
        if pipeline.annotator().has_font() { "on" } else { "off" }
    );

    let shell = TerminalShell::new(&cfg.output_dir);
    let mut app = App::new(pipeline, shell).with_ui(ui);

    match args.command {
        Command::Predict { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let name = image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            if app.predict_upload(&name, &bytes).is_none() {
                std::process::exit(1);
            }
        }
        Command::Live {
            device,
            freeze_after,
            ticks,
            interval_ms,
        } => {
            if let Some(device) = device {
                cfg.camera.device = device;
            }
            let options = LiveOptions {
                max_ticks: ticks,
                freeze_after: Some(freeze_after),
                tick_interval: interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(cfg.tick_interval),
                ..LiveOptions::default()
            };
            let stop = options.stop.clone();
            ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
                .context("installing Ctrl-C handler")?;

            let mut session = CaptureSession::new(V4l2Camera::new(cfg.camera.clone()));
            let summary = app.run_live(&mut session, &options);
            session.disable();

            println!("live summary:");
            println!("  frames read: {}", summary.frames_read);
            println!("  frames shown: {}", summary.frames_shown);
            println!("  captured: {}", summary.captured);
            if summary.device_lost {
                println!("  camera lost during streaming");
            }
            if summary.stopped {
                println!("  stopped by user");
            }
            if !summary.captured {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
