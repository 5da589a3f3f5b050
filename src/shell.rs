//! Presentation boundary.
//!
//! The core never renders anything itself. It hands frames, labels, warnings
//! and downloads to a `PresentationShell`, which decides how to show them.

use std::path::PathBuf;

use crate::export::Download;
use crate::frame::Frame;

pub trait PresentationShell {
    /// Show a frame with a caption.
    fn display(&mut self, caption: &str, frame: &Frame);

    /// Show the predicted label.
    fn show_label(&mut self, label: &str);

    /// Report a recoverable problem to the user.
    fn warn(&mut self, message: &str);

    /// Offer an image as a named file.
    fn offer_download(&mut self, download: Download);
}

/// Shell for terminal use: logs what would be shown and writes downloads
/// into an output directory.
pub struct TerminalShell {
    output_dir: PathBuf,
    saved: Vec<PathBuf>,
    warnings: Vec<String>,
}

impl TerminalShell {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            saved: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Paths of downloads written so far.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl PresentationShell for TerminalShell {
    fn display(&mut self, caption: &str, frame: &Frame) {
        log::info!(
            "{}: {}x{} frame {}",
            caption,
            frame.width(),
            frame.height(),
            frame.short_id()
        );
    }

    fn show_label(&mut self, label: &str) {
        println!("prediction: {label}");
    }

    fn warn(&mut self, message: &str) {
        eprintln!("warning: {message}");
        self.warnings.push(message.to_string());
    }

    fn offer_download(&mut self, download: Download) {
        match download.save_into(&self.output_dir) {
            Ok(path) => {
                println!("saved: {}", path.display());
                self.saved.push(path);
            }
            Err(err) => self.warn(&err.to_string()),
        }
    }
}
