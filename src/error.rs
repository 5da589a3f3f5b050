//! Error taxonomy for the detect-and-annotate pipeline.
//!
//! Only `Initialization` is fatal. Every other variant is caught at the
//! boundary of the user action that produced it and turned into a warning.
//! An empty detection set is not an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeafError {
    /// Model checkpoint missing, corrupt, or otherwise unloadable.
    #[error("detector initialization failed: {0}")]
    Initialization(String),

    /// Uploaded file or raw buffer that cannot be used as a 3-channel image.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Camera could not be opened or a frame read failed.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Backend failed while running on a valid frame.
    #[error("inference failed: {0}")]
    Inference(String),

    /// PNG encoding or download write failed.
    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LeafError {
    /// True when the process cannot continue serving requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LeafError::Initialization(_))
    }

    pub(crate) fn initialization(err: anyhow::Error) -> Self {
        LeafError::Initialization(format!("{err:#}"))
    }

    pub(crate) fn inference(err: anyhow::Error) -> Self {
        LeafError::Inference(format!("{err:#}"))
    }
}

pub type LeafResult<T> = Result<T, LeafError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_initialization_is_fatal() {
        assert!(LeafError::Initialization("missing".into()).is_fatal());
        assert!(!LeafError::InvalidInput("bad png".into()).is_fatal());
        assert!(!LeafError::DeviceUnavailable("read failed".into()).is_fatal());
        assert!(!LeafError::Inference("nan".into()).is_fatal());
    }

    #[test]
    fn anyhow_context_is_preserved() {
        let err = anyhow::anyhow!("no such file").context("failed to load model");
        let leaf = LeafError::initialization(err);
        assert_eq!(
            leaf.to_string(),
            "detector initialization failed: failed to load model: no such file"
        );
    }
}
