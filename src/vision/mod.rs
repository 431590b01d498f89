// Vision Probe - narrow polling interface over the code reader
//
// Frame capture and decoding live outside this crate. A probe only reports
// what was decoded since the last sample.

pub mod drop_file;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{VisionBackend, VisionConfig};

pub use drop_file::DropFileProbe;
pub use scripted::{ScriptedProbe, ScriptedProbeHandle};

/// One decoded identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub data: String,
    pub symbology: String,
}

impl Detection {
    pub fn new(data: impl Into<String>, symbology: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            symbology: symbology.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Vision source unavailable: {0}")]
    Unavailable(String),
    #[error("Vision source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Polled by the identification loop, many times per attempt.
/// An empty vector means nothing was decoded in this sample.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionProbe: Send {
    async fn sample(&mut self) -> Result<Vec<Detection>, VisionError>;
}

/// Build the probe selected by configuration
pub fn probe_from_config(vision: &VisionConfig) -> Box<dyn VisionProbe> {
    match vision.backend {
        VisionBackend::DropFile => Box::new(DropFileProbe::new(&vision.drop_file)),
    }
}
