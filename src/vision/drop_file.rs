use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Detection, VisionError, VisionProbe};

const DEFAULT_SYMBOLOGY: &str = "QRCODE";

/// Reads codes that an external decoder drops into a file.
///
/// Each line is `code` or `code,symbology`. Sampling consumes the file: it is
/// renamed aside before reading, so a decoder writing a fresh file at the
/// same time is picked up by the next sample instead of being lost.
#[derive(Debug, Clone)]
pub struct DropFileProbe {
    path: PathBuf,
}

impl DropFileProbe {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn taken_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".taken");
        PathBuf::from(name)
    }
}

pub(crate) fn parse_detections(contents: &str) -> Vec<Detection> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (code, symbology) = match line.split_once(',') {
                Some((code, symbology)) => (code.trim(), symbology.trim()),
                None => (line, DEFAULT_SYMBOLOGY),
            };
            if code.is_empty() {
                warn!(line, "Skipping drop file line without a code");
                return None;
            }
            let symbology = if symbology.is_empty() {
                DEFAULT_SYMBOLOGY
            } else {
                symbology
            };
            Some(Detection::new(code, symbology))
        })
        .collect()
}

#[async_trait]
impl VisionProbe for DropFileProbe {
    async fn sample(&mut self) -> Result<Vec<Detection>, VisionError> {
        let taken = self.taken_path();
        match tokio::fs::rename(&self.path, &taken).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let contents = tokio::fs::read_to_string(&taken).await?;
        tokio::fs::remove_file(&taken).await?;

        let detections = parse_detections(&contents);
        if !detections.is_empty() {
            debug!(count = detections.len(), path = %self.path.display(), "Detections read from drop file");
        }
        Ok(detections)
    }
}
