use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Detection, VisionError, VisionProbe};

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Result<Vec<Detection>, String>>,
    samples: usize,
}

/// Probe that replays a queue of responses, then reports nothing.
///
/// Test double for the vision backend; `--simulate` only swaps the arm.
/// The handle keeps working after the probe itself was moved into an
/// orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    script: Arc<Mutex<Script>>,
}

/// Shared view of a [`ScriptedProbe`]
#[derive(Debug, Clone)]
pub struct ScriptedProbeHandle {
    script: Arc<Mutex<Script>>,
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe that detects `code` on its first sample
    pub fn detecting(code: &str) -> Self {
        let probe = Self::new();
        probe.handle().push(vec![Detection::new(code, "QRCODE")]);
        probe
    }

    pub fn handle(&self) -> ScriptedProbeHandle {
        ScriptedProbeHandle {
            script: self.script.clone(),
        }
    }
}

impl ScriptedProbeHandle {
    pub fn push(&self, detections: Vec<Detection>) {
        lock(&self.script).responses.push_back(Ok(detections));
    }

    /// Queue `n` empty samples
    pub fn push_empty(&self, n: usize) {
        let mut script = lock(&self.script);
        for _ in 0..n {
            script.responses.push_back(Ok(Vec::new()));
        }
    }

    pub fn push_error(&self, reason: &str) {
        lock(&self.script).responses.push_back(Err(reason.to_string()));
    }

    /// Number of samples taken so far
    pub fn samples(&self) -> usize {
        lock(&self.script).samples
    }
}

#[async_trait]
impl VisionProbe for ScriptedProbe {
    async fn sample(&mut self) -> Result<Vec<Detection>, VisionError> {
        let mut script = lock(&self.script);
        script.samples += 1;
        match script.responses.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(reason)) => Err(VisionError::Unavailable(reason)),
            None => Ok(Vec::new()),
        }
    }
}
