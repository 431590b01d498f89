// Identification-Retry Loop
//
// Polls the vision probe for a code on the item at the pickup point. Between
// failed attempts the arm re-presents the item (compensating maneuver). The
// loop is bounded: exhausting the budget is a normal outcome, while a device
// fault during a maneuver ends the loop with an error.

pub mod maneuver;

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{IdentificationConfig, MotionConfig};
use crate::device::{DeviceError, DeviceGateway, Pose4};
use crate::observability::task_metrics;
use crate::store::Point3;
use crate::vision::{Detection, VisionError, VisionProbe};

pub use maneuver::CompensatingManeuver;

#[derive(Debug, Error)]
pub enum IdentificationError {
    #[error("At least one identification attempt is required")]
    NoAttempts,
    #[error("Vision probe failed during attempt {attempt}: {source}")]
    Probe {
        attempt: u32,
        #[source]
        source: VisionError,
    },
    #[error("Compensating maneuver after attempt {attempt} failed: {source}")]
    Maneuver {
        attempt: u32,
        #[source]
        source: DeviceError,
    },
    #[error("Safety lift after identification failed: {0}")]
    Lift(#[source] DeviceError),
}

/// Attempt budget and sampling bounds
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationPolicy {
    pub max_attempts: u32,
    pub delay_between_attempts: Duration,
    pub samples_per_attempt: u32,
    pub sample_interval: Duration,
    /// Bounds the sampling of one attempt, never the maneuver
    pub attempt_timeout: Option<Duration>,
}

impl IdentificationPolicy {
    pub fn from_config(identification: &IdentificationConfig) -> Self {
        Self {
            max_attempts: identification.max_attempts,
            delay_between_attempts: Duration::from_millis(identification.delay_between_attempts_ms),
            samples_per_attempt: identification.samples_per_attempt.max(1),
            sample_interval: Duration::from_millis(identification.sample_interval_ms),
            attempt_timeout: identification.attempt_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Result of one probe attempt. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationAttempt {
    pub number: u32,
    pub detections: Vec<Detection>,
}

impl IdentificationAttempt {
    pub fn succeeded(&self) -> bool {
        !self.detections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentificationOutcome {
    Identified {
        detections: Vec<Detection>,
        attempts: u32,
        maneuvers: u32,
    },
    /// Nothing was read within the attempt budget
    Exhausted { attempts: u32, maneuvers: u32 },
}

impl IdentificationOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            IdentificationOutcome::Identified { attempts, .. } | IdentificationOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn maneuvers(&self) -> u32 {
        match self {
            IdentificationOutcome::Identified { maneuvers, .. }
            | IdentificationOutcome::Exhausted { maneuvers, .. } => *maneuvers,
        }
    }

    /// The code used as product code: the first detection
    pub fn product_code(&self) -> Option<&str> {
        match self {
            IdentificationOutcome::Identified { detections, .. } => detections.first().map(|d| d.data.as_str()),
            IdentificationOutcome::Exhausted { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentificationLoop {
    policy: IdentificationPolicy,
    maneuver: CompensatingManeuver,
    lift_height: f64,
    travel_rotation: f64,
}

impl IdentificationLoop {
    pub fn new(
        policy: IdentificationPolicy,
        maneuver: CompensatingManeuver,
        lift_height: f64,
        travel_rotation: f64,
    ) -> Self {
        Self {
            policy,
            maneuver,
            lift_height,
            travel_rotation,
        }
    }

    pub fn from_config(identification: &IdentificationConfig, motion: &MotionConfig) -> Self {
        Self::new(
            IdentificationPolicy::from_config(identification),
            CompensatingManeuver::from_config(identification, motion),
            motion.identification_lift,
            motion.travel_rotation,
        )
    }

    pub fn policy(&self) -> &IdentificationPolicy {
        &self.policy
    }

    /// Same loop with a different attempt budget
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            policy: self.policy.clone().with_max_attempts(max_attempts),
            ..self.clone()
        }
    }

    /// Run the loop against the item at `pickup`.
    ///
    /// The caller must hold exclusive use of `gateway` for the whole call.
    pub async fn run(
        &self,
        gateway: &mut DeviceGateway,
        probe: &mut dyn VisionProbe,
        pickup: Point3,
    ) -> Result<IdentificationOutcome, IdentificationError> {
        let max_attempts = self.policy.max_attempts;
        if max_attempts == 0 {
            return Err(IdentificationError::NoAttempts);
        }

        let mut maneuvers = 0;
        for number in 1..=max_attempts {
            if number > 1 && !self.policy.delay_between_attempts.is_zero() {
                debug!(
                    delay_ms = self.policy.delay_between_attempts.as_millis() as u64,
                    "Waiting before next identification attempt"
                );
                tokio::time::sleep(self.policy.delay_between_attempts).await;
            }

            task_metrics().record_probe_attempt();
            let attempt = self.attempt(number, probe).await?;

            if attempt.succeeded() {
                info!(
                    attempt = number,
                    code = %attempt.detections[0].data,
                    detections = attempt.detections.len(),
                    "Item identified"
                );
                let lifted = pickup.raised(self.lift_height);
                gateway
                    .move_to(Pose4::new(lifted.x, lifted.y, lifted.z, self.travel_rotation))
                    .await
                    .map_err(IdentificationError::Lift)?;

                return Ok(IdentificationOutcome::Identified {
                    detections: attempt.detections,
                    attempts: number,
                    maneuvers,
                });
            }

            info!(attempt = number, max_attempts, "No code detected");
            if number < max_attempts {
                self.maneuver
                    .perform(gateway, pickup, maneuvers + 1)
                    .await
                    .map_err(|source| IdentificationError::Maneuver {
                        attempt: number,
                        source,
                    })?;
                maneuvers += 1;
                task_metrics().record_maneuver();
            }
        }

        warn!(attempts = max_attempts, maneuvers, "Identification attempts exhausted");
        Ok(IdentificationOutcome::Exhausted {
            attempts: max_attempts,
            maneuvers,
        })
    }

    async fn attempt(
        &self,
        number: u32,
        probe: &mut dyn VisionProbe,
    ) -> Result<IdentificationAttempt, IdentificationError> {
        let samples = self.policy.samples_per_attempt;
        let interval = self.policy.sample_interval;

        let sampling = async {
            for sample in 0..samples {
                let detections = probe
                    .sample()
                    .await
                    .map_err(|source| IdentificationError::Probe { attempt: number, source })?;
                if !detections.is_empty() {
                    return Ok(detections);
                }
                if !interval.is_zero() && sample + 1 < samples {
                    tokio::time::sleep(interval).await;
                }
            }
            Ok(Vec::new())
        };

        let detections = match self.policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, sampling).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        attempt = number,
                        timeout_ms = limit.as_millis() as u64,
                        "Probe attempt timed out"
                    );
                    Vec::new()
                }
            },
            None => sampling.await?,
        };

        Ok(IdentificationAttempt { number, detections })
    }
}
