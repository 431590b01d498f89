use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::motion::MotionStep;
use super::task_state::TaskPhase;
use crate::device::{DeviceError, SpeedProfile};
use crate::store::{StoreError, StoredItem};
use crate::vision::{Detection, VisionError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub slot: String,
    pub product_type: String,
    #[serde(default)]
    pub additional_info: String,
    #[serde(default)]
    pub speed: Option<SpeedProfile>,
    /// Overrides the configured identification budget
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl StoreRequest {
    pub fn new(slot: impl Into<String>, product_type: impl Into<String>, additional_info: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            product_type: product_type.into(),
            additional_info: additional_info.into(),
            speed: None,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub slot: String,
    #[serde(default)]
    pub speed: Option<SpeedProfile>,
}

impl RetrieveRequest {
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            speed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReceipt {
    pub slot: String,
    pub product_code: String,
    pub product_type: String,
    pub additional_info: String,
    pub stored_at: DateTime<Utc>,
    pub detections: Vec<Detection>,
    pub attempts: u32,
    pub maneuvers: u32,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrieveReceipt {
    pub slot: String,
    pub item: StoredItem,
    pub correlation_id: String,
}

/// How a task failure should be presented to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Business-state precondition; nothing was moved or mutated
    Precondition,
    /// Nothing could be read within the attempt budget
    NotIdentified,
    DeviceUnavailable,
    /// The arm stopped mid-task and may need manual recovery
    DeviceFault,
    Internal,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Zone '{0}' not found")]
    SlotNotFound(String),
    #[error("Zone '{0}' is not available")]
    SlotNotAvailable(String),
    #[error("Zone '{0}' is not occupied")]
    SlotNotOccupied(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("No code detected after {attempts} attempts")]
    ItemNotIdentified { attempts: u32, maneuvers: u32 },
    #[error("Arm is not connected")]
    DeviceNotConnected,
    #[error("Could not connect to arm: {0}")]
    Connection(#[source] DeviceError),
    #[error("Device operation failed at step '{step}': {source}")]
    DeviceOperationFailed {
        step: MotionStep,
        #[source]
        source: DeviceError,
    },
    #[error("Vision probe failed: {0}")]
    Probe(#[from] VisionError),
    #[error("Coordinate store error: {0}")]
    Store(#[source] StoreError),
    #[error("Task for zone '{slot}' cannot handle '{event}' while {phase}")]
    OutOfSequence {
        slot: String,
        phase: TaskPhase,
        event: &'static str,
    },
}

impl TaskError {
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::SlotNotFound(_)
            | TaskError::SlotNotAvailable(_)
            | TaskError::SlotNotOccupied(_)
            | TaskError::InvalidRequest(_) => TaskErrorKind::Precondition,
            TaskError::ItemNotIdentified { .. } => TaskErrorKind::NotIdentified,
            TaskError::DeviceNotConnected | TaskError::Connection(_) => TaskErrorKind::DeviceUnavailable,
            TaskError::DeviceOperationFailed { .. } => TaskErrorKind::DeviceFault,
            TaskError::Probe(_) | TaskError::Store(_) | TaskError::OutOfSequence { .. } => TaskErrorKind::Internal,
        }
    }

    /// Step at which a task stopped on the arm, if it did
    pub fn failed_step(&self) -> Option<MotionStep> {
        match self {
            TaskError::DeviceOperationFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub(crate) fn device(step: MotionStep, source: DeviceError) -> Self {
        match source {
            DeviceError::NotConnected => TaskError::DeviceNotConnected,
            source => TaskError::DeviceOperationFailed { step, source },
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotNotFound(name) => TaskError::SlotNotFound(name),
            StoreError::AlreadyOccupied(name) => TaskError::SlotNotAvailable(name),
            StoreError::AlreadyAvailable(name) => TaskError::SlotNotOccupied(name),
            other => TaskError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(TaskError::SlotNotAvailable("A1".into()).kind(), TaskErrorKind::Precondition);
        assert_eq!(
            TaskError::ItemNotIdentified {
                attempts: 3,
                maneuvers: 2
            }
            .kind(),
            TaskErrorKind::NotIdentified
        );
        assert_eq!(
            TaskError::device(MotionStep::GripOn, DeviceError::NotConnected).kind(),
            TaskErrorKind::DeviceUnavailable
        );

        let fault = TaskError::device(MotionStep::DescendIntoSlot, DeviceError::Link("serial reset".into()));
        assert_eq!(fault.kind(), TaskErrorKind::DeviceFault);
        assert_eq!(fault.failed_step(), Some(MotionStep::DescendIntoSlot));
        assert!(fault.to_string().contains("descend_into_slot"));
    }

    #[test]
    fn test_store_errors_map_to_business_errors() {
        assert!(matches!(
            TaskError::from(StoreError::AlreadyOccupied("A1".into())),
            TaskError::SlotNotAvailable(name) if name == "A1"
        ));
        assert!(matches!(
            TaskError::from(StoreError::Database("locked".into())),
            TaskError::Store(_)
        ));
    }

    #[test]
    fn test_store_request_defaults() {
        let request: StoreRequest =
            serde_json::from_str(r#"{"slot":"A1","product_type":"electronics"}"#).unwrap();
        assert_eq!(request, StoreRequest::new("A1", "electronics", ""));
    }
}
