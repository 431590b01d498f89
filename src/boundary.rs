//! Request boundary
//!
//! Transport-agnostic request and response model. The CLI uses it for one-shot
//! commands and for the JSON-lines `run` mode; any other transport only has
//! to produce [`Request`] values and print [`Response`] values.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::device::{ConnectOutcome, ConnectionState, Pose4, SpeedProfile};
use crate::orchestrator::{RetrieveRequest, StoreRequest, TaskError, TaskErrorKind, TaskOrchestrator};
use crate::store::SlotView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Store(StoreRequest),
    Retrieve(RetrieveRequest),
    Zones,
    AvailableZones,
    Status,
    Pose,
    Home,
    MoveTo {
        x: f64,
        y: f64,
        z: f64,
        #[serde(default)]
        r: f64,
        #[serde(default)]
        speed: Option<SpeedProfile>,
    },
    SetSpeed {
        velocity: f64,
        acceleration: f64,
    },
    Connect,
    Disconnect,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Store(_) => "store",
            Request::Retrieve(_) => "retrieve",
            Request::Zones => "zones",
            Request::AvailableZones => "available_zones",
            Request::Status => "status",
            Request::Pose => "pose",
            Request::Home => "home",
            Request::MoveTo { .. } => "move_to",
            Request::SetSpeed { .. } => "set_speed",
            Request::Connect => "connect",
            Request::Disconnect => "disconnect",
        }
    }
}

/// A request line in `run` mode; `id` is echoed back on the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TaskErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            id: None,
            status: ResponseStatus::Success,
            message: message.into(),
            error_kind: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    /// Error response for a request that could not be parsed
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            id: None,
            status: ResponseStatus::Error,
            message: message.into(),
            error_kind: Some(TaskErrorKind::Precondition),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl From<TaskError> for Response {
    fn from(err: TaskError) -> Self {
        let kind = err.kind();
        let status = match &err {
            TaskError::SlotNotFound(_) | TaskError::ItemNotIdentified { .. } => ResponseStatus::NotFound,
            _ => ResponseStatus::Error,
        };
        let data = match &err {
            TaskError::ItemNotIdentified { attempts, maneuvers } => {
                Some(json!({ "attempts": attempts, "maneuvers": maneuvers }))
            }
            TaskError::DeviceOperationFailed { step, .. } => Some(json!({ "step": step })),
            _ => None,
        };
        Self {
            id: None,
            status,
            message: err.to_string(),
            error_kind: Some(kind),
            data,
        }
    }
}

/// Routes requests to the orchestrator
#[derive(Clone)]
pub struct Dispatcher {
    orchestrator: Arc<TaskOrchestrator>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<TaskOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.orchestrator
    }

    pub async fn handle(&self, request: Request) -> Response {
        debug!(op = request.name(), "Dispatching request");
        match self.route(request).await {
            Ok(response) => response,
            Err(e) => e.into(),
        }
    }

    pub async fn handle_envelope(&self, envelope: RequestEnvelope) -> Response {
        let id = envelope.id;
        self.handle(envelope.request).await.with_id(id)
    }

    async fn route(&self, request: Request) -> Result<Response, TaskError> {
        let orchestrator = &self.orchestrator;
        let response = match request {
            Request::Store(store) => {
                let receipt = orchestrator.store(store).await?;
                Response::success(format!(
                    "Package stored in zone {} with type {} and additional info {}.",
                    receipt.slot, receipt.product_type, receipt.additional_info
                ))
                .with_data(to_value(&receipt))
            }
            Request::Retrieve(retrieve) => {
                let receipt = orchestrator.retrieve(retrieve).await?;
                Response::success(format!(
                    "Package picked up from {} and dropped at the drop zone.",
                    receipt.slot
                ))
                .with_data(to_value(&receipt))
            }
            Request::Zones => {
                let zones: Vec<SlotView> = orchestrator.zones().await?.iter().map(SlotView::from).collect();
                Response::success(format!("{} zones", zones.len())).with_data(json!({ "zones": zones }))
            }
            Request::AvailableZones => {
                let names = orchestrator.available_zones().await?;
                Response::success(format!("{} zones available", names.len()))
                    .with_data(json!({ "available_zones": names }))
            }
            Request::Status => match orchestrator.status().await {
                ConnectionState::Connected => Response::success("Arm is connected."),
                ConnectionState::Disconnected => return Err(TaskError::DeviceNotConnected),
            },
            Request::Pose => {
                let pose = orchestrator.pose().await?;
                Response::success("Current arm pose").with_data(json!({
                    "x": pose.position.x,
                    "y": pose.position.y,
                    "z": pose.position.z,
                    "r": pose.position.r,
                    "joint1": pose.joints.j1,
                    "joint2": pose.joints.j2,
                    "joint3": pose.joints.j3,
                    "joint4": pose.joints.j4,
                }))
            }
            Request::Home => {
                orchestrator.home().await?;
                Response::success("Home position set successfully.")
            }
            Request::MoveTo { x, y, z, r, speed } => {
                orchestrator.move_to(Pose4::new(x, y, z, r), speed).await?;
                Response::success(format!("Moved arm to position ({x}, {y}, {z}, {r})"))
            }
            Request::SetSpeed {
                velocity,
                acceleration,
            } => {
                orchestrator
                    .set_speed(SpeedProfile::new(velocity, acceleration))
                    .await?;
                Response::success(format!(
                    "Arm speed set to velocity: {velocity}, acceleration: {acceleration}"
                ))
            }
            Request::Connect => match orchestrator.connect().await? {
                ConnectOutcome::Connected => Response::success("Arm connected successfully."),
                ConnectOutcome::AlreadyConnected => Response::success("Arm is already connected."),
            },
            Request::Disconnect => {
                orchestrator.disconnect().await?;
                Response::success("Arm disconnected.")
            }
        };
        Ok(response)
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::orchestrator::MotionStep;

    #[test]
    fn test_parse_requests() {
        let request: Request =
            serde_json::from_str(r#"{"op":"store","slot":"A1","product_type":"electronics","additional_info":"fragile"}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::Store(StoreRequest::new("A1", "electronics", "fragile"))
        );

        let request: Request = serde_json::from_str(r#"{"op":"move_to","x":1,"y":2,"z":3}"#).unwrap();
        assert_eq!(
            request,
            Request::MoveTo {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                r: 0.0,
                speed: None
            }
        );

        let envelope: RequestEnvelope = serde_json::from_str(r#"{"id":7,"op":"available_zones"}"#).unwrap();
        assert_eq!(envelope.id, Some(json!(7)));
        assert_eq!(envelope.request, Request::AvailableZones);
    }

    #[test]
    fn test_error_mapping() {
        let response = Response::from(TaskError::ItemNotIdentified {
            attempts: 3,
            maneuvers: 2,
        });
        assert_eq!(response.status, ResponseStatus::NotFound);
        assert_eq!(response.message, "No code detected after 3 attempts");
        assert_eq!(response.data, Some(json!({"attempts": 3, "maneuvers": 2})));

        let response = Response::from(TaskError::SlotNotAvailable("A1".to_string()));
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_kind, Some(TaskErrorKind::Precondition));

        let response = Response::from(TaskError::DeviceOperationFailed {
            step: MotionStep::DescendIntoSlot,
            source: DeviceError::Link("serial reset".to_string()),
        });
        assert_eq!(response.error_kind, Some(TaskErrorKind::DeviceFault));
        assert_eq!(response.data, Some(json!({"step": "descend_into_slot"})));
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let json = serde_json::to_value(Response::success("ok")).unwrap();
        assert_eq!(json, json!({"status": "success", "message": "ok"}));
    }
}
