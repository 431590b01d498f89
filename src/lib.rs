// Slotkeeper Library - zone storage orchestration for a single pick-and-place arm
// This exposes the core components for testing and integration

pub mod boundary;
pub mod cli;
pub mod config;
pub mod device;
pub mod identification;
pub mod observability;
pub mod orchestrator;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod vision;

// Re-export key types for easy access
pub use boundary::{Dispatcher, Request, RequestEnvelope, Response, ResponseStatus};
pub use config::{config, SlotkeeperConfig};
pub use device::{ConnectionState, DeviceError, DeviceGateway, Pose4, SpeedProfile};
pub use identification::{IdentificationLoop, IdentificationOutcome, IdentificationPolicy};
pub use observability::{task_metrics, OperationTimer, TaskMetrics};
pub use orchestrator::{
    RetrieveReceipt, RetrieveRequest, StoreReceipt, StoreRequest, TaskError, TaskErrorKind, TaskOrchestrator,
    Workcell,
};
pub use shutdown::ShutdownCoordinator;
pub use store::{CoordinateStore, InMemoryCoordinateStore, Slot, SlotStatus, StoreError};
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use vision::{Detection, VisionProbe};
