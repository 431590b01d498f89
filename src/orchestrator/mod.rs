// Task Orchestrator
//
// Store and Retrieve run one at a time: each task holds the workcell (arm +
// probe) from slot validation until the slot state is committed, so a slot
// cannot be booked twice and no two tasks interleave arm commands. Slot state
// is only committed after the last physical step succeeded.

pub mod motion;
pub mod task_state;
pub mod types;

use chrono::Utc;
use statig::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn, Instrument};

use crate::config::SlotkeeperConfig;
use crate::device::{ArmPose, ConnectOutcome, ConnectionState, DeviceGateway, Pose4, SpeedProfile};
use crate::identification::{IdentificationError, IdentificationLoop, IdentificationOutcome};
use crate::observability::{task_metrics, OperationTimer};
use crate::store::{CoordinateStore, Slot, StoredItem, DROP_POINT, PICKUP_POINT, SAFE_POINT};
use crate::telemetry::{create_task_span, generate_correlation_id};
use crate::vision::VisionProbe;

pub use motion::{MotionPlanner, MotionStep, PlannedStep, Waypoints};
pub use task_state::{advance, TaskEvent, TaskKind, TaskPhase, TaskStateMachine};
pub use types::{RetrieveReceipt, RetrieveRequest, StoreReceipt, StoreRequest, TaskError, TaskErrorKind};

/// Everything that must be used exclusively by one task at a time
pub struct Workcell {
    pub gateway: DeviceGateway,
    pub probe: Box<dyn VisionProbe>,
}

impl Workcell {
    pub fn new(gateway: DeviceGateway, probe: Box<dyn VisionProbe>) -> Self {
        Self { gateway, probe }
    }
}

type Task = StateMachine<TaskStateMachine>;

pub struct TaskOrchestrator {
    store: Arc<dyn CoordinateStore>,
    workcell: Mutex<Workcell>,
    planner: MotionPlanner,
    identification: IdentificationLoop,
    default_speed: SpeedProfile,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn CoordinateStore>,
        workcell: Workcell,
        planner: MotionPlanner,
        identification: IdentificationLoop,
        default_speed: SpeedProfile,
    ) -> Self {
        Self {
            store,
            workcell: Mutex::new(workcell),
            planner,
            identification,
            default_speed,
        }
    }

    pub fn from_config(store: Arc<dyn CoordinateStore>, workcell: Workcell, config: &SlotkeeperConfig) -> Self {
        Self::new(
            store,
            workcell,
            MotionPlanner::new(config.motion.clone()),
            IdentificationLoop::from_config(&config.identification, &config.motion),
            SpeedProfile::new(config.device.velocity, config.device.acceleration),
        )
    }

    pub fn coordinate_store(&self) -> &Arc<dyn CoordinateStore> {
        &self.store
    }

    /// Identify the item at the pickup point and place it into the requested slot
    pub async fn store(&self, request: StoreRequest) -> Result<StoreReceipt, TaskError> {
        let correlation_id = generate_correlation_id();
        let span = create_task_span("store", Some(&request.slot), &correlation_id);
        task_metrics().record_task_started();

        let result = self.run_store(request, correlation_id).instrument(span.clone()).await;
        span.in_scope(|| record_outcome(&result));
        result
    }

    /// Move the item in the requested slot to the drop point
    pub async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveReceipt, TaskError> {
        let correlation_id = generate_correlation_id();
        let span = create_task_span("retrieve", Some(&request.slot), &correlation_id);
        task_metrics().record_task_started();

        let result = self.run_retrieve(request, correlation_id).instrument(span.clone()).await;
        span.in_scope(|| record_outcome(&result));
        result
    }

    async fn run_store(&self, request: StoreRequest, correlation_id: String) -> Result<StoreReceipt, TaskError> {
        let timer = OperationTimer::new("store");
        let identification = match request.max_attempts {
            Some(0) => {
                return Err(TaskError::InvalidRequest(
                    "max_attempts must be at least 1".to_string(),
                ))
            }
            Some(max_attempts) => self.identification.with_max_attempts(max_attempts),
            None => self.identification.clone(),
        };
        let speed = request.speed.unwrap_or(self.default_speed);

        info!(product_type = %request.product_type, "Store requested");
        let mut cell = self.workcell.lock().await;
        let Workcell { gateway, probe } = &mut *cell;
        let mut task = TaskStateMachine::new(TaskKind::Store, &request.slot).state_machine();

        let slot = self.store.get_slot(&request.slot).await?;
        if !slot.is_available() {
            return Err(TaskError::SlotNotAvailable(slot.name));
        }
        let points = self.waypoints().await?;
        if !gateway.is_connected() {
            return Err(TaskError::DeviceNotConnected);
        }
        advance(&mut task, &TaskEvent::Reserve, TaskPhase::Reserved)?;

        execute(&mut task, gateway, &MotionPlanner::speed_step(speed)).await?;

        advance(&mut task, &TaskEvent::StartIdentification, TaskPhase::Identifying)?;
        let outcome = identification
            .run(gateway, probe.as_mut(), points.pickup)
            .await
            .map_err(|e| {
                let err = match e {
                    IdentificationError::NoAttempts => {
                        TaskError::InvalidRequest("max_attempts must be at least 1".to_string())
                    }
                    IdentificationError::Probe { source, .. } => TaskError::Probe(source),
                    IdentificationError::Maneuver { source, .. } => {
                        TaskError::device(MotionStep::CompensatingManeuver, source)
                    }
                    IdentificationError::Lift(source) => TaskError::device(MotionStep::IdentificationLift, source),
                };
                task.handle(&TaskEvent::Fail {
                    step: err.failed_step(),
                });
                err
            })?;

        let (detections, attempts, maneuvers) = match outcome {
            IdentificationOutcome::Identified {
                detections,
                attempts,
                maneuvers,
            } => (detections, attempts, maneuvers),
            IdentificationOutcome::Exhausted { attempts, maneuvers } => {
                task.handle(&TaskEvent::NotIdentified);
                return Err(TaskError::ItemNotIdentified { attempts, maneuvers });
            }
        };
        let product_code = detections
            .first()
            .map(|d| d.data.clone())
            .ok_or(TaskError::ItemNotIdentified { attempts, maneuvers })?;
        advance(
            &mut task,
            &TaskEvent::Identified { product_code },
            TaskPhase::Identified,
        )?;

        advance(&mut task, &TaskEvent::StartMotion, TaskPhase::Moving)?;
        for planned in self.planner.store_plan(&points, slot.position) {
            execute(&mut task, gateway, &planned).await?;
        }
        advance(&mut task, &TaskEvent::MotionComplete, TaskPhase::Committing)?;

        // the machine holds the code it was identified with
        let product_code = task.inner().product_code().unwrap_or_default().to_string();
        let item = StoredItem {
            product_code,
            product_type: request.product_type,
            additional_info: request.additional_info,
            stored_at: Utc::now(),
        };
        if let Err(e) = self.store.mark_occupied(&slot.name, &item).await {
            task.handle(&TaskEvent::Fail { step: None });
            error!(error = %e, "Item placed but zone state could not be committed");
            return Err(e.into());
        }
        advance(&mut task, &TaskEvent::Committed, TaskPhase::Completed)?;

        let elapsed = timer.finish();
        info!(
            product_code = %item.product_code,
            attempts,
            maneuvers,
            elapsed_ms = elapsed.as_millis() as u64,
            "Item stored"
        );

        Ok(StoreReceipt {
            slot: slot.name,
            product_code: item.product_code,
            product_type: item.product_type,
            additional_info: item.additional_info,
            stored_at: item.stored_at,
            detections,
            attempts,
            maneuvers,
            correlation_id,
        })
    }

    async fn run_retrieve(
        &self,
        request: RetrieveRequest,
        correlation_id: String,
    ) -> Result<RetrieveReceipt, TaskError> {
        let timer = OperationTimer::new("retrieve");
        let speed = request.speed.unwrap_or(self.default_speed);

        info!("Retrieve requested");
        let mut cell = self.workcell.lock().await;
        let gateway = &mut cell.gateway;
        let mut task = TaskStateMachine::new(TaskKind::Retrieve, &request.slot).state_machine();

        let slot = self.store.get_slot(&request.slot).await?;
        if slot.is_available() {
            return Err(TaskError::SlotNotOccupied(slot.name));
        }
        let points = self.waypoints().await?;
        if !gateway.is_connected() {
            return Err(TaskError::DeviceNotConnected);
        }
        advance(&mut task, &TaskEvent::Reserve, TaskPhase::Reserved)?;

        execute(&mut task, gateway, &MotionPlanner::speed_step(speed)).await?;

        advance(&mut task, &TaskEvent::StartMotion, TaskPhase::Moving)?;
        for planned in self.planner.retrieve_plan(&points, slot.position) {
            execute(&mut task, gateway, &planned).await?;
        }
        advance(&mut task, &TaskEvent::MotionComplete, TaskPhase::Committing)?;

        let item = match self.store.mark_available(&slot.name).await {
            Ok(item) => item,
            Err(e) => {
                task.handle(&TaskEvent::Fail { step: None });
                error!(error = %e, "Item delivered but zone state could not be committed");
                return Err(e.into());
            }
        };
        advance(&mut task, &TaskEvent::Committed, TaskPhase::Completed)?;

        let elapsed = timer.finish();
        info!(
            product_code = %item.product_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "Item retrieved"
        );

        Ok(RetrieveReceipt {
            slot: slot.name,
            item,
            correlation_id,
        })
    }

    async fn waypoints(&self) -> Result<Waypoints, TaskError> {
        Ok(Waypoints {
            pickup: self.store.get_reference_point(PICKUP_POINT).await?.position,
            drop: self.store.get_reference_point(DROP_POINT).await?.position,
            safe: self.store.get_reference_point(SAFE_POINT).await?.position,
        })
    }

    /// All slots with their payload, ordered by name
    pub async fn zones(&self) -> Result<Vec<Slot>, TaskError> {
        Ok(self.store.list_slots().await?)
    }

    pub async fn available_zones(&self) -> Result<Vec<String>, TaskError> {
        Ok(self.store.list_available_slot_names().await?)
    }

    pub async fn connect(&self) -> Result<ConnectOutcome, TaskError> {
        let mut cell = self.workcell.lock().await;
        cell.gateway.connect().await.map_err(TaskError::Connection)
    }

    pub async fn disconnect(&self) -> Result<(), TaskError> {
        let mut cell = self.workcell.lock().await;
        cell.gateway
            .disconnect()
            .await
            .map_err(|e| TaskError::device(MotionStep::Disconnect, e))
    }

    /// Connection state. Waits for a running task to finish.
    pub async fn status(&self) -> ConnectionState {
        self.workcell.lock().await.gateway.state()
    }

    pub async fn pose(&self) -> Result<ArmPose, TaskError> {
        let mut cell = self.workcell.lock().await;
        cell.gateway
            .current_pose()
            .await
            .map_err(|e| TaskError::device(MotionStep::ReadPose, e))
    }

    pub async fn home(&self) -> Result<(), TaskError> {
        let mut cell = self.workcell.lock().await;
        cell.gateway
            .home_reset()
            .await
            .map_err(|e| TaskError::device(MotionStep::Home, e))
    }

    pub async fn set_speed(&self, speed: SpeedProfile) -> Result<(), TaskError> {
        let mut cell = self.workcell.lock().await;
        cell.gateway
            .set_speed(speed)
            .await
            .map_err(|e| TaskError::device(MotionStep::SetSpeed, e))
    }

    /// Move straight to `target`, applying `speed` (or the default) first
    pub async fn move_to(&self, target: Pose4, speed: Option<SpeedProfile>) -> Result<(), TaskError> {
        let mut cell = self.workcell.lock().await;
        cell.gateway
            .set_speed(speed.unwrap_or(self.default_speed))
            .await
            .map_err(|e| TaskError::device(MotionStep::SetSpeed, e))?;
        cell.gateway
            .move_to(target)
            .await
            .map_err(|e| TaskError::device(MotionStep::DirectMove, e))
    }

    /// Release the arm. Waits for a running task to finish first.
    pub async fn shutdown(&self) {
        if let Err(e) = self.disconnect().await {
            warn!(error = %e, "Arm did not disconnect cleanly");
        }
    }
}

async fn execute(task: &mut Task, gateway: &mut DeviceGateway, planned: &PlannedStep) -> Result<(), TaskError> {
    gateway.execute(&planned.command).await.map_err(|source| {
        error!(step = %planned.step, error = %source, "Device step failed");
        task.handle(&TaskEvent::Fail {
            step: Some(planned.step),
        });
        TaskError::device(planned.step, source)
    })
}

fn record_outcome<T>(result: &Result<T, TaskError>) {
    let metrics = task_metrics();
    match result {
        Ok(_) => metrics.record_task_succeeded(),
        Err(e) => {
            match e.kind() {
                TaskErrorKind::NotIdentified => metrics.record_not_identified(),
                TaskErrorKind::DeviceFault => {
                    metrics.record_device_fault();
                    metrics.record_task_failed();
                }
                _ => metrics.record_task_failed(),
            }
            warn!(error = %e, kind = ?e.kind(), step = ?e.failed_step(), "Task did not complete");
        }
    }
}
