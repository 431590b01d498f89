//! Shared harness for integration tests: a seeded in-memory store, a
//! simulated arm and a scripted probe wired into one orchestrator.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use slotkeeper::config::{LayoutConfig, RotationMode};
use slotkeeper::device::{DeviceGateway, SimulatedConnector, SimulatorHandle, SpeedProfile};
use slotkeeper::identification::{CompensatingManeuver, IdentificationLoop, IdentificationPolicy};
use slotkeeper::orchestrator::{MotionPlanner, TaskOrchestrator, Workcell};
use slotkeeper::store::{seed_layout, CoordinateStore, InMemoryCoordinateStore};
use slotkeeper::vision::{Detection, ScriptedProbe, ScriptedProbeHandle};
use slotkeeper::Dispatcher;

pub struct Harness {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub store: Arc<dyn CoordinateStore>,
    pub arm: SimulatorHandle,
    pub probe: ScriptedProbeHandle,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_max_attempts(3).await
    }

    pub async fn with_max_attempts(max_attempts: u32) -> Self {
        let store = InMemoryCoordinateStore::new();
        seed_layout(&store, &LayoutConfig::default())
            .await
            .expect("default layout seeds");
        let store: Arc<dyn CoordinateStore> = Arc::new(store);

        let (connector, arm) = SimulatedConnector::new();
        let gateway = DeviceGateway::new(Box::new(connector), Duration::from_secs(1), Duration::from_secs(1));
        let probe = ScriptedProbe::new();
        let probe_handle = probe.handle();

        let identification = IdentificationLoop::new(
            IdentificationPolicy {
                max_attempts,
                delay_between_attempts: Duration::from_millis(5),
                samples_per_attempt: 2,
                sample_interval: Duration::ZERO,
                attempt_timeout: None,
            },
            CompensatingManeuver::new(50.0, 90.0, RotationMode::Fixed, 150.0),
            50.0,
            0.0,
        );

        let orchestrator = TaskOrchestrator::new(
            store.clone(),
            Workcell::new(gateway, Box::new(probe)),
            MotionPlanner::new(Default::default()),
            identification,
            SpeedProfile::new(50.0, 50.0),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            store,
            arm,
            probe: probe_handle,
        }
    }

    pub async fn connected() -> Self {
        let harness = Self::new().await;
        harness.orchestrator.connect().await.expect("simulated arm connects");
        harness
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.orchestrator.clone())
    }

    /// Queue one sample carrying `code`
    pub fn detect(&self, code: &str) {
        self.probe.push(vec![Detection::new(code, "QRCODE")]);
    }
}
