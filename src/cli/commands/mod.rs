use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::boundary::{Dispatcher, Response, ResponseStatus};
use crate::cli::{GlobalOptions, SpeedArgs};
use crate::config::{DeviceBackend, SlotkeeperConfig};
use crate::device::{BridgeConnector, DeviceGateway, LinkConnector, SimulatedConnector, SpeedProfile};
use crate::orchestrator::{TaskErrorKind, TaskOrchestrator, Workcell};
use crate::shutdown::ShutdownCoordinator;
use crate::store::{seed_layout, CoordinateStore, InMemoryCoordinateStore};
use crate::vision::probe_from_config;

#[cfg(feature = "database")]
use crate::store::SqliteCoordinateStore;

pub mod config;
pub mod device;
pub mod run;
pub mod tasks;
pub mod zones;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, context: &AppContext) -> Result<()>;
}

/// Wired-up store, arm and probe for one process
pub struct AppContext {
    pub config: SlotkeeperConfig,
    pub dispatcher: Dispatcher,
    #[cfg(feature = "database")]
    sqlite: Option<Arc<SqliteCoordinateStore>>,
}

impl AppContext {
    /// Open the zone store, seed the layout and build the orchestrator.
    ///
    /// With `connect_device` the arm is connected right away. A failed
    /// connect is not fatal: the process runs without the arm and every
    /// device operation fails until a later connect succeeds.
    pub async fn start(config: SlotkeeperConfig, options: &GlobalOptions, connect_device: bool) -> Result<Self> {
        #[cfg(feature = "database")]
        let (store, sqlite): (Arc<dyn CoordinateStore>, Option<Arc<SqliteCoordinateStore>>) = if options.ephemeral {
            (Arc::new(InMemoryCoordinateStore::new()), None)
        } else {
            let sqlite = Arc::new(SqliteCoordinateStore::connect(&config.database).await?);
            (sqlite.clone(), Some(sqlite))
        };

        #[cfg(not(feature = "database"))]
        let store: Arc<dyn CoordinateStore> = {
            if !options.ephemeral {
                warn!("Built without database support; zone state is kept in memory");
            }
            Arc::new(InMemoryCoordinateStore::new())
        };

        seed_layout(store.as_ref(), &config.layout).await?;

        let connector = connector(&config, options.simulate);
        info!(device = %connector.describe(), "Using arm link");
        let gateway = DeviceGateway::from_config(connector, &config.device);
        let probe = probe_from_config(&config.vision);
        let orchestrator = Arc::new(TaskOrchestrator::from_config(
            store,
            Workcell::new(gateway, probe),
            &config,
        ));

        if connect_device {
            if let Err(e) = orchestrator.connect().await {
                warn!(error = %e, "Arm unavailable, running in degraded mode");
            }
        }

        Ok(Self {
            config,
            dispatcher: Dispatcher::new(orchestrator),
            #[cfg(feature = "database")]
            sqlite,
        })
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        self.dispatcher.orchestrator()
    }

    /// Speed for one operation: flags override the configured defaults
    pub fn speed(&self, args: &SpeedArgs) -> Option<SpeedProfile> {
        if args.velocity.is_none() && args.acceleration.is_none() {
            return None;
        }
        Some(SpeedProfile::new(
            args.velocity.unwrap_or(self.config.device.velocity),
            args.acceleration.unwrap_or(self.config.device.acceleration),
        ))
    }

    pub async fn shutdown(self) -> Result<()> {
        ShutdownCoordinator::default()
            .with_metrics(self.config.observability.metrics_enabled)
            .shutdown_all_services(self.orchestrator())
            .await?;

        #[cfg(feature = "database")]
        if let Some(sqlite) = &self.sqlite {
            sqlite.shutdown().await;
        }
        Ok(())
    }
}

fn connector(config: &SlotkeeperConfig, simulate: bool) -> Box<dyn LinkConnector> {
    match (simulate, config.device.backend) {
        (true, _) | (false, DeviceBackend::Simulated) => {
            let (connector, _handle) = SimulatedConnector::new();
            Box::new(connector)
        }
        (false, DeviceBackend::Bridge) => Box::new(BridgeConnector::new(&config.device.bridge_addr)),
    }
}

/// Print a response for a human; fails when the request did not succeed
pub fn report(response: &Response) -> Result<()> {
    match response.status {
        ResponseStatus::Success => println!("✅ {}", response.message),
        ResponseStatus::NotFound => println!("🔍 {}", response.message),
        ResponseStatus::Error => println!("❌ {}", response.message),
    }

    match response.error_kind {
        Some(TaskErrorKind::DeviceUnavailable) => {
            println!("   💡 Check the arm link, then retry. 'slotkeeper status' shows the connection.");
        }
        Some(TaskErrorKind::DeviceFault) => {
            println!("   ⚠️  The arm stopped mid-operation. Check the workcell before retrying.");
        }
        Some(TaskErrorKind::NotIdentified) => {
            println!("   💡 Make sure the package code faces the camera, then retry.");
        }
        _ => {}
    }

    if response.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{}", response.message)
    }
}

pub async fn show_how_to_get_started() -> Result<()> {
    println!("🤖 Slotkeeper - zone storage for a pick-and-place arm");
    println!();
    println!("Storage:");
    println!("  📦 slotkeeper store A1 --type electronics   # Identify and store the package at pickup");
    println!("  📤 slotkeeper retrieve A1                   # Bring a package to the drop point");
    println!("  🗺️  slotkeeper zones                         # Show every zone and its contents");
    println!("  🟢 slotkeeper available                     # List free zones");
    println!();
    println!("Arm:");
    println!("  🔌 slotkeeper status | pose | home | move-to X Y Z | set-speed V A");
    println!();
    println!("Service:");
    println!("  🔁 slotkeeper run      # JSON-lines requests on stdin");
    println!("  ⚙️  slotkeeper config   # Print the effective configuration");
    println!();
    println!("💡 Add --simulate to try everything without an arm.");
    Ok(())
}
