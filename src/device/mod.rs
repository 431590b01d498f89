// Device Gateway - exclusive access to the one physical arm
//
// The gateway owns the connection state explicitly. It never queues or
// retries; callers serialize access (the orchestrator keeps it behind a
// single async mutex) and decide what a failure means for their task.

pub mod bridge;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;

pub use bridge::{BridgeConnector, BridgeLink};
pub use simulated::{SimulatedArm, SimulatedConnector, SimulatorHandle};

/// Cartesian target plus end-effector rotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose4 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
}

impl Pose4 {
    pub fn new(x: f64, y: f64, z: f64, r: f64) -> Self {
        Self { x, y, z, r }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub j1: f64,
    pub j2: f64,
    pub j3: f64,
    pub j4: f64,
}

/// Position and joint angles as reported by the arm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmPose {
    pub position: Pose4,
    pub joints: JointAngles,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub velocity: f64,
    pub acceleration: f64,
}

impl SpeedProfile {
    pub fn new(velocity: f64, acceleration: f64) -> Self {
        Self {
            velocity,
            acceleration,
        }
    }
}

/// Commands understood by an arm link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ArmCommand {
    SetSpeed { velocity: f64, acceleration: f64 },
    MoveTo { x: f64, y: f64, z: f64, r: f64 },
    Suction { on: bool },
    Home,
    GetPose,
    Close,
}

impl ArmCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ArmCommand::SetSpeed { .. } => "set_speed",
            ArmCommand::MoveTo { .. } => "move_to",
            ArmCommand::Suction { .. } => "suction",
            ArmCommand::Home => "home",
            ArmCommand::GetPose => "get_pose",
            ArmCommand::Close => "close",
        }
    }
}

impl From<Pose4> for ArmCommand {
    fn from(p: Pose4) -> Self {
        ArmCommand::MoveTo {
            x: p.x,
            y: p.y,
            z: p.z,
            r: p.r,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Arm is not connected")]
    NotConnected,
    #[error("Failed to connect to arm: {0}")]
    ConnectionFailed(String),
    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },
    #[error("Command '{command}' rejected by arm: {reason}")]
    Rejected { command: String, reason: String },
    #[error("Arm link fault: {0}")]
    Link(String),
}

impl DeviceError {
    /// Whether the link can no longer be trusted to pair commands with
    /// acknowledgements (a reply may still be in flight, or half a command
    /// may be on the wire)
    pub fn breaks_link(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. } | DeviceError::Link(_))
    }
}

/// Wire-level link to the arm. Every call resolves once the arm acknowledged
/// the command.
#[async_trait]
pub trait ArmLink: Send {
    async fn set_speed(&mut self, speed: SpeedProfile) -> Result<(), DeviceError>;

    async fn move_to(&mut self, target: Pose4) -> Result<(), DeviceError>;

    async fn set_suction(&mut self, on: bool) -> Result<(), DeviceError>;

    async fn home(&mut self) -> Result<(), DeviceError>;

    async fn pose(&mut self) -> Result<ArmPose, DeviceError>;

    async fn close(&mut self) -> Result<(), DeviceError>;
}

/// Opens links to the arm
#[async_trait]
pub trait LinkConnector: Send + Sync {
    fn describe(&self) -> String;

    async fn open(&self) -> Result<Box<dyn ArmLink>, DeviceError>;
}

/// The single arm connection
pub enum DeviceConnection {
    Disconnected,
    Connected(Box<dyn ArmLink>),
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceConnection::Disconnected => f.write_str("Disconnected"),
            DeviceConnection::Connected(_) => f.write_str("Connected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
}

pub struct DeviceGateway {
    connector: Box<dyn LinkConnector>,
    connection: DeviceConnection,
    command_timeout: Duration,
    connect_timeout: Duration,
}

impl std::fmt::Debug for DeviceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGateway")
            .field("connector", &self.connector.describe())
            .field("connection", &self.connection)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl DeviceGateway {
    /// Create a disconnected gateway
    pub fn new(connector: Box<dyn LinkConnector>, command_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connection: DeviceConnection::Disconnected,
            command_timeout,
            connect_timeout,
        }
    }

    pub fn from_config(connector: Box<dyn LinkConnector>, device: &DeviceConfig) -> Self {
        Self::new(connector, device.command_timeout(), device.connect_timeout())
    }

    pub fn state(&self) -> ConnectionState {
        match self.connection {
            DeviceConnection::Disconnected => ConnectionState::Disconnected,
            DeviceConnection::Connected(_) => ConnectionState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connect to the arm. Calling this while connected has no side effects.
    pub async fn connect(&mut self) -> Result<ConnectOutcome, DeviceError> {
        if self.is_connected() {
            debug!("Arm already connected");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        info!(target_link = %self.connector.describe(), "Connecting to arm");
        let link = tokio::time::timeout(self.connect_timeout, self.connector.open())
            .await
            .map_err(|_| {
                DeviceError::ConnectionFailed(format!(
                    "no answer within {}ms",
                    self.connect_timeout.as_millis()
                ))
            })??;

        self.connection = DeviceConnection::Connected(link);
        info!("Arm connected");
        Ok(ConnectOutcome::Connected)
    }

    /// Close the link. The gateway ends up disconnected even if closing fails.
    pub async fn disconnect(&mut self) -> Result<(), DeviceError> {
        let previous = std::mem::replace(&mut self.connection, DeviceConnection::Disconnected);
        if let DeviceConnection::Connected(mut link) = previous {
            info!("Disconnecting arm");
            if let Err(e) = bounded(self.command_timeout, "close", link.close()).await {
                warn!("Arm link did not close cleanly: {}", e);
                return Err(e);
            }
            info!("Arm disconnected");
        }
        Ok(())
    }

    pub async fn set_speed(&mut self, speed: SpeedProfile) -> Result<(), DeviceError> {
        let timeout = self.command_timeout;
        let result = bounded(timeout, "set_speed", self.link()?.set_speed(speed)).await;
        self.settle(result)?;
        debug!(velocity = speed.velocity, acceleration = speed.acceleration, "Speed set");
        Ok(())
    }

    pub async fn move_to(&mut self, target: Pose4) -> Result<(), DeviceError> {
        let timeout = self.command_timeout;
        let result = bounded(timeout, "move_to", self.link()?.move_to(target)).await;
        self.settle(result)?;
        debug!(x = target.x, y = target.y, z = target.z, r = target.r, "Moved");
        Ok(())
    }

    pub async fn set_suction(&mut self, on: bool) -> Result<(), DeviceError> {
        let timeout = self.command_timeout;
        let result = bounded(timeout, "suction", self.link()?.set_suction(on)).await;
        self.settle(result)?;
        debug!(on, "Suction switched");
        Ok(())
    }

    pub async fn home_reset(&mut self) -> Result<(), DeviceError> {
        let timeout = self.command_timeout;
        let result = bounded(timeout, "home", self.link()?.home()).await;
        self.settle(result)?;
        info!("Arm homed");
        Ok(())
    }

    pub async fn current_pose(&mut self) -> Result<ArmPose, DeviceError> {
        let timeout = self.command_timeout;
        let result = bounded(timeout, "get_pose", self.link()?.pose()).await;
        self.settle(result)
    }

    /// Run a command against the arm
    pub async fn execute(&mut self, command: &ArmCommand) -> Result<(), DeviceError> {
        match command {
            ArmCommand::SetSpeed { velocity, acceleration } => {
                self.set_speed(SpeedProfile::new(*velocity, *acceleration)).await
            }
            ArmCommand::MoveTo { x, y, z, r } => self.move_to(Pose4::new(*x, *y, *z, *r)).await,
            ArmCommand::Suction { on } => self.set_suction(*on).await,
            ArmCommand::Home => self.home_reset().await,
            ArmCommand::GetPose => self.current_pose().await.map(|_| ()),
            ArmCommand::Close => self.disconnect().await,
        }
    }

    /// Drop the link after a fault that leaves it out of step with the arm.
    /// Later commands fail with `NotConnected` until the next `connect`.
    fn settle<T>(&mut self, result: Result<T, DeviceError>) -> Result<T, DeviceError> {
        if let Err(e) = &result {
            if e.breaks_link() && self.is_connected() {
                warn!(error = %e, "Dropping arm link after fault");
                self.connection = DeviceConnection::Disconnected;
            }
        }
        result
    }

    fn link(&mut self) -> Result<&mut dyn ArmLink, DeviceError> {
        match &mut self.connection {
            DeviceConnection::Connected(link) => Ok(link.as_mut()),
            DeviceConnection::Disconnected => Err(DeviceError::NotConnected),
        }
    }
}

async fn bounded<T>(
    timeout: Duration,
    command: &str,
    fut: impl Future<Output = Result<T, DeviceError>>,
) -> Result<T, DeviceError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DeviceError::Timeout {
            command: command.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
}
