// In-process arm used by `--simulate` runs and by tests.
//
// The link and its connector share one state cell with a `SimulatorHandle`,
// so the commands an arm received can be inspected after the link has been
// handed to a gateway.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{ArmCommand, ArmLink, ArmPose, DeviceError, JointAngles, LinkConnector, Pose4, SpeedProfile};

const HOME_POSE: Pose4 = Pose4 {
    x: 250.0,
    y: 0.0,
    z: 50.0,
    r: 0.0,
};

#[derive(Debug)]
struct SimulationState {
    commands: Vec<ArmCommand>,
    pose: Pose4,
    suction: bool,
    speed: Option<SpeedProfile>,
    moves: usize,
    connects: usize,
    fail_connect: bool,
    fail_on_move: Option<usize>,
    fail_suction: bool,
    stall: Option<Duration>,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            pose: HOME_POSE,
            suction: false,
            speed: None,
            moves: 0,
            connects: 0,
            fail_connect: false,
            fail_on_move: None,
            fail_suction: false,
            stall: None,
        }
    }
}

/// Inspection and fault-injection handle for a simulated arm
#[derive(Debug, Clone, Default)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimulationState>>,
}

impl SimulatorHandle {
    fn lock(&self) -> MutexGuard<'_, SimulationState> {
        // a panicking test thread must not hide the recorded commands
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every command received so far, in order
    pub fn commands(&self) -> Vec<ArmCommand> {
        self.lock().commands.clone()
    }

    /// Targets of every move received so far
    pub fn moves(&self) -> Vec<Pose4> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                ArmCommand::MoveTo { x, y, z, r } => Some(Pose4::new(*x, *y, *z, *r)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    pub fn pose(&self) -> Pose4 {
        self.lock().pose
    }

    pub fn suction(&self) -> bool {
        self.lock().suction
    }

    pub fn speed(&self) -> Option<SpeedProfile> {
        self.lock().speed
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Reject the `n`-th move (1-based) counted from now
    pub fn fail_on_move(&self, n: usize) {
        let mut state = self.lock();
        state.fail_on_move = Some(state.moves + n);
    }

    pub fn set_fail_suction(&self, fail: bool) {
        self.lock().fail_suction = fail;
    }

    /// Delay every acknowledgement by `stall`
    pub fn set_stall(&self, stall: Option<Duration>) {
        self.lock().stall = stall;
    }
}

/// Simulated arm link
#[derive(Debug)]
pub struct SimulatedArm {
    handle: SimulatorHandle,
}

impl SimulatedArm {
    async fn acknowledge(&self) {
        let stall = self.handle.lock().stall;
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
    }
}

fn joints_for(pose: &Pose4) -> JointAngles {
    JointAngles {
        j1: pose.y.atan2(pose.x).to_degrees(),
        j2: 0.0,
        j3: 0.0,
        j4: pose.r,
    }
}

#[async_trait]
impl ArmLink for SimulatedArm {
    async fn set_speed(&mut self, speed: SpeedProfile) -> Result<(), DeviceError> {
        self.acknowledge().await;
        let mut state = self.handle.lock();
        state.commands.push(ArmCommand::SetSpeed {
            velocity: speed.velocity,
            acceleration: speed.acceleration,
        });
        state.speed = Some(speed);
        Ok(())
    }

    async fn move_to(&mut self, target: Pose4) -> Result<(), DeviceError> {
        self.acknowledge().await;
        let mut state = self.handle.lock();
        state.moves += 1;
        if state.fail_on_move == Some(state.moves) {
            return Err(DeviceError::Rejected {
                command: "move_to".to_string(),
                reason: format!("simulated fault at move {}", state.moves),
            });
        }
        state.commands.push(target.into());
        state.pose = target;
        Ok(())
    }

    async fn set_suction(&mut self, on: bool) -> Result<(), DeviceError> {
        self.acknowledge().await;
        let mut state = self.handle.lock();
        if state.fail_suction {
            return Err(DeviceError::Link("simulated suction pump fault".to_string()));
        }
        state.commands.push(ArmCommand::Suction { on });
        state.suction = on;
        Ok(())
    }

    async fn home(&mut self) -> Result<(), DeviceError> {
        self.acknowledge().await;
        let mut state = self.handle.lock();
        state.commands.push(ArmCommand::Home);
        state.pose = HOME_POSE;
        Ok(())
    }

    async fn pose(&mut self) -> Result<ArmPose, DeviceError> {
        self.acknowledge().await;
        let pose = self.handle.lock().pose;
        Ok(ArmPose {
            position: pose,
            joints: joints_for(&pose),
        })
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        self.handle.lock().commands.push(ArmCommand::Close);
        Ok(())
    }
}

/// Opens simulated arm links that all share one state
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    handle: SimulatorHandle,
}

impl SimulatedConnector {
    pub fn new() -> (Self, SimulatorHandle) {
        let handle = SimulatorHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

#[async_trait]
impl LinkConnector for SimulatedConnector {
    fn describe(&self) -> String {
        "simulated".to_string()
    }

    async fn open(&self) -> Result<Box<dyn ArmLink>, DeviceError> {
        let mut state = self.handle.lock();
        if state.fail_connect {
            return Err(DeviceError::ConnectionFailed("simulated arm unavailable".to_string()));
        }
        state.connects += 1;
        Ok(Box::new(SimulatedArm {
            handle: self.handle.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_move_fault_is_counted_from_now() {
        let (connector, handle) = SimulatedConnector::new();
        let mut arm = connector.open().await.unwrap();

        arm.move_to(Pose4::new(1.0, 0.0, 0.0, 0.0)).await.unwrap();
        handle.fail_on_move(2);
        arm.move_to(Pose4::new(2.0, 0.0, 0.0, 0.0)).await.unwrap();
        assert!(matches!(
            arm.move_to(Pose4::new(3.0, 0.0, 0.0, 0.0)).await,
            Err(DeviceError::Rejected { .. })
        ));

        // the rejected move never reached the arm
        assert_eq!(handle.moves().len(), 2);
        assert_eq!(handle.pose().x, 2.0);
    }

    #[tokio::test]
    async fn test_pose_reports_joints() {
        let (connector, _handle) = SimulatedConnector::new();
        let mut arm = connector.open().await.unwrap();
        arm.move_to(Pose4::new(0.0, 100.0, 10.0, 45.0)).await.unwrap();

        let pose = arm.pose().await.unwrap();
        assert!((pose.joints.j1 - 90.0).abs() < 1e-9);
        assert_eq!(pose.joints.j4, 45.0);
    }
}
