use tracing::debug;

use crate::config::{IdentificationConfig, MotionConfig, RotationMode};
use crate::device::{ArmCommand, DeviceError, DeviceGateway, Pose4};
use crate::store::Point3;

/// Lift the item at the pickup point, turn it, and set it back down so the
/// code faces the camera differently on the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensatingManeuver {
    grip_rotation: f64,
    rotation_offset: f64,
    mode: RotationMode,
    clearance: f64,
}

impl CompensatingManeuver {
    pub fn new(grip_rotation: f64, rotation_offset: f64, mode: RotationMode, clearance: f64) -> Self {
        Self {
            grip_rotation,
            rotation_offset,
            mode,
            clearance,
        }
    }

    pub fn from_config(identification: &IdentificationConfig, motion: &MotionConfig) -> Self {
        Self::new(
            identification.maneuver_rotation,
            identification.rotation_offset,
            identification.rotation_mode,
            motion.pickup_clearance,
        )
    }

    /// Rotation the item is set down at during the `nth` maneuver (1-based)
    pub fn release_rotation(&self, nth: u32) -> f64 {
        match self.mode {
            RotationMode::Fixed => self.grip_rotation - self.rotation_offset,
            RotationMode::Cumulative => self.grip_rotation - self.rotation_offset * f64::from(nth.max(1)),
        }
    }

    /// Commands of the `nth` maneuver, in execution order
    pub fn plan(&self, pickup: Point3, nth: u32) -> Vec<ArmCommand> {
        let above = pickup.raised(self.clearance);
        let grip = self.grip_rotation;
        let release = self.release_rotation(nth);

        vec![
            Pose4::new(above.x, above.y, above.z, grip).into(),
            Pose4::new(pickup.x, pickup.y, pickup.z, grip).into(),
            ArmCommand::Suction { on: true },
            Pose4::new(above.x, above.y, above.z, grip).into(),
            Pose4::new(above.x, above.y, above.z, release).into(),
            Pose4::new(pickup.x, pickup.y, pickup.z, release).into(),
            ArmCommand::Suction { on: false },
        ]
    }

    /// Execute the `nth` maneuver. The first failing command ends it.
    pub async fn perform(&self, gateway: &mut DeviceGateway, pickup: Point3, nth: u32) -> Result<(), DeviceError> {
        debug!(maneuver = nth, release_rotation = self.release_rotation(nth), "Re-presenting item");
        for command in self.plan(pickup, nth) {
            gateway.execute(&command).await?;
        }
        Ok(())
    }
}
