// Fixed waypoint recipes for store and retrieve.
//
// Every approach to a pickup point, drop point or slot goes through the point
// directly above it, and every departure climbs back to that height before
// any horizontal travel.

use serde::{Deserialize, Serialize};

use crate::config::MotionConfig;
use crate::device::{ArmCommand, Pose4, SpeedProfile};
use crate::store::Point3;

/// Named step of a task, reported when a task stops on a device fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStep {
    SetSpeed,
    CompensatingManeuver,
    IdentificationLift,
    MoveToSafe,
    AbovePickup,
    DescendToPickup,
    GripOn,
    LiftFromPickup,
    AboveSlot,
    DescendIntoSlot,
    Release,
    LiftFromSlot,
    AboveDrop,
    DescendToDrop,
    LiftFromDrop,
    ReturnToSafe,
    Home,
    ReadPose,
    DirectMove,
    Disconnect,
}

impl MotionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionStep::SetSpeed => "set_speed",
            MotionStep::CompensatingManeuver => "compensating_maneuver",
            MotionStep::IdentificationLift => "identification_lift",
            MotionStep::MoveToSafe => "move_to_safe",
            MotionStep::AbovePickup => "above_pickup",
            MotionStep::DescendToPickup => "descend_to_pickup",
            MotionStep::GripOn => "grip_on",
            MotionStep::LiftFromPickup => "lift_from_pickup",
            MotionStep::AboveSlot => "above_slot",
            MotionStep::DescendIntoSlot => "descend_into_slot",
            MotionStep::Release => "release",
            MotionStep::LiftFromSlot => "lift_from_slot",
            MotionStep::AboveDrop => "above_drop",
            MotionStep::DescendToDrop => "descend_to_drop",
            MotionStep::LiftFromDrop => "lift_from_drop",
            MotionStep::ReturnToSafe => "return_to_safe",
            MotionStep::Home => "home",
            MotionStep::ReadPose => "read_pose",
            MotionStep::DirectMove => "direct_move",
            MotionStep::Disconnect => "disconnect",
        }
    }
}

impl std::fmt::Display for MotionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub step: MotionStep,
    pub command: ArmCommand,
}

impl PlannedStep {
    fn new(step: MotionStep, command: impl Into<ArmCommand>) -> Self {
        Self {
            step,
            command: command.into(),
        }
    }
}

/// Reference points a task travels between
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoints {
    pub pickup: Point3,
    pub drop: Point3,
    pub safe: Point3,
}

#[derive(Debug, Clone)]
pub struct MotionPlanner {
    motion: MotionConfig,
}

impl MotionPlanner {
    pub fn new(motion: MotionConfig) -> Self {
        Self { motion }
    }

    fn at(&self, point: Point3) -> Pose4 {
        Pose4::new(point.x, point.y, point.z, self.motion.travel_rotation)
    }

    pub fn speed_step(speed: SpeedProfile) -> PlannedStep {
        PlannedStep::new(
            MotionStep::SetSpeed,
            ArmCommand::SetSpeed {
                velocity: speed.velocity,
                acceleration: speed.acceleration,
            },
        )
    }

    /// Carry the identified item from the pickup point into `slot`
    pub fn store_plan(&self, points: &Waypoints, slot: Point3) -> Vec<PlannedStep> {
        let above_pickup = points.pickup.raised(self.motion.pickup_clearance);
        let above_slot = slot.raised(self.motion.slot_clearance);

        vec![
            PlannedStep::new(MotionStep::MoveToSafe, self.at(points.safe)),
            PlannedStep::new(MotionStep::AbovePickup, self.at(above_pickup)),
            PlannedStep::new(MotionStep::DescendToPickup, self.at(points.pickup)),
            PlannedStep::new(MotionStep::GripOn, ArmCommand::Suction { on: true }),
            PlannedStep::new(MotionStep::LiftFromPickup, self.at(above_pickup)),
            PlannedStep::new(MotionStep::AboveSlot, self.at(above_slot)),
            PlannedStep::new(MotionStep::DescendIntoSlot, self.at(slot)),
            PlannedStep::new(MotionStep::Release, ArmCommand::Suction { on: false }),
            PlannedStep::new(MotionStep::LiftFromSlot, self.at(above_slot)),
            PlannedStep::new(MotionStep::ReturnToSafe, self.at(points.safe)),
        ]
    }

    /// Carry the item in `slot` to the drop point
    pub fn retrieve_plan(&self, points: &Waypoints, slot: Point3) -> Vec<PlannedStep> {
        let above_slot = slot.raised(self.motion.slot_clearance);
        let above_drop = points.drop.raised(self.motion.drop_clearance);

        vec![
            PlannedStep::new(MotionStep::MoveToSafe, self.at(points.safe)),
            PlannedStep::new(MotionStep::AboveSlot, self.at(above_slot)),
            PlannedStep::new(MotionStep::DescendIntoSlot, self.at(slot)),
            PlannedStep::new(MotionStep::GripOn, ArmCommand::Suction { on: true }),
            PlannedStep::new(MotionStep::LiftFromSlot, self.at(above_slot)),
            PlannedStep::new(MotionStep::AboveDrop, self.at(above_drop)),
            PlannedStep::new(MotionStep::DescendToDrop, self.at(points.drop)),
            PlannedStep::new(MotionStep::Release, ArmCommand::Suction { on: false }),
            PlannedStep::new(MotionStep::LiftFromDrop, self.at(above_drop)),
            PlannedStep::new(MotionStep::ReturnToSafe, self.at(points.safe)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Waypoints {
        Waypoints {
            pickup: Point3::new(0.0, -300.0, -80.0),
            drop: Point3::new(0.0, 220.0, -70.0),
            safe: Point3::new(250.0, 0.0, 125.0),
        }
    }

    fn steps(plan: &[PlannedStep]) -> Vec<MotionStep> {
        plan.iter().map(|p| p.step).collect()
    }

    #[test]
    fn test_store_plan_order_and_clearances() {
        let planner = MotionPlanner::new(MotionConfig::default());
        let plan = planner.store_plan(&points(), Point3::new(286.0, 108.0, -72.0));

        assert_eq!(
            steps(&plan),
            vec![
                MotionStep::MoveToSafe,
                MotionStep::AbovePickup,
                MotionStep::DescendToPickup,
                MotionStep::GripOn,
                MotionStep::LiftFromPickup,
                MotionStep::AboveSlot,
                MotionStep::DescendIntoSlot,
                MotionStep::Release,
                MotionStep::LiftFromSlot,
                MotionStep::ReturnToSafe,
            ]
        );
        assert_eq!(plan[1].command, ArmCommand::MoveTo { x: 0.0, y: -300.0, z: 70.0, r: 0.0 });
        assert_eq!(plan[5].command, ArmCommand::MoveTo { x: 286.0, y: 108.0, z: 38.0, r: 0.0 });
    }

    #[test]
    fn test_retrieve_plan_ends_at_safe_point() {
        let planner = MotionPlanner::new(MotionConfig::default());
        let plan = planner.retrieve_plan(&points(), Point3::new(190.0, -115.0, -72.0));

        assert_eq!(plan[2].step, MotionStep::DescendIntoSlot);
        assert_eq!(plan[5].command, ArmCommand::MoveTo { x: 0.0, y: 220.0, z: 40.0, r: 0.0 });
        assert_eq!(plan.last().map(|p| p.step), Some(MotionStep::ReturnToSafe));
    }

    #[test]
    fn test_descents_are_vertical() {
        let planner = MotionPlanner::new(MotionConfig::default());
        let p = points();
        let slot = Point3::new(190.0, 103.0, -72.0);
        let bases = [p.pickup, p.drop, slot];

        for plan in [planner.store_plan(&p, slot), planner.retrieve_plan(&p, slot)] {
            let moves: Vec<Pose4> = plan
                .iter()
                .filter_map(|s| match s.command {
                    ArmCommand::MoveTo { x, y, z, r } => Some(Pose4::new(x, y, z, r)),
                    _ => None,
                })
                .collect();

            for (i, pose) in moves.iter().enumerate() {
                let at_base = bases
                    .iter()
                    .any(|b| b.x == pose.x && b.y == pose.y && b.z == pose.z);
                if at_base {
                    // reached from straight above and left straight upwards
                    let before = moves[i - 1];
                    let after = moves[i + 1];
                    assert_eq!((before.x, before.y), (pose.x, pose.y));
                    assert_eq!((after.x, after.y), (pose.x, pose.y));
                    assert!(before.z > pose.z && after.z > pose.z);
                }
            }
        }
    }
}
