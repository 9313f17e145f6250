//! Narrow robot/engine capability trait.
//!
//! The controller and the primitives only ever talk to the robot through
//! [`RobotInterface`]. A physics engine binding and the bundled
//! [`KinematicSim`](crate::sim::KinematicSim) are interchangeable behind it.

use std::ops::Range;

use crate::error::RobotError;
use crate::geometry::Pose;
use crate::scene::SceneLayout;
use crate::world::{Block, EntityId, EntitySnapshot, RobotObservation};

/// A joint-space configuration, one value per degree of freedom.
pub type Configuration = Vec<f64>;

/// Capabilities the pipeline needs from a robot and its engine.
///
/// Methods that only sample state take `&self`; commands take `&mut self`, so
/// the controller's exclusive ownership is enforced by the borrow checker.
pub trait RobotInterface: Send {
    /// Current pose of a scene entity.
    fn entity_pose(&self, id: &EntityId) -> Result<Pose, RobotError>;

    /// Current pose of the hand link.
    fn end_effector_pose(&self) -> Pose;

    /// One aperture per finger.
    fn gripper_apertures(&self) -> Vec<f64>;

    /// Full joint configuration, fingers included.
    fn configuration(&self) -> Configuration;

    /// Degrees of freedom that move the arm.
    fn arm_dofs(&self) -> Range<usize>;

    /// Degrees of freedom that move the fingers.
    fn finger_dofs(&self) -> Range<usize>;

    /// Joint configuration placing the hand at `target`, seeded from `seed`.
    fn inverse_kinematics(&self, target: &Pose, seed: &[f64]) -> Result<Configuration, RobotError>;

    /// Waypoints from the current configuration to `goal`, ending at `goal`.
    fn plan_path(&self, goal: &[f64], waypoints: usize) -> Result<Vec<Configuration>, RobotError>;

    /// Position targets for the listed dofs. `targets` and `dofs` are zipped.
    fn control_position(&mut self, targets: &[f64], dofs: &[usize]);

    /// Force commands for the listed dofs. Negative values close the fingers.
    fn control_force(&mut self, forces: &[f64], dofs: &[usize]);

    /// Advance the engine by `steps` ticks.
    fn step(&mut self, steps: usize);
}

/// Sample entity and robot state for one abstraction cycle.
///
/// Block ids and sizes and slot positions come from the scene layout; poses come
/// from the robot.
pub fn observe<R: RobotInterface + ?Sized>(
    robot: &R,
    layout: &SceneLayout,
) -> Result<(EntitySnapshot, RobotObservation), RobotError> {
    let mut blocks = Vec::with_capacity(layout.blocks.len());
    for spec in &layout.blocks {
        blocks.push(Block {
            id: spec.id.clone(),
            pose: robot.entity_pose(&spec.id)?,
            size: spec.size,
        });
    }
    let snapshot = EntitySnapshot {
        blocks,
        slots: layout.slots.clone(),
    };
    let observation = RobotObservation {
        end_effector: robot.end_effector_pose(),
        joints: robot.configuration(),
        gripper: robot.gripper_apertures(),
    };
    Ok((snapshot, observation))
}
