//! Motion Primitive Library: grounded actions → robot commands.
//!
//! Every primitive follows the same pattern: derive a target hand pose from the
//! current pose of an entity plus a fixed offset, solve IK, follow a planned
//! path one waypoint per tick, then hold for a settle count. Grasp and release
//! add a finger force or position command and their own settle hold.
//!
//! Primitives are open-loop. They never check whether a grasp succeeded; the
//! next abstraction cycle is what notices.

use std::ops::Range;

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::PrimitiveError;
use crate::geometry::{Direction, Pose, downward_grip, planar_distance};
use crate::plan::GroundedAction;
use crate::robot::{Configuration, RobotInterface};
use crate::world::EntityId;

/// How many table positions `put-down` may sample before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingBudget {
    /// Sample until a position is found.
    Unbounded,
    Capped(usize),
}

impl Default for SamplingBudget {
    fn default() -> Self {
        Self::Capped(1000)
    }
}

impl SamplingBudget {
    fn allows(self, attempts: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Capped(max) => attempts < max,
        }
    }
}

/// Offsets, waypoint counts, and settle durations of every primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimitiveConfig {
    /// Hand offset above a block before grasping.
    pub pregrasp_offset: [f64; 3],
    /// Descent from the pre-grasp pose to the grasp pose.
    pub grasp_descent: f64,
    /// Lift after grasping and after releasing.
    pub lift: f64,
    /// Hand offset above the target block before stacking.
    pub stack_offset: [f64; 3],
    pub stack_descent: f64,
    pub place_above_descent: f64,
    /// Hand height above the anchor block before a directional place.
    pub place_height: f64,
    /// Horizontal step per axis for directional places.
    pub place_step: f64,
    pub place_descent: f64,
    /// Hand height for the put-down approach.
    pub put_down_height: f64,
    pub put_down_descent: f64,
    /// Put-down sampling region, `[min, max]` per axis.
    pub put_down_x: [f64; 2],
    pub put_down_y: [f64; 2],
    /// Minimum planar distance from every other block for a put-down spot.
    pub min_clearance: f64,
    pub sampling: SamplingBudget,
    /// Seed of the put-down sampler.
    pub seed: u64,
    pub approach_waypoints: usize,
    pub descend_waypoints: usize,
    pub approach_settle: usize,
    pub descend_settle: usize,
    pub direction_settle: usize,
    pub move_settle: usize,
    pub grasp_settle: usize,
    pub release_settle: usize,
    pub open_aperture: f64,
    /// Finger force while grasping. Negative closes.
    pub grasp_force: f64,
}

impl Default for PrimitiveConfig {
    fn default() -> Self {
        Self {
            pregrasp_offset: [0.005, 0.0, 0.21],
            grasp_descent: 0.1,
            lift: 0.1,
            stack_offset: [0.005, 0.0, 0.2],
            stack_descent: 0.04,
            place_above_descent: 0.0,
            place_height: 0.22,
            place_step: 0.047,
            place_descent: 0.05,
            put_down_height: 0.18,
            put_down_descent: 0.05,
            put_down_x: [0.45, 0.65],
            put_down_y: [-0.4, 0.4],
            min_clearance: 0.15,
            sampling: SamplingBudget::default(),
            seed: 0,
            approach_waypoints: 200,
            descend_waypoints: 50,
            approach_settle: 25,
            descend_settle: 25,
            direction_settle: 100,
            move_settle: 50,
            grasp_settle: 50,
            release_settle: 50,
            open_aperture: 0.04,
            grasp_force: -1.0,
        }
    }
}

/// Executes grounded actions on a robot.
#[derive(Debug, Clone)]
pub struct MotionPrimitives {
    config: PrimitiveConfig,
    blocks: Vec<EntityId>,
    rng: StdRng,
}

impl MotionPrimitives {
    /// `blocks` lists every block that put-down must keep clear of.
    pub fn new(config: PrimitiveConfig, blocks: Vec<EntityId>) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            blocks,
            rng,
        }
    }

    pub fn config(&self) -> &PrimitiveConfig {
        &self.config
    }

    /// Dispatch one action to its primitive.
    pub fn execute<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        action: &GroundedAction,
    ) -> Result<(), PrimitiveError> {
        tracing::info!(action = %action, "executing primitive");
        match action {
            GroundedAction::PickUp { block } => self.pick_up(robot, block),
            GroundedAction::PutDown { block } => self.put_down(robot, block),
            GroundedAction::Stack { block, onto } => self.stack(robot, block, onto),
            GroundedAction::Unstack { block, .. } => self.unstack(robot, block),
            GroundedAction::PlaceAbove { block, onto } => self.place_above(robot, block, onto),
            GroundedAction::Place {
                block,
                anchor,
                direction,
            } => self.place_direction(robot, block, anchor, *direction),
            GroundedAction::PlaceFirst { block } => self.place_first(robot, block),
        }
    }

    /// Approach from above, descend, close the fingers, lift.
    pub fn pick_up<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        block: &EntityId,
    ) -> Result<(), PrimitiveError> {
        let pose = robot.entity_pose(block)?;
        let grip = downward_grip(pose.yaw() + std::f64::consts::PI);
        let pregrasp = Pose::new(pose.position + vec3(self.config.pregrasp_offset), grip);

        let mut q = robot.inverse_kinematics(&pregrasp, &robot.configuration())?;
        self.open_fingers_in(robot, &mut q);
        self.follow(robot, &q, self.config.approach_waypoints, true)?;
        robot.step(self.config.approach_settle);

        let grasp = pregrasp.translated(Vector3::new(0.0, 0.0, -self.config.grasp_descent));
        let q = robot.inverse_kinematics(&grasp, &robot.configuration())?;
        self.follow(robot, &q, self.config.descend_waypoints, true)?;
        robot.step(self.config.descend_settle);

        self.grasp(robot, &q);

        let lifted = grasp.translated(Vector3::new(0.0, 0.0, self.config.lift));
        let q = robot.inverse_kinematics(&lifted, &robot.configuration())?;
        self.move_to(robot, &q, false);
        Ok(())
    }

    /// Lifting a block off another block is the same motion as picking it up.
    pub fn unstack<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        block: &EntityId,
    ) -> Result<(), PrimitiveError> {
        self.pick_up(robot, block)
    }

    /// Carry the held block to a sampled free table spot and release it.
    pub fn put_down<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        block: &EntityId,
    ) -> Result<(), PrimitiveError> {
        let spot = self.sample_free_spot(robot, block)?;
        let grip = downward_grip(std::f64::consts::PI);
        let above = Pose::new(spot, grip);

        let q = robot.inverse_kinematics(&above, &robot.configuration())?;
        self.follow(robot, &q, self.config.approach_waypoints, false)?;
        robot.step(self.config.approach_settle);

        let place = above.translated(Vector3::new(0.0, 0.0, -self.config.put_down_descent));
        let q = robot.inverse_kinematics(&place, &robot.configuration())?;
        self.follow(robot, &q, self.config.descend_waypoints, false)?;
        robot.step(self.config.descend_settle);

        self.release_and_lift(robot, q, &place)
    }

    /// Put the held block on top of `onto`.
    pub fn stack<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        _block: &EntityId,
        onto: &EntityId,
    ) -> Result<(), PrimitiveError> {
        self.place_on(robot, onto, self.config.stack_descent)
    }

    /// Release the held block right above `onto` without pressing it down.
    pub fn place_above<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        _block: &EntityId,
        onto: &EntityId,
    ) -> Result<(), PrimitiveError> {
        self.place_on(robot, onto, self.config.place_above_descent)
    }

    /// Release the held block one step from `anchor` towards `direction`.
    pub fn place_direction<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        _block: &EntityId,
        anchor: &EntityId,
        direction: Direction,
    ) -> Result<(), PrimitiveError> {
        let pose = robot.entity_pose(anchor)?;
        let approach_grip = downward_grip(pose.yaw() + std::f64::consts::PI);
        let above = pose.position
            + direction.offset(self.config.place_step)
            + Vector3::new(0.0, 0.0, self.config.place_height);

        let mut q = robot.inverse_kinematics(&Pose::new(above, approach_grip), &robot.configuration())?;
        self.open_fingers_in(robot, &mut q);
        self.follow(robot, &q, self.config.approach_waypoints, false)?;
        robot.step(self.config.direction_settle);

        let place = Pose::new(
            above - Vector3::new(0.0, 0.0, self.config.place_descent),
            downward_grip(std::f64::consts::PI),
        );
        let q = robot.inverse_kinematics(&place, &robot.configuration())?;
        self.move_to(robot, &q, false);
        self.release_and_lift(robot, q, &place)
    }

    /// Release the held block where the hand currently is.
    pub fn place_first<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        block: &EntityId,
    ) -> Result<(), PrimitiveError> {
        tracing::debug!(block = %block, "releasing in place");
        let q = robot.configuration();
        self.release(robot, q);
        Ok(())
    }

    fn place_on<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        onto: &EntityId,
        descent: f64,
    ) -> Result<(), PrimitiveError> {
        let pose = robot.entity_pose(onto)?;
        let approach_grip = downward_grip(pose.yaw() + std::f64::consts::PI);
        let above = pose.position + vec3(self.config.stack_offset);

        let mut q = robot.inverse_kinematics(&Pose::new(above, approach_grip), &robot.configuration())?;
        self.open_fingers_in(robot, &mut q);
        self.follow(robot, &q, self.config.approach_waypoints, false)?;
        robot.step(self.config.approach_settle);

        let place = Pose::new(
            above - Vector3::new(0.0, 0.0, descent),
            downward_grip(std::f64::consts::PI),
        );
        let q = robot.inverse_kinematics(&place, &robot.configuration())?;
        self.move_to(robot, &q, false);
        self.release_and_lift(robot, q, &place)
    }

    fn release_and_lift<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &mut R,
        q: Configuration,
        place: &Pose,
    ) -> Result<(), PrimitiveError> {
        self.release(robot, q);
        let lifted = place.translated(Vector3::new(0.0, 0.0, self.config.lift));
        let q = robot.inverse_kinematics(&lifted, &robot.configuration())?;
        self.move_to(robot, &q, true);
        Ok(())
    }

    /// Rejection-sample a hand position above a table spot clear of other blocks.
    fn sample_free_spot<R: RobotInterface + ?Sized>(
        &mut self,
        robot: &R,
        held: &EntityId,
    ) -> Result<Vector3<f64>, PrimitiveError> {
        let mut others = Vec::with_capacity(self.blocks.len());
        for id in self.blocks.iter().filter(|id| *id != held) {
            others.push(robot.entity_pose(id)?.position);
        }

        let [x_lo, x_hi] = self.config.put_down_x;
        let [y_lo, y_hi] = self.config.put_down_y;
        let mut attempts = 0;
        while self.config.sampling.allows(attempts) {
            attempts += 1;
            let candidate = Vector3::new(
                self.rng.gen_range(x_lo..=x_hi),
                self.rng.gen_range(y_lo..=y_hi),
                self.config.put_down_height,
            );
            if others
                .iter()
                .all(|p| planar_distance(p, &candidate) > self.config.min_clearance)
            {
                tracing::debug!(block = %held, attempts, x = candidate.x, y = candidate.y, "found put-down spot");
                return Ok(candidate);
            }
        }
        Err(PrimitiveError::SamplingExhausted {
            block: held.to_string(),
            attempts,
        })
    }

    /// Follow a planned path to `goal`, one waypoint per tick.
    fn follow<R: RobotInterface + ?Sized>(
        &self,
        robot: &mut R,
        goal: &[f64],
        waypoints: usize,
        with_fingers: bool,
    ) -> Result<(), PrimitiveError> {
        let path = robot.plan_path(goal, waypoints)?;
        for waypoint in &path {
            command(robot, waypoint, with_fingers);
            robot.step(1);
        }
        Ok(())
    }

    fn move_to<R: RobotInterface + ?Sized>(&self, robot: &mut R, q: &[f64], with_fingers: bool) {
        command(robot, q, with_fingers);
        robot.step(self.config.move_settle);
    }

    fn grasp<R: RobotInterface + ?Sized>(&self, robot: &mut R, q: &[f64]) {
        command(robot, q, false);
        let fingers: Vec<usize> = robot.finger_dofs().collect();
        let forces = vec![self.config.grasp_force; fingers.len()];
        robot.control_force(&forces, &fingers);
        robot.step(self.config.grasp_settle);
    }

    fn release<R: RobotInterface + ?Sized>(&self, robot: &mut R, mut q: Configuration) {
        self.open_fingers_in(robot, &mut q);
        command(robot, &q, true);
        robot.step(self.config.release_settle);
    }

    fn open_fingers_in<R: RobotInterface + ?Sized>(&self, robot: &R, q: &mut [f64]) {
        for dof in robot.finger_dofs() {
            if let Some(v) = q.get_mut(dof) {
                *v = self.config.open_aperture;
            }
        }
    }
}

fn vec3(v: [f64; 3]) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

/// Position-control the arm dofs, and the finger dofs too when asked.
fn command<R: RobotInterface + ?Sized>(robot: &mut R, q: &[f64], with_fingers: bool) {
    let dofs: Range<usize> = if with_fingers {
        robot.arm_dofs().start..robot.finger_dofs().end
    } else {
        robot.arm_dofs()
    };
    let dofs: Vec<usize> = dofs.filter(|d| *d < q.len()).collect();
    let targets: Vec<f64> = dofs.iter().map(|d| q[*d]).collect();
    robot.control_position(&targets, &dofs);
}
