//! Kinematic reference backend for [`RobotInterface`].
//!
//! A Cartesian arm with no dynamics. The configuration vector is
//! `[x, y, z, roll, pitch, yaw, pad, finger_1, finger_2]`: dofs `0..7` are the
//! arm and `7..9` the fingers. Position targets are reached on the next tick.
//! Closing the fingers around a block attaches it to the hand; opening them
//! past half a block width drops it onto the highest block underneath, or the
//! table.

use std::ops::Range;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::RobotError;
use crate::geometry::{Euler, Pose, wrap_angle};
use crate::robot::{Configuration, RobotInterface};
use crate::scene::SceneLayout;
use crate::world::EntityId;

const DOFS: usize = 9;
const ARM: Range<usize> = 0..7;
const FINGERS: Range<usize> = 7..9;

/// Tunables of the kinematic sim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Hand height above a block centre at which closing fingers catch it.
    pub grasp_offset: f64,
    /// Allowed deviation from `grasp_offset` when catching.
    pub grasp_tolerance: f64,
    /// Finger aperture when fully open.
    pub open_aperture: f64,
    /// Initial hand position.
    pub home: [f64; 3],
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grasp_offset: 0.11,
            grasp_tolerance: 0.02,
            open_aperture: 0.04,
            home: [0.5, 0.0, 0.4],
        }
    }
}

#[derive(Debug, Clone)]
struct SimBlock {
    id: EntityId,
    position: Vector3<f64>,
    yaw: f64,
    size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FingerMode {
    Position,
    Closing,
}

#[derive(Debug, Clone)]
struct Attachment {
    index: usize,
    offset: Vector3<f64>,
    yaw_offset: f64,
}

/// In-memory arm and block world.
#[derive(Debug, Clone)]
pub struct KinematicSim {
    config: SimConfig,
    q: Vec<f64>,
    target: Vec<f64>,
    finger_mode: FingerMode,
    blocks: Vec<SimBlock>,
    attached: Option<Attachment>,
    ticks: u64,
}

impl KinematicSim {
    pub fn new(layout: &SceneLayout) -> Self {
        Self::with_config(layout, SimConfig::default())
    }

    pub fn with_config(layout: &SceneLayout, config: SimConfig) -> Self {
        let [x, y, z] = config.home;
        let open = config.open_aperture;
        let q = vec![x, y, z, std::f64::consts::PI, 0.0, std::f64::consts::PI, 0.0, open, open];
        let blocks = layout
            .blocks
            .iter()
            .map(|b| SimBlock {
                id: b.id.clone(),
                position: b.position,
                yaw: b.yaw,
                size: b.size,
            })
            .collect();
        Self {
            config,
            target: q.clone(),
            q,
            finger_mode: FingerMode::Position,
            blocks,
            attached: None,
            ticks: 0,
        }
    }

    /// Engine ticks elapsed since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Id of the block currently attached to the hand.
    pub fn attached_block(&self) -> Option<&EntityId> {
        self.attached.as_ref().map(|a| &self.blocks[a.index].id)
    }

    /// Teleport a block, detaching it if held. Used to set up test situations.
    pub fn set_block_position(&mut self, id: &EntityId, position: Vector3<f64>) -> Result<(), RobotError> {
        let index = self.index_of(id)?;
        if self.attached.as_ref().is_some_and(|a| a.index == index) {
            self.attached = None;
        }
        self.blocks[index].position = position;
        Ok(())
    }

    fn index_of(&self, id: &EntityId) -> Result<usize, RobotError> {
        self.blocks
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| RobotError::UnknownEntity { id: id.to_string() })
    }

    fn hand_position(&self) -> Vector3<f64> {
        Vector3::new(self.q[0], self.q[1], self.q[2])
    }

    fn hand_yaw(&self) -> f64 {
        self.end_effector_pose().yaw()
    }

    fn try_attach(&mut self) -> Option<Attachment> {
        let hand = self.hand_position();
        let hand_yaw = self.hand_yaw();
        let (index, block) = self.blocks.iter().enumerate().find(|(_, b)| {
            let half = b.size / 2.0;
            (hand.x - b.position.x).abs() < half
                && (hand.y - b.position.y).abs() < half
                && ((hand.z - b.position.z) - self.config.grasp_offset).abs() < self.config.grasp_tolerance
        })?;
        tracing::trace!(block = %block.id, "sim: block attached");
        Some(Attachment {
            index,
            offset: block.position - hand,
            yaw_offset: block.yaw - hand_yaw,
        })
    }

    fn follow_hand(&mut self) {
        if let Some(att) = &self.attached {
            let hand = self.hand_position();
            let yaw = wrap_angle(self.hand_yaw() + att.yaw_offset);
            let block = &mut self.blocks[att.index];
            block.position = hand + att.offset;
            block.yaw = yaw;
        }
    }

    /// Drop a released block onto whatever lies below it.
    fn settle_block(&mut self, index: usize) {
        let dropped = self.blocks[index].clone();
        let bottom = dropped.position.z - dropped.size / 2.0;
        let support_top = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(i, b)| {
                *i != index
                    && (b.position.x - dropped.position.x).abs() < (b.size + dropped.size) / 2.0
                    && (b.position.y - dropped.position.y).abs() < (b.size + dropped.size) / 2.0
                    && b.position.z + b.size / 2.0 <= bottom + 1e-6
            })
            .map(|(_, b)| b.position.z + b.size / 2.0)
            .fold(0.0_f64, f64::max);
        self.blocks[index].position.z = support_top + dropped.size / 2.0;
        tracing::trace!(block = %dropped.id, z = self.blocks[index].position.z, "sim: block released");
    }

    fn tick(&mut self) {
        for dof in ARM {
            self.q[dof] = self.target[dof];
        }
        self.follow_hand();

        match self.finger_mode {
            FingerMode::Closing => {
                if self.attached.is_none() {
                    self.attached = self.try_attach();
                }
                let aperture = match &self.attached {
                    Some(att) => self.blocks[att.index].size / 2.0,
                    None => 0.0,
                };
                for dof in FINGERS {
                    self.q[dof] = aperture;
                }
            }
            FingerMode::Position => {
                for dof in FINGERS {
                    self.q[dof] = self.target[dof].max(0.0);
                }
                if let Some(att) = &self.attached {
                    let half = self.blocks[att.index].size / 2.0;
                    if FINGERS.into_iter().any(|d| self.q[d] > half + 1e-9) {
                        let index = att.index;
                        self.attached = None;
                        self.settle_block(index);
                    }
                }
            }
        }
    }
}

impl RobotInterface for KinematicSim {
    fn entity_pose(&self, id: &EntityId) -> Result<Pose, RobotError> {
        let block = &self.blocks[self.index_of(id)?];
        Ok(Pose::from_euler(block.position, Euler::yaw_only(block.yaw)))
    }

    fn end_effector_pose(&self) -> Pose {
        Pose::from_euler(
            self.hand_position(),
            Euler::new(self.q[3], self.q[4], self.q[5]),
        )
    }

    fn gripper_apertures(&self) -> Vec<f64> {
        self.q[FINGERS].to_vec()
    }

    fn configuration(&self) -> Configuration {
        self.q.clone()
    }

    fn arm_dofs(&self) -> Range<usize> {
        ARM
    }

    fn finger_dofs(&self) -> Range<usize> {
        FINGERS
    }

    fn inverse_kinematics(&self, target: &Pose, seed: &[f64]) -> Result<Configuration, RobotError> {
        let p = target.position;
        if !p.iter().all(|v| v.is_finite()) {
            return Err(RobotError::InverseKinematics {
                message: format!("non-finite target position {p:?}"),
            });
        }
        if p.z < 0.0 {
            return Err(RobotError::InverseKinematics {
                message: format!("target z {:.3} is below the table", p.z),
            });
        }
        let e = target.euler();
        let finger = |dof: usize| seed.get(dof).copied().unwrap_or(self.config.open_aperture);
        Ok(vec![p.x, p.y, p.z, e.roll, e.pitch, e.yaw, 0.0, finger(7), finger(8)])
    }

    fn plan_path(&self, goal: &[f64], waypoints: usize) -> Result<Vec<Configuration>, RobotError> {
        if goal.len() != DOFS {
            return Err(RobotError::PathPlanning {
                message: format!("goal has {} dofs, expected {DOFS}", goal.len()),
            });
        }
        let n = waypoints.max(1);
        Ok((1..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                self.q
                    .iter()
                    .zip(goal)
                    .map(|(from, to)| from + (to - from) * t)
                    .collect()
            })
            .collect())
    }

    fn control_position(&mut self, targets: &[f64], dofs: &[usize]) {
        for (&value, &dof) in targets.iter().zip(dofs) {
            if dof < DOFS {
                self.target[dof] = value;
            }
            if FINGERS.contains(&dof) {
                self.finger_mode = FingerMode::Position;
            }
        }
    }

    fn control_force(&mut self, forces: &[f64], dofs: &[usize]) {
        for (&force, &dof) in forces.iter().zip(dofs) {
            if !FINGERS.contains(&dof) {
                continue;
            }
            if force < 0.0 {
                self.finger_mode = FingerMode::Closing;
            } else {
                self.finger_mode = FingerMode::Position;
                self.target[dof] = self.config.open_aperture;
            }
        }
    }

    fn step(&mut self, steps: usize) {
        for _ in 0..steps {
            self.tick();
        }
        self.ticks += steps as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::downward_grip;
    use crate::scene::BlockSpec;

    fn two_blocks() -> SceneLayout {
        SceneLayout::new(
            vec![
                BlockSpec::new("r", Vector3::new(0.6, 0.0, 0.02)),
                BlockSpec::new("g", Vector3::new(0.5, 0.2, 0.02)),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    fn move_hand(sim: &mut KinematicSim, position: Vector3<f64>) {
        let target = Pose::new(position, downward_grip(std::f64::consts::PI));
        let q = sim.inverse_kinematics(&target, &sim.configuration()).unwrap();
        sim.control_position(&q[ARM], &ARM.collect::<Vec<_>>());
        sim.step(1);
    }

    #[test]
    fn close_attaches_and_open_drops_onto_support() {
        let mut sim = KinematicSim::new(&two_blocks());
        move_hand(&mut sim, Vector3::new(0.6, 0.0, 0.13));
        sim.control_force(&[-1.0, -1.0], &[7, 8]);
        sim.step(5);
        assert_eq!(sim.attached_block().map(EntityId::as_str), Some("r"));
        assert_eq!(sim.gripper_apertures(), vec![0.02, 0.02]);

        move_hand(&mut sim, Vector3::new(0.5, 0.2, 0.2));
        let r = sim.entity_pose(&"r".into()).unwrap();
        assert!((r.position.z - 0.09).abs() < 1e-9);

        sim.control_position(&[0.04, 0.04], &[7, 8]);
        sim.step(1);
        assert!(sim.attached_block().is_none());
        let r = sim.entity_pose(&"r".into()).unwrap();
        assert!((r.position.z - 0.06).abs() < 1e-9);
    }

    #[test]
    fn closing_on_nothing_shuts_fingers() {
        let mut sim = KinematicSim::new(&two_blocks());
        sim.control_force(&[-1.0, -1.0], &[7, 8]);
        sim.step(1);
        assert!(sim.attached_block().is_none());
        assert_eq!(sim.gripper_apertures(), vec![0.0, 0.0]);
    }

    #[test]
    fn path_ends_at_goal_and_ik_rejects_bad_targets() {
        let sim = KinematicSim::new(&two_blocks());
        let goal = vec![0.4, 0.1, 0.3, 0.0, 0.0, 0.0, 0.0, 0.04, 0.04];
        let path = sim.plan_path(&goal, 10).unwrap();
        assert_eq!(path.len(), 10);
        assert_eq!(path.last().unwrap(), &goal);
        assert!(sim.plan_path(&goal[..3], 10).is_err());

        let below = Pose::at(Vector3::new(0.5, 0.0, -0.1));
        assert!(matches!(
            sim.inverse_kinematics(&below, &[]),
            Err(RobotError::InverseKinematics { .. })
        ));
        assert!(matches!(
            sim.entity_pose(&"zz".into()),
            Err(RobotError::UnknownEntity { .. })
        ));
    }
}
