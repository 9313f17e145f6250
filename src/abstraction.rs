//! World Abstractor: continuous entity and robot state → Symbolic World Model.
//!
//! Every relation is a pure floating-point proximity test against a tunable
//! tolerance in [`Thresholds`]. Absence of a relation is the default; nothing
//! is retried. What happens when the geometry admits more than one reading is
//! decided by the [`GroundingPolicy`].

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::AbstractionError;
use crate::geometry::{all_close, horizontal_delta, yaw_difference};
use crate::predicate::{Predicate, SupportViolation, WorldModel};
use crate::world::{Block, EntityId, EntitySnapshot, RobotObservation};

/// Proximity tolerances and fixed offsets, one per relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Horizontal alignment tolerance (holding, on).
    pub xy: f64,
    /// Vertical distance from end effector down to a held block's center.
    pub grasp_offset: f64,
    /// Tolerance on `grasp_offset`.
    pub grasp_z: f64,
    /// Tolerance on the π yaw flip between gripper and held block.
    pub yaw: f64,
    /// Per-finger aperture when closed on a block.
    pub grip_aperture: f64,
    /// Tolerance on `grip_aperture`.
    pub grip: f64,
    /// Center height of a block resting on the table.
    pub table_height: f64,
    /// Tolerance on `table_height`.
    pub table: f64,
    /// Center-to-center height of two stacked blocks.
    pub block_height: f64,
    /// Tolerance on `block_height`.
    pub stack: f64,
    /// Per-axis tolerance for a block sitting in a slot.
    pub slot: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            xy: 0.01,
            grasp_offset: 0.11,
            grasp_z: 0.01,
            yaw: 0.1,
            grip_aperture: 0.02,
            grip: 0.005,
            table_height: 0.02,
            table: 0.001,
            block_height: 0.04,
            stack: 0.005,
            slot: 0.001,
        }
    }
}

impl Thresholds {
    /// Every field with its name, for validation and display.
    pub fn fields(&self) -> [(&'static str, f64); 11] {
        [
            ("xy", self.xy),
            ("grasp_offset", self.grasp_offset),
            ("grasp_z", self.grasp_z),
            ("yaw", self.yaw),
            ("grip_aperture", self.grip_aperture),
            ("grip", self.grip),
            ("table_height", self.table_height),
            ("table", self.table),
            ("block_height", self.block_height),
            ("stack", self.stack),
            ("slot", self.slot),
        ]
    }
}

/// How the abstractor treats geometry that supports more than one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroundingPolicy {
    /// Raise a grounding ambiguity error on conflicting supports.
    #[default]
    Strict,
    /// Take the first matching support and log violations.
    FirstMatch,
}

/// `[abstraction]` config section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbstractionConfig {
    pub policy: GroundingPolicy,
}

/// Derives a [`WorldModel`] from one snapshot of entities and robot state.
#[derive(Debug, Clone, Default)]
pub struct WorldAbstractor {
    thresholds: Thresholds,
    policy: GroundingPolicy,
}

impl WorldAbstractor {
    pub fn new(thresholds: Thresholds, policy: GroundingPolicy) -> Self {
        Self { thresholds, policy }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn policy(&self) -> GroundingPolicy {
        self.policy
    }

    /// Compute the full predicate set for the current snapshot.
    pub fn abstract_world(
        &self,
        entities: &EntitySnapshot,
        robot: &RobotObservation,
    ) -> Result<WorldModel, AbstractionError> {
        let blocks = &entities.blocks;
        let mut model = WorldModel::new();

        match self.find_held(blocks, robot) {
            Some(held) => {
                model.insert(Predicate::holding(held.id.clone()));
            }
            None => {
                model.insert(Predicate::HandEmpty);
            }
        }

        let on_table: Vec<bool> = blocks.iter().map(|b| self.rests_on_table(b)).collect();
        for (block, _) in blocks.iter().zip(&on_table).filter(|(_, t)| **t) {
            model.insert(Predicate::on_table(block.id.clone()));
        }

        let mut supports: Vec<&EntityId> = Vec::new();
        for (i, top) in blocks.iter().enumerate() {
            if on_table[i] {
                continue;
            }
            let candidates: Vec<&Block> = blocks
                .iter()
                .enumerate()
                .filter(|(j, bottom)| *j != i && self.is_stacked_on(top, bottom))
                .map(|(_, bottom)| bottom)
                .collect();

            if candidates.len() > 1 && self.policy == GroundingPolicy::Strict {
                return Err(AbstractionError::AmbiguousSupport {
                    block: top.id.to_string(),
                    supports: join_ids(candidates.iter().map(|b| &b.id)),
                });
            }
            if let Some(bottom) = candidates.first() {
                model.insert(Predicate::on(top.id.clone(), bottom.id.clone()));
                supports.push(&bottom.id);
            }
        }

        for block in blocks {
            if !supports.contains(&&block.id) {
                model.insert(Predicate::clear(block.id.clone()));
            }
        }

        self.ground_slots(entities, &mut model);

        let violations = model.support_violations(entities.block_ids());
        self.review(&violations)?;

        tracing::debug!(
            facts = model.len(),
            blocks = blocks.len(),
            slots = entities.slots.len(),
            "abstracted world state"
        );
        Ok(model)
    }

    /// First block that satisfies every holding condition.
    ///
    /// Checks run cheapest first: horizontal, vertical, yaw, then finger apertures.
    fn find_held<'a>(&self, blocks: &'a [Block], robot: &RobotObservation) -> Option<&'a Block> {
        let t = &self.thresholds;
        let ee = &robot.end_effector.position;
        blocks.iter().find(|block| {
            let (dx, dy) = horizontal_delta(ee, block.position());
            if dx >= t.xy || dy >= t.xy {
                return false;
            }
            let dz = ee.z - block.position().z;
            if (dz - t.grasp_offset).abs() >= t.grasp_z {
                return false;
            }
            let flip = yaw_difference(robot.end_effector.yaw(), block.yaw()).abs();
            if (flip - PI).abs() >= t.yaw {
                return false;
            }
            !robot.gripper.is_empty()
                && robot
                    .gripper
                    .iter()
                    .all(|a| (a - t.grip_aperture).abs() < t.grip)
        })
    }

    fn rests_on_table(&self, block: &Block) -> bool {
        (block.position().z - self.thresholds.table_height).abs() < self.thresholds.table
    }

    fn is_stacked_on(&self, top: &Block, bottom: &Block) -> bool {
        let t = &self.thresholds;
        let (dx, dy) = horizontal_delta(top.position(), bottom.position());
        let dz = top.position().z - bottom.position().z;
        dx < t.xy && dy < t.xy && (dz - t.block_height).abs() < t.stack
    }

    /// filled/empty per slot, in per occupant, unused per free block, gridempty.
    ///
    /// Slot facts are only produced for scenes that define slots.
    fn ground_slots(&self, entities: &EntitySnapshot, model: &mut WorldModel) {
        if entities.slots.is_empty() {
            return;
        }
        let tol = self.thresholds.slot;
        let mut empty_count = 0;
        for slot in &entities.slots {
            let mut empty = true;
            for block in &entities.blocks {
                if all_close(&slot.position, block.position(), tol) {
                    model.insert(Predicate::in_slot(block.id.clone(), slot.id.clone()));
                    empty = false;
                }
            }
            if empty {
                model.insert(Predicate::Empty {
                    slot: slot.id.clone(),
                });
                empty_count += 1;
            } else {
                model.insert(Predicate::Filled {
                    slot: slot.id.clone(),
                });
            }
        }
        if empty_count == entities.slots.len() {
            model.insert(Predicate::GridEmpty);
        }

        for block in &entities.blocks {
            let used = entities
                .slots
                .iter()
                .any(|slot| all_close(&slot.position, block.position(), tol));
            if !used {
                model.insert(Predicate::Unused {
                    block: block.id.clone(),
                });
            }
        }
    }

    fn review(&self, violations: &[SupportViolation]) -> Result<(), AbstractionError> {
        for violation in violations {
            match (violation, self.policy) {
                (SupportViolation::Unsupported { block }, _) => {
                    tracing::warn!(%block, "block has no support relation");
                }
                (SupportViolation::Conflicting { block, supports }, GroundingPolicy::Strict) => {
                    return Err(AbstractionError::ConflictingSupport {
                        block: block.to_string(),
                        predicates: supports
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(" "),
                    });
                }
                (SupportViolation::Shared { support, blocks }, GroundingPolicy::Strict) => {
                    return Err(AbstractionError::SharedSupport {
                        support: support.to_string(),
                        blocks: join_ids(blocks.iter()),
                    });
                }
                (other, GroundingPolicy::FirstMatch) => {
                    tracing::warn!(violation = ?other, "support invariant violated");
                }
            }
        }
        Ok(())
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a EntityId>) -> String {
    ids.map(EntityId::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{downward_grip, Euler, Pose};
    use nalgebra::Vector3;

    fn block(id: &str, x: f64, y: f64, z: f64) -> Block {
        Block {
            id: id.into(),
            pose: Pose::from_euler(Vector3::new(x, y, z), Euler::yaw_only(0.0)),
            size: 0.04,
        }
    }

    fn idle_robot() -> RobotObservation {
        RobotObservation {
            end_effector: Pose::new(Vector3::new(0.5, 0.0, 0.4), downward_grip(PI)),
            joints: vec![0.0; 9],
            gripper: vec![0.04, 0.04],
        }
    }

    fn gripping_over(b: &Block) -> RobotObservation {
        RobotObservation {
            end_effector: Pose::new(
                b.position() + Vector3::new(0.004, 0.0, 0.11),
                downward_grip(b.yaw() + PI),
            ),
            joints: vec![0.0; 9],
            gripper: vec![0.02, 0.02],
        }
    }

    fn snapshot(blocks: Vec<Block>) -> EntitySnapshot {
        EntitySnapshot {
            blocks,
            slots: Vec::new(),
        }
    }

    #[test]
    fn held_block_detected_when_all_conditions_hold() {
        let mut held = block("r", 0.5, 0.1, 0.2);
        held.pose = Pose::from_euler(*held.position(), Euler::yaw_only(0.3));
        let robot = gripping_over(&held);
        let entities = snapshot(vec![held, block("g", 0.6, 0.0, 0.02)]);
        let model = WorldAbstractor::default()
            .abstract_world(&entities, &robot)
            .unwrap();
        assert!(model.contains(&Predicate::holding("r")));
        assert!(!model.contains(&Predicate::HandEmpty));
    }

    #[test]
    fn open_gripper_is_not_holding() {
        let held = block("r", 0.5, 0.1, 0.2);
        let mut robot = gripping_over(&held);
        robot.gripper = vec![0.04, 0.04];
        let model = WorldAbstractor::default()
            .abstract_world(&snapshot(vec![held]), &robot)
            .unwrap();
        assert!(model.contains(&Predicate::HandEmpty));
        assert_eq!(model.held_block(), None);
    }

    #[test]
    fn unflipped_yaw_is_not_holding() {
        let held = block("r", 0.5, 0.1, 0.2);
        let mut robot = gripping_over(&held);
        robot.end_effector.orientation = downward_grip(0.0);
        let model = WorldAbstractor::default()
            .abstract_world(&snapshot(vec![held]), &robot)
            .unwrap();
        assert!(model.contains(&Predicate::HandEmpty));
    }

    #[test]
    fn slots_partition_and_grid_state() {
        let entities = EntitySnapshot {
            blocks: vec![block("r", 0.45, -0.25, 0.02), block("g", 0.6, 0.2, 0.02)],
            slots: vec![
                crate::world::Slot {
                    id: "s1".into(),
                    position: Vector3::new(0.45, -0.25, 0.02),
                },
                crate::world::Slot {
                    id: "s2".into(),
                    position: Vector3::new(0.49, -0.25, 0.02),
                },
            ],
        };
        let model = WorldAbstractor::default()
            .abstract_world(&entities, &idle_robot())
            .unwrap();
        assert!(model.contains(&Predicate::Filled { slot: "s1".into() }));
        assert!(model.contains(&Predicate::Empty { slot: "s2".into() }));
        assert!(model.contains(&Predicate::in_slot("r", "s1")));
        assert!(model.contains(&Predicate::Unused { block: "g".into() }));
        assert!(!model.contains(&Predicate::Unused { block: "r".into() }));
        assert!(!model.contains(&Predicate::GridEmpty));
    }

    #[test]
    fn empty_grid_is_reported() {
        let entities = EntitySnapshot {
            blocks: vec![block("r", 0.6, 0.0, 0.02)],
            slots: vec![crate::world::Slot {
                id: "s1".into(),
                position: Vector3::new(0.45, -0.25, 0.02),
            }],
        };
        let model = WorldAbstractor::default()
            .abstract_world(&entities, &idle_robot())
            .unwrap();
        assert!(model.contains(&Predicate::GridEmpty));
        assert_eq!(model.count("empty"), 1);
    }

    #[test]
    fn no_slot_facts_without_slots() {
        let model = WorldAbstractor::default()
            .abstract_world(&snapshot(vec![block("r", 0.6, 0.0, 0.02)]), &idle_robot())
            .unwrap();
        assert_eq!(model.count("unused"), 0);
        assert!(!model.contains(&Predicate::GridEmpty));
    }

    #[test]
    fn strict_policy_rejects_two_candidate_supports() {
        let loose = Thresholds {
            xy: 0.05,
            ..Thresholds::default()
        };
        let entities = snapshot(vec![
            block("a", 0.50, 0.0, 0.06),
            block("b", 0.48, 0.0, 0.02),
            block("c", 0.52, 0.0, 0.02),
        ]);
        let strict = WorldAbstractor::new(loose.clone(), GroundingPolicy::Strict);
        assert!(matches!(
            strict.abstract_world(&entities, &idle_robot()),
            Err(AbstractionError::AmbiguousSupport { .. })
        ));

        let legacy = WorldAbstractor::new(loose, GroundingPolicy::FirstMatch);
        let model = legacy.abstract_world(&entities, &idle_robot()).unwrap();
        assert!(model.contains(&Predicate::on("a", "b")));
        assert!(!model.contains(&Predicate::on("a", "c")));
    }
}
