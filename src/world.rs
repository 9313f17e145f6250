//! Entities and robot observations: the continuous input of the abstractor.
//!
//! Both are read-only snapshots rebuilt every abstraction cycle. Nothing here
//! carries identity across cycles except the [`EntityId`] tokens themselves.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::Pose;

/// Stable identifier of a block or slot (e.g. `r`, `g`, `s11`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A movable cube.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: EntityId,
    pub pose: Pose,
    /// Edge length of the cube.
    pub size: f64,
}

impl Block {
    pub fn position(&self) -> &Vector3<f64> {
        &self.pose.position
    }

    pub fn yaw(&self) -> f64 {
        self.pose.yaw()
    }
}

/// An immovable target position in a build grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: EntityId,
    pub position: Vector3<f64>,
}

/// Every entity visible in one abstraction cycle.
#[derive(Debug, Clone, Default)]
pub struct EntitySnapshot {
    pub blocks: Vec<Block>,
    pub slots: Vec<Slot>,
}

impl EntitySnapshot {
    pub fn block(&self, id: &EntityId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn block_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.blocks.iter().map(|b| &b.id)
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.slots.iter().map(|s| &s.id)
    }
}

/// Robot state sampled once per abstraction cycle.
#[derive(Debug, Clone)]
pub struct RobotObservation {
    pub end_effector: Pose,
    /// Full joint configuration, fingers included.
    pub joints: Vec<f64>,
    /// One aperture per finger.
    pub gripper: Vec<f64>,
}
