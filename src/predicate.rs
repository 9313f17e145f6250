//! Grounded predicates and the Symbolic World Model.
//!
//! A [`WorldModel`] is an ordered set of [`Predicate`]s. Variant order doubles as
//! emission order: support relations first, then hand state, then slot relations,
//! then the aggregates, matching what the blocks-domain planners expect.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PddlError;
use crate::world::EntityId;

/// A relation over concrete entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "predicate", rename_all = "kebab-case")]
pub enum Predicate {
    /// Block rests directly on the table.
    OnTable { block: EntityId },
    /// `block` rests directly on `support`.
    On { block: EntityId, support: EntityId },
    /// Nothing rests on the block.
    Clear { block: EntityId },
    /// The gripper holds the block.
    Holding { block: EntityId },
    Filled { slot: EntityId },
    Empty { slot: EntityId },
    /// Block occupies the slot.
    In { block: EntityId, slot: EntityId },
    /// Block occupies no slot.
    Unused { block: EntityId },
    /// No slot is filled.
    GridEmpty,
    HandEmpty,
}

impl Predicate {
    pub fn on_table(block: impl Into<EntityId>) -> Self {
        Self::OnTable {
            block: block.into(),
        }
    }

    pub fn on(block: impl Into<EntityId>, support: impl Into<EntityId>) -> Self {
        Self::On {
            block: block.into(),
            support: support.into(),
        }
    }

    pub fn clear(block: impl Into<EntityId>) -> Self {
        Self::Clear {
            block: block.into(),
        }
    }

    pub fn holding(block: impl Into<EntityId>) -> Self {
        Self::Holding {
            block: block.into(),
        }
    }

    pub fn in_slot(block: impl Into<EntityId>, slot: impl Into<EntityId>) -> Self {
        Self::In {
            block: block.into(),
            slot: slot.into(),
        }
    }

    /// Planner-facing name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnTable { .. } => "ontable",
            Self::On { .. } => "on",
            Self::Clear { .. } => "clear",
            Self::Holding { .. } => "holding",
            Self::Filled { .. } => "filled",
            Self::Empty { .. } => "empty",
            Self::In { .. } => "in",
            Self::Unused { .. } => "unused",
            Self::GridEmpty => "gridempty",
            Self::HandEmpty => "handempty",
        }
    }

    pub fn args(&self) -> Vec<&EntityId> {
        match self {
            Self::OnTable { block }
            | Self::Clear { block }
            | Self::Holding { block }
            | Self::Unused { block } => vec![block],
            Self::Filled { slot } | Self::Empty { slot } => vec![slot],
            Self::On { block, support } => vec![block, support],
            Self::In { block, slot } => vec![block, slot],
            Self::GridEmpty | Self::HandEmpty => Vec::new(),
        }
    }

    /// Build a predicate from its name and argument atoms.
    ///
    /// Accepts both the planner spelling (`ontable`) and the hyphenated one
    /// (`on-table`).
    pub fn from_parts(name: &str, args: &[&str]) -> Result<Self, PddlError> {
        let lowered = name.to_ascii_lowercase();
        let (arity, build): (usize, fn(&[&str]) -> Predicate) = match lowered.as_str() {
            "ontable" | "on-table" => (1, |a| Predicate::on_table(a[0])),
            "on" => (2, |a| Predicate::on(a[0], a[1])),
            "clear" => (1, |a| Predicate::clear(a[0])),
            "holding" => (1, |a| Predicate::holding(a[0])),
            "filled" => (1, |a| Predicate::Filled { slot: a[0].into() }),
            "empty" => (1, |a| Predicate::Empty { slot: a[0].into() }),
            "in" => (2, |a| Predicate::in_slot(a[0], a[1])),
            "unused" => (1, |a| Predicate::Unused { block: a[0].into() }),
            "gridempty" | "grid-empty" => (0, |_| Predicate::GridEmpty),
            "handempty" | "hand-empty" => (0, |_| Predicate::HandEmpty),
            _ => return Err(PddlError::UnknownPredicate { name: name.into() }),
        };
        if args.len() != arity {
            return Err(PddlError::Arity {
                name: lowered,
                expected: arity,
                found: args.len(),
            });
        }
        Ok(build(args))
    }

    /// The block this predicate gives a support to, if it is a support relation.
    fn supported_block(&self) -> Option<&EntityId> {
        match self {
            Self::OnTable { block } | Self::On { block, .. } | Self::Holding { block } => {
                Some(block)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        f.write_str(")")
    }
}

/// A broken support-uniqueness invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportViolation {
    /// No ontable/on/holding fact names the block.
    Unsupported { block: EntityId },
    /// More than one support fact names the block.
    Conflicting {
        block: EntityId,
        supports: Vec<Predicate>,
    },
    /// Several blocks rest on the same block.
    Shared {
        support: EntityId,
        blocks: Vec<EntityId>,
    },
}

/// The discrete abstraction of one observed world state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldModel {
    facts: BTreeSet<Predicate>,
}

impl WorldModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, predicate: Predicate) -> bool {
        self.facts.insert(predicate)
    }

    pub fn contains(&self, predicate: &Predicate) -> bool {
        self.facts.contains(predicate)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.facts.iter()
    }

    /// The block currently held, if any.
    pub fn held_block(&self) -> Option<&EntityId> {
        self.facts.iter().find_map(|p| match p {
            Predicate::Holding { block } => Some(block),
            _ => None,
        })
    }

    /// The block `block` rests on, if any.
    pub fn support_of(&self, block: &EntityId) -> Option<&EntityId> {
        self.facts.iter().find_map(|p| match p {
            Predicate::On { block: b, support } if b == block => Some(support),
            _ => None,
        })
    }

    pub fn count(&self, name: &str) -> usize {
        self.facts.iter().filter(|p| p.name() == name).count()
    }

    /// Check support uniqueness for every block in `blocks`.
    ///
    /// Returns an empty list when every block has exactly one of
    /// ontable / on / holding and no block carries two others.
    pub fn support_violations<'a>(
        &self,
        blocks: impl IntoIterator<Item = &'a EntityId>,
    ) -> Vec<SupportViolation> {
        let mut supports: BTreeMap<&EntityId, Vec<Predicate>> = BTreeMap::new();
        let mut carried: BTreeMap<&EntityId, Vec<EntityId>> = BTreeMap::new();
        for fact in &self.facts {
            if let Some(block) = fact.supported_block() {
                supports.entry(block).or_default().push(fact.clone());
            }
            if let Predicate::On { block, support } = fact {
                carried.entry(support).or_default().push(block.clone());
            }
        }

        let mut violations = Vec::new();
        for block in blocks {
            match supports.get(block) {
                None => violations.push(SupportViolation::Unsupported {
                    block: block.clone(),
                }),
                Some(found) if found.len() > 1 => violations.push(SupportViolation::Conflicting {
                    block: block.clone(),
                    supports: found.clone(),
                }),
                Some(_) => {}
            }
        }
        for (support, blocks) in carried {
            if blocks.len() > 1 {
                violations.push(SupportViolation::Shared {
                    support: support.clone(),
                    blocks,
                });
            }
        }
        violations
    }
}

impl FromIterator<Predicate> for WorldModel {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        Self {
            facts: iter.into_iter().collect(),
        }
    }
}

impl Extend<Predicate> for WorldModel {
    fn extend<I: IntoIterator<Item = Predicate>>(&mut self, iter: I) {
        self.facts.extend(iter);
    }
}

impl<'a> IntoIterator for &'a WorldModel {
    type Item = &'a Predicate;
    type IntoIter = std::collections::btree_set::Iter<'a, Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.facts.iter()
    }
}

impl fmt::Display for WorldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for fact in &self.facts {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{fact}")?;
            first = false;
        }
        Ok(())
    }
}
