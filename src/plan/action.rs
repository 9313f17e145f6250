//! Grounded actions and plans.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Direction;
use crate::world::EntityId;

/// The primitive vocabulary a plan line can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    PickUp,
    PutDown,
    Stack,
    Unstack,
    PlaceAbove,
    Place(Direction),
    PlaceFirst,
}

impl ActionKind {
    /// Every keyword, for diagnostics.
    pub const KEYWORDS: [&'static str; 14] = [
        "pick-up",
        "put-down",
        "stack",
        "unstack",
        "place-above",
        "place-first",
        "place-north",
        "place-south",
        "place-east",
        "place-west",
        "place-northeast",
        "place-northwest",
        "place-southeast",
        "place-southwest",
    ];

    /// Match a token against the vocabulary, case-insensitively.
    pub fn from_keyword(token: &str) -> Option<Self> {
        let lowered = token.to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "pick-up" => Self::PickUp,
            "put-down" => Self::PutDown,
            "stack" => Self::Stack,
            "unstack" => Self::Unstack,
            "place-above" => Self::PlaceAbove,
            "place-first" => Self::PlaceFirst,
            other => {
                let dir = other.strip_prefix("place-")?;
                Self::Place(Direction::parse(dir)?)
            }
        };
        Some(kind)
    }

    pub fn keyword(&self) -> String {
        match self {
            Self::PickUp => "pick-up".into(),
            Self::PutDown => "put-down".into(),
            Self::Stack => "stack".into(),
            Self::Unstack => "unstack".into(),
            Self::PlaceAbove => "place-above".into(),
            Self::Place(dir) => format!("place-{dir}"),
            Self::PlaceFirst => "place-first".into(),
        }
    }

    /// Minimum number of entity arguments the primitive consumes.
    pub fn arity(&self) -> usize {
        match self {
            Self::PickUp | Self::PutDown | Self::Unstack | Self::PlaceFirst => 1,
            Self::Stack | Self::PlaceAbove | Self::Place(_) => 2,
        }
    }
}

/// One primitive invocation with concrete entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum GroundedAction {
    PickUp { block: EntityId },
    PutDown { block: EntityId },
    /// Put the held `block` onto `onto`.
    Stack { block: EntityId, onto: EntityId },
    /// Lift `block` off its support. The support id is informational.
    Unstack {
        block: EntityId,
        from: Option<EntityId>,
    },
    /// Release the held `block` directly above `onto` without pressing down.
    PlaceAbove { block: EntityId, onto: EntityId },
    /// Release the held `block` one block-width from `anchor` in `direction`.
    Place {
        block: EntityId,
        anchor: EntityId,
        direction: Direction,
    },
    /// Release the held `block` where the gripper is.
    PlaceFirst { block: EntityId },
}

impl GroundedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::PickUp { .. } => ActionKind::PickUp,
            Self::PutDown { .. } => ActionKind::PutDown,
            Self::Stack { .. } => ActionKind::Stack,
            Self::Unstack { .. } => ActionKind::Unstack,
            Self::PlaceAbove { .. } => ActionKind::PlaceAbove,
            Self::Place { direction, .. } => ActionKind::Place(*direction),
            Self::PlaceFirst { .. } => ActionKind::PlaceFirst,
        }
    }

    /// The block the primitive moves.
    pub fn block(&self) -> &EntityId {
        match self {
            Self::PickUp { block }
            | Self::PutDown { block }
            | Self::Stack { block, .. }
            | Self::Unstack { block, .. }
            | Self::PlaceAbove { block, .. }
            | Self::Place { block, .. }
            | Self::PlaceFirst { block } => block,
        }
    }

    /// Build an action from a kind and its positional arguments.
    ///
    /// Callers guarantee `args.len() >= kind.arity()`.
    pub(crate) fn from_args(kind: ActionKind, args: &[&str]) -> Self {
        let id = |i: usize| EntityId::from(args[i]);
        match kind {
            ActionKind::PickUp => Self::PickUp { block: id(0) },
            ActionKind::PutDown => Self::PutDown { block: id(0) },
            ActionKind::Stack => Self::Stack {
                block: id(0),
                onto: id(1),
            },
            ActionKind::Unstack => Self::Unstack {
                block: id(0),
                from: args.get(1).map(|s| EntityId::from(*s)),
            },
            ActionKind::PlaceAbove => Self::PlaceAbove {
                block: id(0),
                onto: id(1),
            },
            ActionKind::Place(direction) => Self::Place {
                block: id(0),
                anchor: id(1),
                direction,
            },
            ActionKind::PlaceFirst => Self::PlaceFirst { block: id(0) },
        }
    }
}

impl fmt::Display for GroundedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.kind().keyword())?;
        match self {
            Self::PickUp { block } | Self::PutDown { block } | Self::PlaceFirst { block } => {
                write!(f, " {block}")?
            }
            Self::Stack { block, onto } | Self::PlaceAbove { block, onto } => {
                write!(f, " {block} {onto}")?
            }
            Self::Unstack { block, from } => {
                write!(f, " {block}")?;
                if let Some(from) = from {
                    write!(f, " {from}")?;
                }
            }
            Self::Place { block, anchor, .. } => write!(f, " {block} {anchor}")?,
        }
        f.write_str(")")
    }
}

/// An ordered sequence of grounded actions, consumed front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    steps: VecDeque<GroundedAction>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> Option<&GroundedAction> {
        self.steps.front()
    }

    /// Remove and return the next action.
    pub fn next_step(&mut self) -> Option<GroundedAction> {
        self.steps.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundedAction> {
        self.steps.iter()
    }
}

impl FromIterator<GroundedAction> for Plan {
    fn from_iter<I: IntoIterator<Item = GroundedAction>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{step}")?;
        }
        Ok(())
    }
}
