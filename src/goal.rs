//! Goal specifications: conjunctions of target predicates.
//!
//! Goals are selected externally per scenario, either from a named preset or
//! from an s-expression such as `(and (on r g) (on b r))`. The emitter copies
//! the conjunction verbatim into the problem description.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GoalError;
use crate::pddl::sexpr;
use crate::predicate::{Predicate, WorldModel};

/// A named conjunction of target predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub conjuncts: Vec<Predicate>,
}

impl Goal {
    pub fn new(name: impl Into<String>, conjuncts: Vec<Predicate>) -> Result<Self, GoalError> {
        if conjuncts.is_empty() {
            return Err(GoalError::Empty);
        }
        Ok(Self {
            name: name.into(),
            conjuncts,
        })
    }

    /// Parse an explicit conjunction.
    pub fn parse(input: &str) -> Result<Self, GoalError> {
        let conjuncts = sexpr::parse_conjunction(input)?;
        Self::new("custom", conjuncts)
    }

    /// Named objectives used by the demo scenes.
    pub fn preset(name: &str) -> Result<Self, GoalError> {
        let pairs: &[(&str, &str)] = match name {
            // Two towers: y/m/c and r/g/b.
            "tower" => &[("g", "b"), ("r", "g"), ("m", "c"), ("y", "m")],
            // One five-block column on g.
            "rainbow" => &[("r", "g"), ("b", "r"), ("y", "b"), ("m", "y")],
            _ => {
                return Err(GoalError::UnknownPreset { name: name.into() });
            }
        };
        let conjuncts = pairs.iter().map(|(a, b)| Predicate::on(*a, *b)).collect();
        Self::new(name, conjuncts)
    }

    /// Resolve a CLI argument: a preset name, or otherwise an s-expression.
    pub fn resolve(spec: &str) -> Result<Self, GoalError> {
        if spec.trim_start().starts_with('(') {
            Self::parse(spec)
        } else {
            Self::preset(spec.trim())
        }
    }

    /// Whether every conjunct already holds in `model`.
    pub fn is_satisfied_by(&self, model: &WorldModel) -> bool {
        self.conjuncts.iter().all(|p| model.contains(p))
    }

    /// Conjuncts that do not hold yet.
    pub fn unmet<'a>(&'a self, model: &WorldModel) -> Vec<&'a Predicate> {
        self.conjuncts.iter().filter(|p| !model.contains(p)).collect()
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(and")?;
        for p in &self.conjuncts {
            write!(f, " {p}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_and_resolution() {
        let tower = Goal::resolve("tower").unwrap();
        assert_eq!(tower.conjuncts.len(), 4);
        assert_eq!(tower.conjuncts[0], Predicate::on("g", "b"));
        assert!(matches!(
            Goal::resolve("pyramid"),
            Err(GoalError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn parsed_goal_renders_as_conjunction() {
        let goal = Goal::resolve("(on r g) (on b r)").unwrap();
        assert_eq!(goal.to_string(), "(and (on r g) (on b r))");
        assert!(matches!(Goal::parse(""), Err(GoalError::Empty)));
    }

    #[test]
    fn satisfaction_against_model() {
        let goal = Goal::parse("(and (on r g))").unwrap();
        let mut model = WorldModel::new();
        assert!(!goal.is_satisfied_by(&model));
        assert_eq!(goal.unmet(&model).len(), 1);
        model.insert(Predicate::on("r", "g"));
        assert!(goal.is_satisfied_by(&model));
    }
}
