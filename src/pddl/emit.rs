//! Problem Emitter: World Model + goal → planner problem description.
//!
//! Writing is all-or-nothing. The text goes to a temporary file in the target
//! directory first and is renamed over the destination only once complete, so
//! a planner never observes a half-written problem.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EmitError;
use crate::goal::Goal;
use crate::predicate::WorldModel;
use crate::world::EntityId;

/// Naming used in the emitted problem header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PddlConfig {
    #[serde(default = "default_problem_name")]
    pub problem_name: String,
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    #[serde(default = "default_block_type")]
    pub block_type: String,
    #[serde(default = "default_slot_type")]
    pub slot_type: String,
}

fn default_problem_name() -> String {
    "blocks-problem".into()
}
fn default_domain_name() -> String {
    "BLOCKS".into()
}
fn default_block_type() -> String {
    "block".into()
}
fn default_slot_type() -> String {
    "slot".into()
}

impl Default for PddlConfig {
    fn default() -> Self {
        Self {
            problem_name: default_problem_name(),
            domain_name: default_domain_name(),
            block_type: default_block_type(),
            slot_type: default_slot_type(),
        }
    }
}

/// Serializes a [`WorldModel`] and a [`Goal`] into a PDDL problem.
#[derive(Debug, Clone, Default)]
pub struct ProblemEmitter {
    config: PddlConfig,
}

impl ProblemEmitter {
    pub fn new(config: PddlConfig) -> Self {
        Self { config }
    }

    /// Render the full problem text.
    ///
    /// Every block is declared as an object; slots are declared only when present.
    pub fn render<'a>(
        &self,
        model: &WorldModel,
        blocks: impl IntoIterator<Item = &'a EntityId>,
        slots: impl IntoIterator<Item = &'a EntityId>,
        goal: &Goal,
    ) -> String {
        let blocks = join(blocks);
        let slots = join(slots);

        let objects = [(blocks, &self.config.block_type), (slots, &self.config.slot_type)]
            .into_iter()
            .filter(|(ids, _)| !ids.is_empty())
            .map(|(ids, kind)| format!("{ids} - {kind}"))
            .collect::<Vec<_>>()
            .join(" ");

        let mut out = String::new();
        out.push_str(&format!("(define (problem {})\n", self.config.problem_name));
        out.push_str(&format!("(:domain {})\n", self.config.domain_name));
        out.push_str(&format!("(:objects {objects})\n"));
        out.push_str(&format!("(:init {model})\n"));
        out.push_str(&format!("(:goal {goal})\n"));
        out.push_str(")\n");
        out
    }

    /// Render and atomically write the problem to `path`.
    pub fn write<'a>(
        &self,
        path: &Path,
        model: &WorldModel,
        blocks: impl IntoIterator<Item = &'a EntityId>,
        slots: impl IntoIterator<Item = &'a EntityId>,
        goal: &Goal,
    ) -> Result<(), EmitError> {
        let text = self.render(model, blocks, slots, goal);
        write_atomic(path, text.as_bytes())?;
        tracing::debug!(path = %path.display(), facts = model.len(), "emitted problem description");
        Ok(())
    }
}

/// Write `bytes` to `path` through a temporary sibling file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EmitError> {
    let io_err = |source: std::io::Error| EmitError::Write {
        path: path.display().to_string(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn join<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> String {
    ids.into_iter()
        .map(EntityId::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::pddl::sexpr::{self, SExpr};
    use crate::predicate::Predicate;

    /// Read the `:init` facts and `:objects` back out of an emitted problem.
    fn read_problem(text: &str) -> (BTreeSet<Predicate>, Vec<String>) {
        let exprs = sexpr::parse_all(text).unwrap();
        let define = exprs[0].as_list().unwrap();
        let mut facts = BTreeSet::new();
        let mut objects = Vec::new();
        for section in define {
            match section.head().as_deref() {
                Some(":init") => {
                    for fact in &section.as_list().unwrap()[1..] {
                        facts.insert(fact.to_predicate(0).unwrap());
                    }
                }
                Some(":objects") => {
                    objects = section.as_list().unwrap()[1..]
                        .iter()
                        .filter_map(SExpr::as_atom)
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }
        (facts, objects)
    }

    fn sample_model() -> WorldModel {
        [
            Predicate::on_table("g"),
            Predicate::on("r", "g"),
            Predicate::clear("r"),
            Predicate::HandEmpty,
            Predicate::Empty { slot: "s1".into() },
            Predicate::Unused { block: "r".into() },
            Predicate::Unused { block: "g".into() },
            Predicate::GridEmpty,
        ]
        .into_iter()
        .collect()
    }

    fn ids(names: &[&str]) -> Vec<EntityId> {
        names.iter().map(|n| EntityId::from(*n)).collect()
    }

    #[test]
    fn rendered_problem_round_trips() {
        let model = sample_model();
        let goal = Goal::preset("rainbow").unwrap();
        let text = ProblemEmitter::default().render(&model, &ids(&["r", "g"]), &ids(&["s1"]), &goal);

        let (facts, objects) = read_problem(&text);
        let expected: BTreeSet<Predicate> = model.iter().cloned().collect();
        assert_eq!(facts, expected);
        assert_eq!(objects, ["r", "g", "-", "block", "s1", "-", "slot"]);
        assert!(text.contains("(:goal (and (on r g) (on b r) (on y b) (on m y)))"));
    }

    #[test]
    fn round_trip_is_independent_of_insertion_order() {
        let forward: Vec<Predicate> = sample_model().iter().cloned().collect();
        let backward: WorldModel = forward.iter().rev().cloned().collect();
        let goal = Goal::preset("tower").unwrap();
        let emitter = ProblemEmitter::default();
        let a = emitter.render(&sample_model(), &ids(&["r", "g"]), &[], &goal);
        let b = emitter.render(&backward, &ids(&["r", "g"]), &[], &goal);
        assert_eq!(read_problem(&a).0, read_problem(&b).0);
    }

    #[test]
    fn slots_are_not_declared_when_absent() {
        let goal = Goal::preset("tower").unwrap();
        let text = ProblemEmitter::default().render(&WorldModel::new(), &ids(&["r"]), &[], &goal);
        assert!(text.contains("(:objects r - block)\n"));
    }

    #[test]
    fn empty_object_groups_are_omitted() {
        let goal = Goal::preset("tower").unwrap();
        let text = ProblemEmitter::default().render(&WorldModel::new(), &[], &ids(&["s1"]), &goal);
        assert!(text.contains("(:objects s1 - slot)\n"));
        let (_, objects) = read_problem(&text);
        assert_eq!(objects, ["s1", "-", "slot"]);
    }

    #[test]
    fn write_replaces_target_atomically() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("problem.pddl");
        std::fs::write(&path, "stale").unwrap();

        let goal = Goal::preset("tower").unwrap();
        ProblemEmitter::default()
            .write(&path, &sample_model(), &ids(&["r", "g"]), &[], &goal)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("(define (problem blocks-problem)"));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn write_into_missing_directory_fails_without_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nope").join("problem.pddl");
        let goal = Goal::preset("tower").unwrap();
        let err = ProblemEmitter::default()
            .write(&path, &sample_model(), &ids(&["r"]), &[], &goal)
            .unwrap_err();
        assert!(matches!(err, EmitError::Write { .. }));
        assert!(!path.exists());
    }
}
