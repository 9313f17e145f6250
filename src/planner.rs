//! Planning collaborator: problem description in, solution text out.
//!
//! [`ExternalPlanner`] drives a pyperplan-compatible binary directly (no shell)
//! and blocks until it exits. There is no timeout.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// Search algorithm and heuristic passed to the planner, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heuristic: Option<String>,
}

/// One planning call.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub domain: PathBuf,
    pub problem: PathBuf,
    /// Where the solution is persisted.
    pub plan_file: PathBuf,
    pub strategy: SearchStrategy,
}

/// Anything that can turn a problem description into solution text.
pub trait Planner: Send {
    fn solve(&mut self, request: &PlanRequest) -> Result<String, PlannerError>;
}

impl<F> Planner for F
where
    F: FnMut(&PlanRequest) -> Result<String, PlannerError> + Send,
{
    fn solve(&mut self, request: &PlanRequest) -> Result<String, PlannerError> {
        self(request)
    }
}

fn default_command() -> String {
    "pyperplan".into()
}

fn default_domain() -> PathBuf {
    PathBuf::from("domains/blocks.pddl")
}

fn default_slot_domain() -> PathBuf {
    PathBuf::from("domains/blocks-grid.pddl")
}

/// `[planner]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_command")]
    pub command: String,
    /// Extra arguments placed before the search flags.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub strategy: SearchStrategy,
    /// Planning domain file for scenes without slots.
    #[serde(default = "default_domain")]
    pub domain: PathBuf,
    /// Planning domain file for scenes with a slot grid.
    #[serde(default = "default_slot_domain")]
    pub slot_domain: PathBuf,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            strategy: SearchStrategy::default(),
            domain: default_domain(),
            slot_domain: default_slot_domain(),
        }
    }
}

impl PlannerConfig {
    /// The domain that declares every type and predicate a scene emits.
    pub fn domain_for(&self, has_slots: bool) -> &Path {
        if has_slots {
            &self.slot_domain
        } else {
            &self.domain
        }
    }
}

/// Runs `<command> [args] [-s search] [-H heuristic] <domain> <problem>` and
/// collects `<problem>.soln`.
#[derive(Debug, Clone)]
pub struct ExternalPlanner {
    command: String,
    args: Vec<String>,
}

impl ExternalPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    fn build_args(&self, request: &PlanRequest) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(search) = &request.strategy.search {
            args.push("-s".into());
            args.push(search.clone());
        }
        if let Some(heuristic) = &request.strategy.heuristic {
            args.push("-H".into());
            args.push(heuristic.clone());
        }
        args.push(request.domain.display().to_string());
        args.push(request.problem.display().to_string());
        args
    }
}

/// The file a pyperplan-style planner writes next to the problem.
pub fn solution_path(problem: &Path) -> PathBuf {
    let mut name = problem.as_os_str().to_owned();
    name.push(".soln");
    PathBuf::from(name)
}

impl Planner for ExternalPlanner {
    fn solve(&mut self, request: &PlanRequest) -> Result<String, PlannerError> {
        let args = self.build_args(request);
        tracing::info!(command = %self.command, args = %args.join(" "), "invoking planner");

        // A planner that finds no solution exits 0 without writing one.
        let produced = solution_path(&request.problem);
        match std::fs::remove_file(&produced) {
            Ok(()) => tracing::debug!(path = %produced.display(), "removed stale solution"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PlannerError::Read {
                    path: produced.display().to_string(),
                    source: e,
                });
            }
        }

        let output = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PlannerError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let diagnostic = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(PlannerError::Failed {
                command: self.command.clone(),
                status: output.status.to_string(),
                diagnostic,
            });
        }

        if !produced.exists() {
            return Err(PlannerError::MissingArtifact {
                path: produced.display().to_string(),
            });
        }
        if produced != request.plan_file {
            std::fs::rename(&produced, &request.plan_file).map_err(|e| PlannerError::Read {
                path: produced.display().to_string(),
                source: e,
            })?;
        }
        let text = std::fs::read_to_string(&request.plan_file).map_err(|e| PlannerError::Read {
            path: request.plan_file.display().to_string(),
            source: e,
        })?;
        tracing::debug!(plan_file = %request.plan_file.display(), lines = text.lines().count(), "planner finished");
        Ok(text)
    }
}

/// Replays canned solutions in order, then empty solutions.
///
/// Useful for driving the controller without a planner binary.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPlanner {
    solutions: VecDeque<String>,
    calls: usize,
}

impl ScriptedPlanner {
    pub fn new<I, S>(solutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            solutions: solutions.into_iter().map(Into::into).collect(),
            calls: 0,
        }
    }

    /// Number of `solve` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Planner for ScriptedPlanner {
    fn solve(&mut self, _request: &PlanRequest) -> Result<String, PlannerError> {
        self.calls += 1;
        Ok(self.solutions.pop_front().unwrap_or_default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request(dir: &Path) -> PlanRequest {
        let problem = dir.join("problem.pddl");
        std::fs::write(&problem, "(define (problem p))").unwrap();
        PlanRequest {
            domain: dir.join("domain.pddl"),
            problem,
            plan_file: dir.join("actions.soln"),
            strategy: SearchStrategy::default(),
        }
    }

    fn shell(script: &str) -> ExternalPlanner {
        ExternalPlanner::new(&PlannerConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into(), "fake-planner".into()],
            ..PlannerConfig::default()
        })
    }

    #[test]
    fn solution_is_moved_to_plan_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let req = request(dir.path());
        let mut planner = shell("printf '(pick-up r)\\n(stack r g)\\n' > \"$2.soln\"");
        let text = planner.solve(&req).unwrap();
        assert_eq!(text, "(pick-up r)\n(stack r g)\n");
        assert!(req.plan_file.exists());
        assert!(!solution_path(&req.problem).exists());
    }

    #[test]
    fn search_flags_precede_positional_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut req = request(dir.path());
        req.strategy = SearchStrategy {
            search: Some("gbf".into()),
            heuristic: Some("hff".into()),
        };
        let args = shell("true").build_args(&req);
        let tail: Vec<&str> = args.iter().skip(3).map(String::as_str).collect();
        assert_eq!(tail[..4], ["-s", "gbf", "-H", "hff"]);
        assert!(tail[5].ends_with("problem.pddl"));
    }

    #[test]
    fn failure_carries_diagnostic() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = shell("echo 'goal unreachable' >&2; exit 3")
            .solve(&request(dir.path()))
            .unwrap_err();
        match err {
            PlannerError::Failed { diagnostic, .. } => assert_eq!(diagnostic, "goal unreachable"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_solution_and_missing_binary() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = shell("true").solve(&request(dir.path())).unwrap_err();
        assert!(matches!(err, PlannerError::MissingArtifact { .. }));

        let mut absent = ExternalPlanner::new(&PlannerConfig {
            command: "/nonexistent/tamp-planner".into(),
            ..PlannerConfig::default()
        });
        assert!(matches!(
            absent.solve(&request(dir.path())),
            Err(PlannerError::Spawn { .. })
        ));
    }

    #[test]
    fn stale_solution_is_not_reused() {
        let dir = tempfile::TempDir::new().unwrap();
        let req = request(dir.path());
        std::fs::write(solution_path(&req.problem), "(pick-up r)\n").unwrap();

        let err = shell("true").solve(&req).unwrap_err();
        assert!(matches!(err, PlannerError::MissingArtifact { .. }));
        assert!(!solution_path(&req.problem).exists());
    }

    #[test]
    fn solution_in_place_when_plan_file_is_the_soln() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut req = request(dir.path());
        req.plan_file = solution_path(&req.problem);
        std::fs::write(&req.plan_file, "(pick-up r)\n").unwrap();

        let mut planner = shell("printf '(put-down r)\\n' > \"$2.soln\"");
        assert_eq!(planner.solve(&req).unwrap(), "(put-down r)\n");
        assert!(matches!(
            shell("true").solve(&req),
            Err(PlannerError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn scripted_planner_runs_dry() {
        let dir = tempfile::TempDir::new().unwrap();
        let req = request(dir.path());
        let mut planner = ScriptedPlanner::new(["(pick-up r)"]);
        assert_eq!(planner.solve(&req).unwrap(), "(pick-up r)");
        assert_eq!(planner.solve(&req).unwrap(), "");
        assert_eq!(planner.calls(), 2);
    }
}
