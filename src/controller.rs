//! Execution Controller: the closed perceive → plan → act loop.
//!
//! An explicit state machine:
//!
//! ```text
//! Idle → Abstract → Emit → Plan → Parse → ExecuteStep → Abstract …
//!                                      ↘ Done (empty plan)
//! any stage failure → Fatal
//! ```
//!
//! Only the first action of each plan is executed. After a fixed settle the
//! world is re-grounded and the planner is asked again, so execution drift is
//! absorbed by re-planning rather than by local recovery.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::abstraction::WorldAbstractor;
use crate::config::BridgeConfig;
use crate::error::{ControllerError, EmitError};
use crate::goal::Goal;
use crate::pddl::ProblemEmitter;
use crate::plan::{GroundedAction, Plan, parse_plan};
use crate::planner::{PlanRequest, Planner, SearchStrategy};
use crate::predicate::WorldModel;
use crate::primitives::MotionPrimitives;
use crate::robot::{RobotInterface, observe};
use crate::scene::SceneLayout;

// ---------------------------------------------------------------------------
// States and stages
// ---------------------------------------------------------------------------

/// Where the controller is in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerState {
    Idle,
    Abstract,
    Emit,
    Plan,
    Parse,
    ExecuteStep,
    Done,
    Fatal,
}

impl ControllerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Fatal)
    }
}

/// The pipeline stage a fatal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Abstraction,
    Emission,
    Planning,
    Parsing,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Abstraction => "abstraction",
            Self::Emission => "emission",
            Self::Planning => "planning",
            Self::Parsing => "parsing",
            Self::Execution => "execution",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Configuration and reporting
// ---------------------------------------------------------------------------

/// `[controller]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Engine ticks to hold after every executed action.
    pub post_step_settle: usize,
    /// Abort with `CycleLimit` after this many abstraction cycles.
    pub max_cycles: Option<usize>,
    /// Directory for the problem and plan files.
    pub workdir: PathBuf,
    pub problem_file: String,
    pub plan_file: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            post_step_settle: 100,
            max_cycles: None,
            workdir: PathBuf::from("."),
            problem_file: "problem.pddl".into(),
            plan_file: "actions.soln".into(),
        }
    }
}

impl ControllerConfig {
    pub fn problem_path(&self) -> PathBuf {
        self.workdir.join(&self.problem_file)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.workdir.join(&self.plan_file)
    }
}

/// What happened in one abstraction cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub cycle: usize,
    /// Number of grounded facts in the World Model.
    pub facts: usize,
    pub plan_len: usize,
    /// The action executed, or `None` when the plan was empty.
    pub action: Option<GroundedAction>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cycles: Vec<CycleRecord>,
    pub steps_executed: usize,
    /// World Model of the final cycle.
    pub final_model: WorldModel,
    /// Whether the final model satisfies the goal.
    pub goal_satisfied: bool,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the robot and the planner and sequences every stage.
pub struct ExecutionController<R, P> {
    robot: R,
    planner: P,
    layout: SceneLayout,
    goal: Goal,
    abstractor: WorldAbstractor,
    emitter: ProblemEmitter,
    primitives: MotionPrimitives,
    config: ControllerConfig,
    domain: PathBuf,
    strategy: SearchStrategy,

    state: ControllerState,
    cycle: usize,
    steps: usize,
    model: WorldModel,
    solution: String,
    plan: Plan,
    history: Vec<CycleRecord>,
}

impl<R: RobotInterface, P: Planner> ExecutionController<R, P> {
    pub fn new(robot: R, planner: P, layout: SceneLayout, goal: Goal, config: &BridgeConfig) -> Self {
        let primitives = MotionPrimitives::new(
            config.primitives.clone(),
            layout.block_ids().cloned().collect(),
        );
        let domain = config.planner.domain_for(layout.has_slots()).to_path_buf();
        Self {
            robot,
            planner,
            layout,
            goal,
            abstractor: WorldAbstractor::new(config.thresholds.clone(), config.abstraction.policy),
            emitter: ProblemEmitter::new(config.pddl.clone()),
            primitives,
            config: config.controller.clone(),
            domain,
            strategy: config.planner.strategy.clone(),
            state: ControllerState::Idle,
            cycle: 0,
            steps: 0,
            model: WorldModel::new(),
            solution: String::new(),
            plan: Plan::new(),
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// World Model of the latest abstraction cycle.
    pub fn model(&self) -> &WorldModel {
        &self.model
    }

    pub fn history(&self) -> &[CycleRecord] {
        &self.history
    }

    /// Give back the robot and planner.
    pub fn into_parts(self) -> (R, P) {
        (self.robot, self.planner)
    }

    /// Perform one state transition and return the new state.
    ///
    /// Terminal states are sticky. A stage failure moves to `Fatal` and is
    /// returned as the error.
    pub fn step(&mut self) -> Result<ControllerState, ControllerError> {
        let next = match self.state {
            ControllerState::Idle => Ok(ControllerState::Abstract),
            ControllerState::Abstract => self.abstract_world(),
            ControllerState::Emit => self.emit(),
            ControllerState::Plan => self.plan(),
            ControllerState::Parse => self.parse(),
            ControllerState::ExecuteStep => self.execute(),
            terminal @ (ControllerState::Done | ControllerState::Fatal) => Ok(terminal),
        };
        match next {
            Ok(state) => {
                if state != self.state {
                    tracing::debug!(cycle = self.cycle, from = ?self.state, to = ?state, "controller transition");
                }
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                tracing::error!(cycle = self.cycle, stage = ?e.stage(), error = %e, "controller halted");
                self.state = ControllerState::Fatal;
                Err(e)
            }
        }
    }

    /// Drive the loop until the plan runs dry or a stage fails.
    pub fn run(&mut self) -> Result<RunReport, ControllerError> {
        while !self.step()?.is_terminal() {}
        let goal_satisfied = self.goal.is_satisfied_by(&self.model);
        tracing::info!(
            cycles = self.cycle,
            steps = self.steps,
            goal_satisfied,
            "run finished"
        );
        Ok(RunReport {
            cycles: self.history.clone(),
            steps_executed: self.steps,
            final_model: self.model.clone(),
            goal_satisfied,
        })
    }

    fn abstract_world(&mut self) -> Result<ControllerState, ControllerError> {
        if let Some(max_cycles) = self.config.max_cycles {
            if self.cycle >= max_cycles {
                return Err(ControllerError::CycleLimit { max_cycles });
            }
        }
        self.cycle += 1;

        let (snapshot, observation) = observe(&self.robot, &self.layout)
            .map_err(|e| ControllerError::fatal(Stage::Abstraction, e))?;
        self.model = self
            .abstractor
            .abstract_world(&snapshot, &observation)
            .map_err(|e| ControllerError::fatal(Stage::Abstraction, e))?;
        tracing::info!(cycle = self.cycle, facts = self.model.len(), "world abstracted");
        Ok(ControllerState::Emit)
    }

    fn emit(&mut self) -> Result<ControllerState, ControllerError> {
        let path = self.config.problem_path();
        self.emitter
            .write(
                &path,
                &self.model,
                self.layout.block_ids(),
                self.layout.slot_ids(),
                &self.goal,
            )
            .map_err(|e| ControllerError::fatal(Stage::Emission, e))?;
        if !path.exists() {
            return Err(ControllerError::fatal(
                Stage::Emission,
                EmitError::MissingArtifact {
                    path: path.display().to_string(),
                },
            ));
        }
        Ok(ControllerState::Plan)
    }

    fn plan(&mut self) -> Result<ControllerState, ControllerError> {
        let request = PlanRequest {
            domain: self.domain.clone(),
            problem: self.config.problem_path(),
            plan_file: self.config.plan_path(),
            strategy: self.strategy.clone(),
        };
        self.solution = self
            .planner
            .solve(&request)
            .map_err(|e| ControllerError::fatal(Stage::Planning, e))?;
        Ok(ControllerState::Parse)
    }

    fn parse(&mut self) -> Result<ControllerState, ControllerError> {
        self.plan = parse_plan(&self.solution).map_err(|e| ControllerError::fatal(Stage::Parsing, e))?;
        tracing::info!(cycle = self.cycle, plan_len = self.plan.len(), "plan parsed");
        if self.plan.is_empty() {
            self.history.push(CycleRecord {
                cycle: self.cycle,
                facts: self.model.len(),
                plan_len: 0,
                action: None,
            });
            return Ok(ControllerState::Done);
        }
        Ok(ControllerState::ExecuteStep)
    }

    fn execute(&mut self) -> Result<ControllerState, ControllerError> {
        let plan_len = self.plan.len();
        // The rest of the plan is discarded; the next cycle re-plans.
        let plan = std::mem::take(&mut self.plan);
        let Some(action) = plan.first().cloned() else {
            return Ok(ControllerState::Done);
        };

        self.primitives
            .execute(&mut self.robot, &action)
            .map_err(|e| ControllerError::fatal(Stage::Execution, e))?;
        self.robot.step(self.config.post_step_settle);
        self.steps += 1;

        self.history.push(CycleRecord {
            cycle: self.cycle,
            facts: self.model.len(),
            plan_len,
            action: Some(action),
        });
        Ok(ControllerState::Abstract)
    }
}
