//! Closed-loop runs of the execution controller against the kinematic sim.
//!
//! The planners here are small reactive stand-ins that look only at the
//! `:init` section of the emitted problem, so every cycle depends on the
//! previous cycle's motion having produced the expected geometry.

use tamp_bridge::config::BridgeConfig;
use tamp_bridge::controller::{ControllerState, ExecutionController, Stage};
use tamp_bridge::error::{ControllerError, PlannerError};
use tamp_bridge::goal::Goal;
use tamp_bridge::plan::GroundedAction;
use tamp_bridge::planner::{ExternalPlanner, PlanRequest, PlannerConfig, ScriptedPlanner};
use tamp_bridge::predicate::Predicate;
use tamp_bridge::robot::RobotInterface;
use tamp_bridge::scene::SceneLayout;
use tamp_bridge::sim::KinematicSim;

fn config_in(dir: &std::path::Path) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.controller.workdir = dir.to_path_buf();
    config.controller.max_cycles = Some(20);
    config
}

fn init_line(problem: &std::path::Path) -> String {
    std::fs::read_to_string(problem)
        .unwrap()
        .lines()
        .find(|l| l.starts_with("(:init"))
        .unwrap_or_default()
        .to_string()
}

#[test]
fn empty_plan_stops_before_any_motion() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = SceneLayout::preset("six-blocks", 2).unwrap();
    let sim = KinematicSim::new(&layout);
    let goal = Goal::preset("tower").unwrap();
    let mut controller = ExecutionController::new(
        sim,
        ScriptedPlanner::default(),
        layout,
        goal,
        &config_in(dir.path()),
    );

    let report = controller.run().unwrap();
    assert_eq!(controller.state(), ControllerState::Done);
    assert_eq!(report.steps_executed, 0);
    assert!(!report.goal_satisfied);
    assert_eq!(report.final_model.count("ontable"), 6);
    assert_eq!(controller.robot().ticks(), 0);
}

#[test]
fn reactive_planner_unstacks_the_top_block() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = SceneLayout::preset("stacked", 4).unwrap();
    let sim = KinematicSim::new(&layout);
    let goal = Goal::parse("(ontable c)").unwrap();

    let planner = |request: &PlanRequest| -> Result<String, PlannerError> {
        let init = init_line(&request.problem);
        let solution = if init.contains("(holding c)") {
            "(put-down c)\n"
        } else if init.contains("(ontable c)") {
            ""
        } else {
            "(unstack c m)\n(put-down c)\n"
        };
        Ok(solution.to_string())
    };

    let mut controller =
        ExecutionController::new(sim, planner, layout, goal, &config_in(dir.path()));
    let report = controller.run().unwrap();

    assert!(report.goal_satisfied);
    assert_eq!(report.steps_executed, 2);
    assert_eq!(report.cycles.len(), 3);
    assert!(matches!(
        report.cycles[0].action,
        Some(GroundedAction::Unstack { .. })
    ));
    assert_eq!(report.cycles[0].plan_len, 2);
    let model = &report.final_model;
    assert!(model.contains(&Predicate::clear("m")));
    assert!(model.contains(&Predicate::HandEmpty));
    assert_eq!(model.count("on"), 4);
    assert_eq!(model.count("ontable"), 2);
}

#[test]
fn scripted_plan_builds_a_pair() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = SceneLayout::preset("six-blocks", 8).unwrap();
    let sim = KinematicSim::new(&layout);
    let goal = Goal::parse("(on r g)").unwrap();
    let planner = ScriptedPlanner::new(["(pick-up r)\n(stack r g)\n", "(stack r g)\n"]);

    let mut controller =
        ExecutionController::new(sim, planner, layout, goal, &config_in(dir.path()));
    let report = controller.run().unwrap();

    assert!(report.goal_satisfied);
    assert_eq!(report.steps_executed, 2);
    assert_eq!(controller.planner().calls(), 3);
    assert!(report.final_model.contains(&Predicate::clear("r")));
    assert!(!report.final_model.contains(&Predicate::clear("g")));
    assert!(controller.robot().attached_block().is_none());
}

#[test]
fn missing_planner_binary_is_fatal_in_planning() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = SceneLayout::preset("six-blocks", 0).unwrap();
    let sim = KinematicSim::new(&layout);
    let config = config_in(dir.path());
    let planner = ExternalPlanner::new(&PlannerConfig {
        command: "/nonexistent/tamp-planner".into(),
        ..config.planner.clone()
    });
    let mut controller =
        ExecutionController::new(sim, planner, layout, Goal::preset("tower").unwrap(), &config);

    let err = controller.run().unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Planning));
    assert_eq!(controller.state(), ControllerState::Fatal);
    assert!(dir.path().join("problem.pddl").exists());
}

#[test]
fn cycle_limit_stops_a_planner_that_never_finishes() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = SceneLayout::preset("six-blocks", 3).unwrap();
    let sim = KinematicSim::new(&layout);
    let mut config = config_in(dir.path());
    config.controller.max_cycles = Some(4);

    // Alternates pick-up and put-down of the same block forever.
    let planner = |request: &PlanRequest| -> Result<String, PlannerError> {
        let init = init_line(&request.problem);
        Ok(if init.contains("(holding y)") {
            "(put-down y)".to_string()
        } else {
            "(pick-up y)".to_string()
        })
    };
    let mut controller =
        ExecutionController::new(sim, planner, layout, Goal::preset("tower").unwrap(), &config);

    let err = controller.run().unwrap_err();
    assert!(matches!(err, ControllerError::CycleLimit { max_cycles: 4 }));
    assert_eq!(controller.history().len(), 4);
    assert!(controller.robot().ticks() > 0);
}

#[cfg(unix)]
#[test]
fn external_planner_drives_the_loop() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = SceneLayout::preset("six-blocks", 6).unwrap();
    let sim = KinematicSim::new(&layout);
    let mut config = config_in(dir.path());

    // Positional parameters: $1 is the domain, $2 the problem.
    let script = r#"
        init=$(grep '^(:init' "$2")
        case "$init" in
            *"(holding r)"*) printf '(stack r g)\n' > "$2.soln" ;;
            *"(on r g)"*) : > "$2.soln" ;;
            *) printf '(pick-up r)\n(stack r g)\n' > "$2.soln" ;;
        esac
    "#;
    config.planner = PlannerConfig {
        command: "sh".into(),
        args: vec!["-c".into(), script.into(), "fake-planner".into()],
        ..PlannerConfig::default()
    };
    let planner = ExternalPlanner::new(&config.planner);
    let goal = Goal::parse("(on r g)").unwrap();
    let mut controller = ExecutionController::new(sim, planner, layout, goal, &config);

    let report = controller.run().unwrap();
    assert!(report.goal_satisfied);
    assert_eq!(report.steps_executed, 2);
    assert!(dir.path().join("actions.soln").exists());
    assert_eq!(std::fs::read_to_string(dir.path().join("actions.soln")).unwrap(), "");
}
