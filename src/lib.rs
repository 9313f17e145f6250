//! # tamp-bridge
//!
//! Closed-loop task and motion planning for tabletop block manipulation.
//!
//! Each cycle grounds the continuous scene into a set of symbolic predicates,
//! writes a PDDL problem, asks an external planner for a solution, executes
//! only the first action through parameterized motion primitives, and
//! re-grounds. Drift between the symbolic and the physical state is absorbed by
//! re-planning, never by local recovery.
//!
//! ## Architecture
//!
//! - **Abstraction** (`abstraction`, `predicate`): proximity tests → World Model
//! - **Emission** (`pddl`, `goal`): World Model + goal → problem file
//! - **Planning** (`planner`, `plan`): subprocess planner, solution parser
//! - **Execution** (`primitives`, `robot`, `sim`): primitives over a narrow robot trait
//! - **Control** (`controller`): the state machine tying the stages together
//!
//! ## Library usage
//!
//! ```no_run
//! use tamp_bridge::config::BridgeConfig;
//! use tamp_bridge::controller::ExecutionController;
//! use tamp_bridge::goal::Goal;
//! use tamp_bridge::planner::ExternalPlanner;
//! use tamp_bridge::scene::SceneLayout;
//! use tamp_bridge::sim::KinematicSim;
//!
//! let config = BridgeConfig::default();
//! let layout = SceneLayout::preset("six-blocks", 7).unwrap();
//! let robot = KinematicSim::new(&layout);
//! let planner = ExternalPlanner::new(&config.planner);
//! let goal = Goal::preset("tower").unwrap();
//! let mut controller = ExecutionController::new(robot, planner, layout, goal, &config);
//! let report = controller.run().unwrap();
//! println!("{} steps", report.steps_executed);
//! ```

pub mod abstraction;
pub mod config;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod goal;
pub mod pddl;
pub mod plan;
pub mod planner;
pub mod predicate;
pub mod primitives;
pub mod robot;
pub mod scene;
pub mod sim;
pub mod world;

pub use error::{TampError, TampResult};
