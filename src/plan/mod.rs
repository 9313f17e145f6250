//! Grounded actions, plans, and the solution-file parser.

pub mod action;
pub mod parser;

pub use action::{ActionKind, GroundedAction, Plan};
pub use parser::{parse_line, parse_plan};
