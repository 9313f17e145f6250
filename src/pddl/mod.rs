//! PDDL problem emission and s-expression reading.

pub mod emit;
pub mod sexpr;

pub use emit::{PddlConfig, ProblemEmitter};
