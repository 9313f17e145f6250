//! Rich diagnostic error types for the tamp-bridge pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so the failing stage of the
//! perceive → plan → act loop is visible to the operator.

use miette::Diagnostic;
use thiserror::Error;

use crate::controller::Stage;

/// Top-level error type for tamp-bridge.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TampError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Abstraction(#[from] AbstractionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pddl(#[from] PddlError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Goal(#[from] GoalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    PlanParse(#[from] PlanParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Robot(#[from] RobotError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Primitive(#[from] PrimitiveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Controller(#[from] ControllerError),
}

// ---------------------------------------------------------------------------
// Abstraction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AbstractionError {
    #[error("grounding ambiguity: block {block} matches several supports ({supports})")]
    #[diagnostic(
        code(tamp::abstraction::ambiguous_support),
        help(
            "More than one block lies within the stacking tolerance below this block. \
             Tighten `thresholds.xy` / `thresholds.stack`, or switch \
             `abstraction.policy` to \"first-match\" to accept the first candidate."
        )
    )]
    AmbiguousSupport { block: String, supports: String },

    #[error("grounding ambiguity: blocks {blocks} all rest on {support}")]
    #[diagnostic(
        code(tamp::abstraction::shared_support),
        help(
            "A block can carry at most one block directly on top of it. \
             The horizontal tolerance is probably wider than a block footprint."
        )
    )]
    SharedSupport { support: String, blocks: String },

    #[error("grounding ambiguity: block {block} has conflicting supports ({predicates})")]
    #[diagnostic(
        code(tamp::abstraction::conflicting_support),
        help(
            "Exactly one of ontable / on / holding must hold for every block. \
             Check that the holding offset and the table height tolerance do not overlap."
        )
    )]
    ConflictingSupport { block: String, predicates: String },
}

// ---------------------------------------------------------------------------
// PDDL syntax errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PddlError {
    #[error("s-expression syntax error at byte {offset}: {message}")]
    #[diagnostic(
        code(tamp::pddl::syntax),
        help("Check for balanced parentheses and that every atom is a plain token.")
    )]
    Syntax { offset: usize, message: String },

    #[error("unknown predicate \"{name}\"")]
    #[diagnostic(
        code(tamp::pddl::unknown_predicate),
        help(
            "Known predicates: ontable, on, clear, holding, handempty, filled, \
             empty, in, unused, gridempty."
        )
    )]
    UnknownPredicate { name: String },

    #[error("predicate \"{name}\" takes {expected} argument(s), got {found}")]
    #[diagnostic(
        code(tamp::pddl::arity),
        help("Each grounded predicate needs exactly as many entity ids as its arity.")
    )]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// Goal errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GoalError {
    #[error("unknown goal preset \"{name}\"")]
    #[diagnostic(
        code(tamp::goal::unknown_preset),
        help("Available presets: tower, rainbow. Or pass an explicit conjunction like \"(on r g) (on b r)\".")
    )]
    UnknownPreset { name: String },

    #[error("goal conjunction is empty")]
    #[diagnostic(
        code(tamp::goal::empty),
        help("Provide at least one target predicate, e.g. \"(on r g)\".")
    )]
    Empty,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pddl(#[from] PddlError),
}

// ---------------------------------------------------------------------------
// Emission errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    #[error("failed to write problem description: {path}")]
    #[diagnostic(
        code(tamp::emit::write),
        help(
            "The problem file could not be written atomically. Check that the \
             working directory exists and is writable."
        )
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("problem description missing after emission: {path}")]
    #[diagnostic(
        code(tamp::emit::missing_artifact),
        help(
            "The emitter reported success but no problem file is present. \
             Something removed it before the planner could read it."
        )
    )]
    MissingArtifact { path: String },
}

// ---------------------------------------------------------------------------
// Planner errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlannerError {
    #[error("failed to spawn planner \"{command}\"")]
    #[diagnostic(
        code(tamp::planner::spawn),
        help("Check that the planner binary is installed and on PATH (`planner.command`).")
    )]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("planner \"{command}\" failed ({status}): {diagnostic}")]
    #[diagnostic(
        code(tamp::planner::failed),
        help(
            "The planner rejected the problem or could not solve it. \
             Inspect the emitted problem file and the domain for mismatched predicates."
        )
    )]
    Failed {
        command: String,
        status: String,
        diagnostic: String,
    },

    #[error("planner produced no solution file: {path}")]
    #[diagnostic(
        code(tamp::planner::missing_artifact),
        help(
            "The planner exited without writing a solution. This usually means the \
             goal is unreachable from the current state."
        )
    )]
    MissingArtifact { path: String },

    #[error("failed to read plan artifact: {path}")]
    #[diagnostic(
        code(tamp::planner::read),
        help("Check file permissions in the working directory.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Plan parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlanParseError {
    #[error("line {line}: {keyword} expects {expected} argument(s), found {found}")]
    #[diagnostic(
        code(tamp::plan::malformed_action),
        help("Each plan line must carry the primitive's arguments right after its name, e.g. \"(stack r g)\".")
    )]
    MalformedAction {
        line: usize,
        keyword: String,
        expected: usize,
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// Robot errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RobotError {
    #[error("entity not found: {id}")]
    #[diagnostic(
        code(tamp::robot::unknown_entity),
        help("The plan or scene refers to an entity the engine does not know about.")
    )]
    UnknownEntity { id: String },

    #[error("inverse kinematics failed: {message}")]
    #[diagnostic(
        code(tamp::robot::ik),
        help("The target pose is outside the reachable workspace of the arm.")
    )]
    InverseKinematics { message: String },

    #[error("path planning failed: {message}")]
    #[diagnostic(
        code(tamp::robot::path),
        help("No collision-free path to the goal configuration was found.")
    )]
    PathPlanning { message: String },
}

// ---------------------------------------------------------------------------
// Primitive errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PrimitiveError {
    #[error("no free table position for {block} after {attempts} samples")]
    #[diagnostic(
        code(tamp::primitive::sampling_exhausted),
        help(
            "The put-down region is too crowded for the configured clearance. \
             Lower `primitives.min_clearance`, enlarge the region, or raise \
             `primitives.sampling`."
        )
    )]
    SamplingExhausted { block: String, attempts: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Robot(#[from] RobotError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(tamp::config::read),
        help("Ensure the config file exists and is valid TOML. `tamp config init` writes a default one.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(tamp::config::parse),
        help("Check the TOML syntax and field names against `tamp config show`.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(tamp::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for {field}: {message}")]
    #[diagnostic(
        code(tamp::config::invalid),
        help("Tolerances and step counts must be finite and strictly positive.")
    )]
    Invalid { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Scene errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SceneError {
    #[error("unknown scene preset \"{name}\"")]
    #[diagnostic(
        code(tamp::scene::unknown_preset),
        help("Available presets: six-blocks, stacked, special-1, special-2. Or pass a TOML scene file.")
    )]
    UnknownPreset { name: String },

    #[error("failed to read scene file: {path}")]
    #[diagnostic(code(tamp::scene::read), help("Check that the scene file exists."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scene file: {path}: {message}")]
    #[diagnostic(
        code(tamp::scene::parse),
        help("A scene file lists [[blocks]] with id/position and [[slots]] with id/position.")
    )]
    Parse { path: String, message: String },

    #[error("duplicate entity id \"{id}\" in scene")]
    #[diagnostic(
        code(tamp::scene::duplicate_id),
        help("Block and slot ids share one namespace and must be unique.")
    )]
    DuplicateId { id: String },

    #[error("scene has no blocks")]
    #[diagnostic(
        code(tamp::scene::no_blocks),
        help("A planning problem needs at least one [[blocks]] entry.")
    )]
    NoBlocks,
}

// ---------------------------------------------------------------------------
// Controller errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ControllerError {
    #[error("{stage} stage failed: {source}")]
    #[diagnostic(
        code(tamp::controller::fatal),
        help(
            "The closed loop halted. No automatic recovery is attempted; \
             fix the underlying cause and rerun from the current scene."
        )
    )]
    Fatal {
        stage: Stage,
        #[source]
        source: Box<TampError>,
    },

    #[error("cycle limit reached: {max_cycles}")]
    #[diagnostic(
        code(tamp::controller::cycle_limit),
        help(
            "The goal was not reached within the configured number of re-planning \
             cycles. Raise `controller.max_cycles` or remove the limit."
        )
    )]
    CycleLimit { max_cycles: usize },
}

impl ControllerError {
    /// Wrap any subsystem error as a fatal failure of `stage`.
    pub fn fatal(stage: Stage, source: impl Into<TampError>) -> Self {
        Self::Fatal {
            stage,
            source: Box::new(source.into()),
        }
    }

    /// The stage that failed, if this is a fatal stage error.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Fatal { stage, .. } => Some(*stage),
            Self::CycleLimit { .. } => None,
        }
    }
}

/// Convenience alias for tamp-bridge operations.
pub type TampResult<T> = std::result::Result<T, TampError>;
