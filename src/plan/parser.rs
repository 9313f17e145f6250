//! Plan Parser: planner solution text → [`Plan`].
//!
//! Each line is tokenized on whitespace and parentheses with `;` comments
//! dropped. The first token naming a primitive selects the action and the
//! tokens right after it are its positional arguments. Lines without a
//! primitive are skipped.

use crate::error::PlanParseError;
use crate::plan::action::{ActionKind, GroundedAction, Plan};

/// Parse a whole solution into a plan.
pub fn parse_plan(text: &str) -> Result<Plan, PlanParseError> {
    let mut actions = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(action) = parse_line(idx + 1, line)? {
            actions.push(action);
        }
    }
    tracing::debug!(steps = actions.len(), "parsed plan");
    Ok(actions.into_iter().collect())
}

/// Parse one solution line. `line_no` is 1-based and only used for errors.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<GroundedAction>, PlanParseError> {
    let tokens = tokenize(line);
    let Some((pos, kind)) = tokens
        .iter()
        .enumerate()
        .find_map(|(i, t)| ActionKind::from_keyword(t).map(|k| (i, k)))
    else {
        return Ok(None);
    };

    let args = &tokens[pos + 1..];
    if args.len() < kind.arity() {
        return Err(PlanParseError::MalformedAction {
            line: line_no,
            keyword: kind.keyword(),
            expected: kind.arity(),
            found: args.len(),
        });
    }
    Ok(Some(GroundedAction::from_args(kind, args)))
}

fn tokenize(line: &str) -> Vec<&str> {
    let code = line.split(';').next().unwrap_or_default();
    code.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|t| !t.is_empty())
        .collect()
}
