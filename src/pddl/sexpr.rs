//! Minimal s-expression reader for PDDL fragments.
//!
//! Handles atoms, nested lists, and `;` line comments. Enough to read goal
//! conjunctions and problem files back; not a full PDDL grammar.

use crate::error::PddlError;
use crate::predicate::Predicate;

/// A parsed s-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(a) => Some(a),
            SExpr::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(items) => Some(items),
            SExpr::Atom(_) => None,
        }
    }

    /// The leading atom of a list, lowercased.
    pub fn head(&self) -> Option<String> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(SExpr::as_atom)
            .map(str::to_ascii_lowercase)
    }

    /// Interpret a flat `(name arg...)` list as a grounded predicate.
    pub fn to_predicate(&self, offset: usize) -> Result<Predicate, PddlError> {
        let items = self.as_list().ok_or_else(|| PddlError::Syntax {
            offset,
            message: "expected a predicate list".into(),
        })?;
        let mut atoms = Vec::with_capacity(items.len());
        for item in items {
            atoms.push(item.as_atom().ok_or_else(|| PddlError::Syntax {
                offset,
                message: "predicate arguments must be atoms".into(),
            })?);
        }
        let (name, args) = atoms.split_first().ok_or_else(|| PddlError::Syntax {
            offset,
            message: "empty predicate".into(),
        })?;
        Predicate::from_parts(name, args)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Open(usize),
    Close(usize),
    Atom(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                tokens.push(Token::Open(i));
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close(i));
                i += 1;
            }
            b';' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'(' | b')' | b';')
                {
                    i += 1;
                }
                tokens.push(Token::Atom(&input[start..i]));
            }
        }
    }
    tokens
}

/// Parse every top-level expression in `input`.
pub fn parse_all(input: &str) -> Result<Vec<SExpr>, PddlError> {
    let mut stack: Vec<(usize, Vec<SExpr>)> = Vec::new();
    let mut top = Vec::new();

    for token in tokenize(input) {
        match token {
            Token::Open(at) => stack.push((at, Vec::new())),
            Token::Close(at) => {
                let (_, items) = stack.pop().ok_or(PddlError::Syntax {
                    offset: at,
                    message: "unbalanced ')'".into(),
                })?;
                let list = SExpr::List(items);
                match stack.last_mut() {
                    Some((_, parent)) => parent.push(list),
                    None => top.push(list),
                }
            }
            Token::Atom(a) => {
                let atom = SExpr::Atom(a.to_string());
                match stack.last_mut() {
                    Some((_, parent)) => parent.push(atom),
                    None => top.push(atom),
                }
            }
        }
    }

    if let Some((at, _)) = stack.pop() {
        return Err(PddlError::Syntax {
            offset: at,
            message: "unclosed '('".into(),
        });
    }
    Ok(top)
}

/// Collect the grounded predicates of a conjunction.
///
/// Accepts `(and p...)`, a single predicate, or a bare sequence of predicates.
pub fn parse_conjunction(input: &str) -> Result<Vec<Predicate>, PddlError> {
    let exprs = parse_all(input)?;
    let mut out = Vec::new();
    for expr in &exprs {
        collect_conjuncts(expr, &mut out)?;
    }
    Ok(out)
}

pub(crate) fn collect_conjuncts(expr: &SExpr, out: &mut Vec<Predicate>) -> Result<(), PddlError> {
    if expr.head().as_deref() == Some("and") {
        for inner in expr.as_list().unwrap_or_default().iter().skip(1) {
            collect_conjuncts(inner, out)?;
        }
        Ok(())
    } else {
        out.push(expr.to_predicate(0)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_lists_and_skips_comments() {
        let exprs = parse_all("(a (b c) d) ; trailing\n(e)").unwrap();
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0].head().as_deref(), Some("a"));
        assert_eq!(exprs[0].as_list().unwrap()[1].as_list().unwrap().len(), 2);
    }

    #[test]
    fn reports_unbalanced_input() {
        assert!(matches!(parse_all("(a (b)"), Err(PddlError::Syntax { offset: 0, .. })));
        assert!(matches!(parse_all("a)"), Err(PddlError::Syntax { offset: 1, .. })));
    }

    #[test]
    fn conjunction_forms() {
        let a = parse_conjunction("(AND (on r g) (on b r))").unwrap();
        let b = parse_conjunction("(on r g) (on b r)").unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], Predicate::on("r", "g"));
        assert!(parse_conjunction("(and (on r))").is_err());
    }
}
