use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A regular expression tested against one commit attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub expr: String,
    #[serde(default)]
    pub ignore_case: bool,
}

impl Matcher {
    pub fn new(expr: impl Into<String>, ignore_case: bool) -> Self {
        Self {
            expr: expr.into(),
            ignore_case,
        }
    }
}

/// Boolean expression over commit metadata and diffs, evaluated by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    And { children: Vec<Predicate> },
    Or { children: Vec<Predicate> },
    Not { child: Box<Predicate> },
    Boolean { value: bool },
    AuthorMatches(Matcher),
    CommitterMatches(Matcher),
    MessageMatches(Matcher),
    DiffMatches(Matcher),
    DiffModifiesFile(Matcher),
    CommitBefore { time: DateTime<Utc> },
    CommitAfter { time: DateTime<Utc> },
}

impl Predicate {
    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And { children }
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or { children }
    }

    pub fn not(child: Predicate) -> Self {
        Predicate::Not {
            child: Box::new(child),
        }
    }

    /// Simplifies the tree without changing what it matches.
    ///
    /// Nested operators of the same kind are flattened, identity elements are
    /// removed, single-child operators collapse into their child and double
    /// negations cancel out.
    pub fn reduce(self) -> Predicate {
        match self {
            Predicate::And { children } => {
                collapse(flatten(children, true), true, Predicate::and)
            }
            Predicate::Or { children } => {
                collapse(flatten(children, false), false, Predicate::or)
            }
            Predicate::Not { child } => match child.reduce() {
                Predicate::Not { child } => *child,
                Predicate::Boolean { value } => Predicate::Boolean { value: !value },
                other => Predicate::not(other),
            },
            leaf => leaf,
        }
    }

    /// Mutable references to every leaf, in pre-order.
    pub fn leaves_mut(&mut self) -> Vec<&mut Predicate> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a mut self, out: &mut Vec<&'a mut Predicate>) {
        match self {
            Predicate::And { children } | Predicate::Or { children } => {
                for child in children.iter_mut() {
                    child.collect_leaves(out);
                }
            }
            Predicate::Not { child } => child.collect_leaves(out),
            leaf => out.push(leaf),
        }
    }
}

fn flatten(children: Vec<Predicate>, is_and: bool) -> Vec<Predicate> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match (child.reduce(), is_and) {
            (Predicate::And { children }, true) | (Predicate::Or { children }, false) => {
                flat.extend(children)
            }
            (Predicate::Boolean { value }, _) if value == is_and => {}
            (other, _) => flat.push(other),
        }
    }
    flat
}

fn collapse(
    mut children: Vec<Predicate>,
    identity: bool,
    build: fn(Vec<Predicate>) -> Predicate,
) -> Predicate {
    match children.len() {
        0 => Predicate::Boolean { value: identity },
        1 => children.swap_remove(0),
        _ => build(children),
    }
}

fn write_matcher(f: &mut fmt::Formatter<'_>, name: &str, m: &Matcher) -> fmt::Result {
    if m.ignore_case {
        write!(f, "({name} {:?} i)", m.expr)
    } else {
        write!(f, "({name} {:?})", m.expr)
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, name: &str, children: &[Predicate]) -> fmt::Result {
    write!(f, "({name}")?;
    for child in children {
        write!(f, " {child}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::And { children } => write_children(f, "and", children),
            Predicate::Or { children } => write_children(f, "or", children),
            Predicate::Not { child } => write!(f, "(not {child})"),
            Predicate::Boolean { value } => write!(f, "{value}"),
            Predicate::AuthorMatches(m) => write_matcher(f, "author", m),
            Predicate::CommitterMatches(m) => write_matcher(f, "committer", m),
            Predicate::MessageMatches(m) => write_matcher(f, "message", m),
            Predicate::DiffMatches(m) => write_matcher(f, "diff", m),
            Predicate::DiffModifiesFile(m) => write_matcher(f, "file", m),
            Predicate::CommitBefore { time } => write!(f, "(before {})", time.to_rfc3339()),
            Predicate::CommitAfter { time } => write!(f, "(after {})", time.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn msg(expr: &str) -> Predicate {
        Predicate::MessageMatches(Matcher::new(expr, false))
    }

    #[test]
    fn reduce_flattens_nested_and() {
        let tree = Predicate::and(vec![
            msg("a"),
            Predicate::and(vec![msg("b"), Predicate::and(vec![msg("c")])]),
        ]);
        assert_eq!(
            tree.reduce(),
            Predicate::and(vec![msg("a"), msg("b"), msg("c")])
        );
    }

    #[test]
    fn reduce_collapses_single_child() {
        assert_eq!(Predicate::and(vec![msg("a")]).reduce(), msg("a"));
        assert_eq!(Predicate::or(vec![msg("a")]).reduce(), msg("a"));
    }

    #[test]
    fn reduce_handles_empty_operators() {
        assert_eq!(
            Predicate::and(vec![]).reduce(),
            Predicate::Boolean { value: true }
        );
        assert_eq!(
            Predicate::or(vec![]).reduce(),
            Predicate::Boolean { value: false }
        );
    }

    #[test]
    fn reduce_cancels_double_negation() {
        let tree = Predicate::not(Predicate::not(msg("a")));
        assert_eq!(tree.reduce(), msg("a"));
    }

    #[test]
    fn reduce_keeps_or_inside_and() {
        let tree = Predicate::and(vec![
            Predicate::or(vec![msg("a"), msg("b")]),
            Predicate::Boolean { value: true },
        ]);
        assert_eq!(tree.reduce(), Predicate::or(vec![msg("a"), msg("b")]));
    }

    #[test]
    fn leaves_mut_visits_each_leaf_once() {
        let mut tree = Predicate::and(vec![
            Predicate::AuthorMatches(Matcher::new("a", false)),
            Predicate::not(Predicate::CommitterMatches(Matcher::new("b", false))),
            Predicate::or(vec![msg("c"), msg("d")]),
        ]);
        for leaf in tree.leaves_mut() {
            if let Predicate::MessageMatches(m) = leaf {
                m.expr.push('!');
            }
        }
        assert_eq!(tree.leaves_mut().len(), 4);
        assert_eq!(
            tree.to_string(),
            r#"(and (author "a") (not (committer "b")) (or (message "c!") (message "d!")))"#
        );
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(Predicate::not(Predicate::DiffMatches(Matcher::new(
            "fo+", true,
        ))))
        .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "type": "not",
                "child": { "type": "diff_matches", "expr": "fo+", "ignore_case": true }
            })
        );
    }
}
