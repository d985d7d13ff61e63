use chrono::{DateTime, Utc};
use pointer_history_protocol::{Matcher, Predicate};
use tracing::debug;

use crate::date::parse_git_date;
use crate::lang::lang_to_file_regex;
use crate::query::{Field, OperatorKind, Parameter, Pattern, Query, QueryNode};

/// Builds the predicate tree sent to history backends for `query`.
pub fn to_predicate_tree(query: &Query, diff: bool) -> Predicate {
    Predicate::and(compile(&query.nodes, query.is_case_sensitive(), diff)).reduce()
}

/// Translates query nodes into backend predicates.
///
/// Nodes that have no predicate equivalent (concatenations, and parameters
/// such as `repo:` or `case:` that are handled elsewhere) are dropped.
pub fn compile(nodes: &[QueryNode], case_sensitive: bool, diff: bool) -> Vec<Predicate> {
    compile_at(nodes, case_sensitive, diff, Utc::now())
}

fn compile_at(
    nodes: &[QueryNode],
    case_sensitive: bool,
    diff: bool,
    now: DateTime<Utc>,
) -> Vec<Predicate> {
    nodes
        .iter()
        .filter_map(|node| match node {
            QueryNode::Operator { op, operands } => {
                operator_to_predicate(*op, operands, case_sensitive, diff, now)
            }
            QueryNode::Pattern(p) => Some(pattern_to_predicate(p, case_sensitive, diff)),
            QueryNode::Parameter(p) => parameter_to_predicate(p, case_sensitive, diff, now),
        })
        .collect()
}

fn operator_to_predicate(
    op: OperatorKind,
    operands: &[QueryNode],
    case_sensitive: bool,
    diff: bool,
    now: DateTime<Utc>,
) -> Option<Predicate> {
    match op {
        OperatorKind::And => Some(Predicate::and(compile_at(
            operands,
            case_sensitive,
            diff,
            now,
        ))),
        OperatorKind::Or => Some(Predicate::or(compile_at(
            operands,
            case_sensitive,
            diff,
            now,
        ))),
        OperatorKind::Concat => {
            debug!(operand_count = operands.len(), "dropping concat node");
            None
        }
    }
}

fn pattern_to_predicate(pattern: &Pattern, case_sensitive: bool, diff: bool) -> Predicate {
    let expr = if pattern.literal {
        regex::escape(&pattern.value)
    } else {
        pattern.value.clone()
    };

    let matcher = Matcher::new(expr, !case_sensitive);
    let pred = if diff {
        Predicate::DiffMatches(matcher)
    } else {
        Predicate::MessageMatches(matcher)
    };

    if pattern.negated {
        Predicate::not(pred)
    } else {
        pred
    }
}

fn parameter_to_predicate(
    parameter: &Parameter,
    case_sensitive: bool,
    diff: bool,
    now: DateTime<Utc>,
) -> Option<Predicate> {
    let ignore_case = !case_sensitive;
    let matcher = || Matcher::new(parameter.value.clone(), ignore_case);

    let pred = match parameter.field {
        Field::Author => Predicate::AuthorMatches(matcher()),
        Field::Committer => Predicate::CommitterMatches(matcher()),
        Field::Before => Predicate::CommitBefore {
            time: parse_validated_date(&parameter.value, now),
        },
        Field::After => Predicate::CommitAfter {
            time: parse_validated_date(&parameter.value, now),
        },
        Field::Message => Predicate::MessageMatches(matcher()),
        Field::Content if diff => Predicate::DiffMatches(matcher()),
        Field::Content => Predicate::MessageMatches(matcher()),
        Field::File => Predicate::DiffModifiesFile(matcher()),
        Field::Lang => {
            Predicate::DiffModifiesFile(Matcher::new(lang_to_file_regex(&parameter.value), true))
        }
        Field::Case | Field::Repo | Field::Type | Field::Other => return None,
    };

    if parameter.negated {
        Some(Predicate::not(pred))
    } else {
        Some(pred)
    }
}

// Dates were validated by the parser; anything unparseable compares as the epoch.
fn parse_validated_date(value: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_git_date(value, now).unwrap_or_else(|err| {
        debug!(value, error = %err, "unparseable date filter, using epoch");
        DateTime::<Utc>::UNIX_EPOCH
    })
}
