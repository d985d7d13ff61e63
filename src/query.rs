use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    And,
    Or,
    /// Adjacent patterns the parser did not join; not expected after parsing.
    Concat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Author,
    Committer,
    Message,
    Content,
    File,
    Lang,
    Before,
    After,
    Case,
    Repo,
    Type,
    #[serde(other)]
    Other,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Author => "author",
            Field::Committer => "committer",
            Field::Message => "message",
            Field::Content => "content",
            Field::File => "file",
            Field::Lang => "lang",
            Field::Before => "before",
            Field::After => "after",
            Field::Case => "case",
            Field::Repo => "repo",
            Field::Type => "type",
            Field::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    pub value: String,
    #[serde(default)]
    pub negated: bool,
    /// Set when the value is plain text rather than a regular expression.
    #[serde(default)]
    pub literal: bool,
}

impl Pattern {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: false,
            literal: true,
        }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: false,
            literal: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub field: Field,
    pub value: String,
    #[serde(default)]
    pub negated: bool,
}

impl Parameter {
    pub fn new(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            negated: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryNode {
    Operator {
        op: OperatorKind,
        operands: Vec<QueryNode>,
    },
    Pattern(Pattern),
    Parameter(Parameter),
}

impl QueryNode {
    pub fn and(operands: Vec<QueryNode>) -> Self {
        QueryNode::Operator {
            op: OperatorKind::And,
            operands,
        }
    }

    pub fn or(operands: Vec<QueryNode>) -> Self {
        QueryNode::Operator {
            op: OperatorKind::Or,
            operands,
        }
    }

    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a Parameter>) {
        match self {
            QueryNode::Operator { operands, .. } => {
                for node in operands {
                    node.collect_parameters(out);
                }
            }
            QueryNode::Parameter(p) => out.push(p),
            QueryNode::Pattern(_) => {}
        }
    }
}

impl From<Pattern> for QueryNode {
    fn from(p: Pattern) -> Self {
        QueryNode::Pattern(p)
    }
}

impl From<Parameter> for QueryNode {
    fn from(p: Parameter) -> Self {
        QueryNode::Parameter(p)
    }
}

/// A parsed search query. Produced upstream and never modified here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Query {
    pub nodes: Vec<QueryNode>,
}

impl Query {
    pub fn new(nodes: Vec<QueryNode>) -> Self {
        Self { nodes }
    }

    pub fn parameters(&self) -> Vec<&Parameter> {
        let mut out = Vec::new();
        for node in &self.nodes {
            node.collect_parameters(&mut out);
        }
        out
    }

    pub fn fields(&self) -> BTreeMap<Field, Vec<&Parameter>> {
        let mut fields: BTreeMap<Field, Vec<&Parameter>> = BTreeMap::new();
        for p in self.parameters() {
            fields.entry(p.field).or_default().push(p);
        }
        fields
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.parameters()
            .iter()
            .any(|p| p.field == Field::Case && p.value.eq_ignore_ascii_case("yes"))
    }

    pub fn has_time_filter(&self) -> bool {
        let fields = self.fields();
        fields.contains_key(&Field::Before) || fields.contains_key(&Field::After)
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Operator { op, operands } => {
                let sep = match op {
                    OperatorKind::And => " AND ",
                    OperatorKind::Or => " OR ",
                    OperatorKind::Concat => " ",
                };
                write!(f, "(")?;
                for (i, node) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", node)?;
                }
                write!(f, ")")
            }
            QueryNode::Pattern(p) => {
                if p.negated {
                    write!(f, "-")?;
                }
                if p.literal {
                    write!(f, "{:?}", p.value)
                } else {
                    write!(f, "/{}/", p.value)
                }
            }
            QueryNode::Parameter(p) => {
                if p.negated {
                    write!(f, "-")?;
                }
                write!(f, "{}:{:?}", p.field.as_str(), p.value)
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}
