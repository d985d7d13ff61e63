use std::ops::Add;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A position in text. `offset` is in bytes from the start of the text,
/// `line` and `column` are zero-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl Add for Location {
    type Output = Location;

    fn add(self, rhs: Location) -> Location {
        Location {
            offset: self.offset + rhs.offset,
            line: self.line + rhs.line,
            column: self.column + rhs.column,
        }
    }
}

/// A half-open span `[start, end)` which may cross line boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Location,
    pub end: Location,
}

impl Range {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Moves both ends of the range by `delta`.
    pub fn shifted(&self, delta: Location) -> Range {
        Range {
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedString {
    pub content: String,
    #[serde(default)]
    pub matched_ranges: Vec<Range>,
}

/// A commit returned by a backend together with the spans that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommitMatch {
    pub oid: String,
    pub author: Signature,
    #[serde(default)]
    pub committer: Option<Signature>,
    #[serde(default)]
    pub parents: Vec<String>,
    pub message: MatchedString,
    #[serde(default)]
    pub diff: MatchedString,
}

/// One newline-delimited JSON frame of a streamed search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFrame {
    Matches(Vec<RawCommitMatch>),
    Done { limit_hit: bool },
    Error(String),
}
