use chrono::{DateTime, Utc};
use pointer_history_protocol::{Location, MatchedString, Range, RawCommitMatch, Signature};
use serde::{Deserialize, Serialize};

use crate::highlight::{HighlightedString, ranges_to_highlights};

const DIFF_FENCE: &str = "```diff\n";
const MESSAGE_FENCE: &str = "```COMMIT_EDITMSG\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSignature {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

impl From<Signature> for CommitSignature {
    fn from(sig: Signature) -> Self {
        Self {
            name: sig.name,
            email: sig.email,
            date: sig.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub author: CommitSignature,
    pub committer: Option<CommitSignature>,
    pub message: String,
    pub parents: Vec<String>,
}

/// A matching commit, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMatch {
    pub repo: String,
    pub commit: Commit,
    /// The matched message or diff wrapped in a fenced code block.
    pub body: HighlightedString,
    pub message_preview: Option<HighlightedString>,
    pub diff_preview: Option<HighlightedString>,
}

impl CommitMatch {
    pub fn from_raw(repo: &str, diff: bool, raw: RawCommitMatch) -> Self {
        let (body, message_preview, diff_preview) = if diff {
            let (body, preview) = fenced(DIFF_FENCE, &raw.diff);
            (body, None, Some(preview))
        } else {
            let (body, preview) = fenced(MESSAGE_FENCE, &raw.message);
            (body, Some(preview), None)
        };

        Self {
            repo: repo.to_string(),
            commit: Commit {
                id: raw.oid,
                author: raw.author.into(),
                committer: raw.committer.map(Into::into),
                message: raw.message.content,
                parents: raw.parents,
            },
            body,
            message_preview,
            diff_preview,
        }
    }
}

// The body gains one fence line, so ranges move down a line and forward by
// the fence length.
fn fenced(fence: &str, matched: &MatchedString) -> (HighlightedString, HighlightedString) {
    let value = format!("{fence}{}\n```", matched.content);
    let shift = Location::new(fence.len(), 1, 0);
    let shifted: Vec<Range> = matched
        .matched_ranges
        .iter()
        .map(|r| r.shifted(shift))
        .collect();

    let body = HighlightedString {
        highlights: ranges_to_highlights(&value, &shifted),
        value,
    };
    let preview = HighlightedString {
        value: matched.content.clone(),
        highlights: ranges_to_highlights(&matched.content, &matched.matched_ranges),
    };
    (body, preview)
}
