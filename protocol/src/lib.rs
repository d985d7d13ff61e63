//! Wire types exchanged with per-repository history search backends.

pub mod matches;
pub mod predicate;
pub mod request;

pub use matches::{Location, MatchedString, Range, RawCommitMatch, SearchFrame, Signature};
pub use predicate::{Matcher, Predicate};
pub use request::{RevisionSpecifier, SearchRequest};
