use thiserror::Error;

use crate::identity::IdentityError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{result_type} search covers too many repositories (max {max}); narrow the repo: filter")]
    RepoLimit { result_type: &'static str, max: usize },
    #[error(
        "{result_type} search with a date filter covers too many repositories (max {max}); narrow the repo: or date filter"
    )]
    TimeLimit { result_type: &'static str, max: usize },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("repository resolution failed: {0:#}")]
    Resolve(anyhow::Error),
    #[error("search failed for {repo}: {source:#}")]
    Remote {
        repo: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("search cancelled")]
    Cancelled,
    #[error("search worker failed: {0}")]
    Join(String),
}

impl SearchError {
    pub(crate) fn repos_limit(max: usize, has_time_filter: bool, result_type: &'static str) -> Self {
        if has_time_filter {
            SearchError::TimeLimit { result_type, max }
        } else {
            SearchError::RepoLimit { result_type, max }
        }
    }

    /// True for the errors raised when a search matches too many repositories.
    pub fn is_limit_error(&self) -> bool {
        matches!(self, SearchError::RepoLimit { .. } | SearchError::TimeLimit { .. })
    }
}
