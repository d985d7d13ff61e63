use anyhow::Context;
use async_trait::async_trait;
use pointer_history_protocol::RevisionSpecifier;
use regex::{Regex, RegexBuilder};

use crate::config::RepoConfig;
use crate::error::SearchError;
use crate::query::{Field, Query};

/// A repository and the revisions to search in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRevisions {
    pub repo: String,
    pub revs: Vec<RevisionSpecifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoOptions {
    /// Maximum repositories per page. `None` lets the search pick its cap.
    pub limit: Option<usize>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl RepoOptions {
    /// Collects `repo:` filters from the query; negated filters exclude.
    pub fn from_query(query: &Query) -> Self {
        let mut opts = RepoOptions::default();
        if let Some(params) = query.fields().get(&Field::Repo) {
            for p in params {
                if p.negated {
                    opts.exclude_patterns.push(p.value.clone());
                } else {
                    opts.include_patterns.push(p.value.clone());
                }
            }
        }
        opts
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub repo_revs: Vec<RepositoryRevisions>,
    /// More repositories exist beyond this page.
    pub has_next: bool,
}

pub type PageCallback<'a> = dyn FnMut(Resolved) -> Result<(), SearchError> + Send + 'a;

#[async_trait]
pub trait RepoPager: Send + Sync {
    /// Delivers matching repositories page by page until exhausted or until
    /// `on_page` returns an error, which is passed through unchanged.
    async fn paginate(&self, opts: &RepoOptions, on_page: &mut PageCallback<'_>) -> Result<(), SearchError>;
}

/// Resolves repositories from a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticRepoPager {
    repos: Vec<RepositoryRevisions>,
}

impl StaticRepoPager {
    pub fn new(repos: Vec<RepositoryRevisions>) -> Self {
        Self { repos }
    }

    pub fn from_config(repos: &[RepoConfig]) -> Self {
        Self::new(
            repos
                .iter()
                .map(|r| RepositoryRevisions {
                    repo: r.name.clone(),
                    revs: r.revisions.clone(),
                })
                .collect(),
        )
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, SearchError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid repo pattern '{p}'"))
                .map_err(SearchError::Resolve)
        })
        .collect()
}

#[async_trait]
impl RepoPager for StaticRepoPager {
    async fn paginate(&self, opts: &RepoOptions, on_page: &mut PageCallback<'_>) -> Result<(), SearchError> {
        let include = compile_patterns(&opts.include_patterns)?;
        let exclude = compile_patterns(&opts.exclude_patterns)?;

        let matching: Vec<RepositoryRevisions> = self
            .repos
            .iter()
            .filter(|r| include.iter().all(|re| re.is_match(&r.repo)))
            .filter(|r| !exclude.iter().any(|re| re.is_match(&r.repo)))
            .cloned()
            .collect();

        if matching.is_empty() {
            return on_page(Resolved::default());
        }

        let page_size = opts.limit.unwrap_or(matching.len()).max(1);
        let mut pages = matching.chunks(page_size).peekable();
        while let Some(page) = pages.next() {
            on_page(Resolved {
                repo_revs: page.to_vec(),
                has_next: pages.peek().is_some(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Parameter;

    fn repo(name: &str) -> RepositoryRevisions {
        RepositoryRevisions {
            repo: name.to_string(),
            revs: vec![RevisionSpecifier::rev("HEAD")],
        }
    }

    async fn collect_pages(pager: &StaticRepoPager, opts: &RepoOptions) -> Vec<(Vec<String>, bool)> {
        let mut pages = Vec::new();
        pager
            .paginate(opts, &mut |page: Resolved| {
                pages.push((
                    page.repo_revs.into_iter().map(|r| r.repo).collect(),
                    page.has_next,
                ));
                Ok(())
            })
            .await
            .expect("paginate");
        pages
    }

    #[test]
    fn repo_options_from_query_split_by_negation() {
        let query = Query::new(vec![
            Parameter::new(Field::Repo, "^github\\.com/").into(),
            Parameter::new(Field::Repo, "-archive$").negated().into(),
        ]);
        let opts = RepoOptions::from_query(&query);
        assert_eq!(opts.include_patterns, vec!["^github\\.com/".to_string()]);
        assert_eq!(opts.exclude_patterns, vec!["-archive$".to_string()]);
        assert_eq!(opts.limit, None);
    }

    #[tokio::test]
    async fn pages_by_limit_and_flags_next() {
        let pager = StaticRepoPager::new(vec![repo("a"), repo("b"), repo("c")]);
        let opts = RepoOptions {
            limit: Some(2),
            ..RepoOptions::default()
        };
        assert_eq!(
            collect_pages(&pager, &opts).await,
            vec![
                (vec!["a".to_string(), "b".to_string()], true),
                (vec!["c".to_string()], false),
            ]
        );
    }

    #[tokio::test]
    async fn filters_by_include_and_exclude() {
        let pager = StaticRepoPager::new(vec![
            repo("github.com/x/api"),
            repo("github.com/x/api-archive"),
            repo("gitlab.com/y/api"),
        ]);
        let opts = RepoOptions {
            limit: Some(10),
            include_patterns: vec!["^GITHUB".to_string()],
            exclude_patterns: vec!["archive".to_string()],
        };
        assert_eq!(
            collect_pages(&pager, &opts).await,
            vec![(vec!["github.com/x/api".to_string()], false)]
        );
    }

    #[tokio::test]
    async fn callback_error_stops_pagination() {
        let pager = StaticRepoPager::new(vec![repo("a"), repo("b"), repo("c")]);
        let opts = RepoOptions {
            limit: Some(1),
            ..RepoOptions::default()
        };
        let mut calls = 0;
        let err = pager
            .paginate(&opts, &mut |_page: Resolved| {
                calls += 1;
                Err(SearchError::Cancelled)
            })
            .await
            .expect_err("should stop");
        assert!(matches!(err, SearchError::Cancelled));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn zero_page_size_still_flags_next() {
        let pager = StaticRepoPager::new(vec![repo("a"), repo("b")]);
        let opts = RepoOptions {
            limit: Some(0),
            ..RepoOptions::default()
        };
        assert_eq!(
            collect_pages(&pager, &opts).await,
            vec![
                (vec!["a".to_string()], true),
                (vec!["b".to_string()], false),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_pattern_is_a_resolve_error() {
        let pager = StaticRepoPager::new(vec![repo("a")]);
        let opts = RepoOptions {
            include_patterns: vec!["(".to_string()],
            ..RepoOptions::default()
        };
        let err = pager
            .paginate(&opts, &mut |_page: Resolved| Ok(()))
            .await
            .expect_err("should fail");
        assert!(matches!(err, SearchError::Resolve(_)));
    }
}
