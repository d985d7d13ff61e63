use std::sync::Arc;
use std::time::Instant;

use pointer_history_protocol::{Predicate, RawCommitMatch, SearchRequest};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::SearchClient;
use crate::compile::to_predicate_tree;
use crate::config::LimitsSource;
use crate::error::SearchError;
use crate::identity::{UserStore, expand_usernames};
use crate::query::Query;
use crate::resolve::{RepoOptions, RepoPager, RepositoryRevisions, Resolved};
use crate::result::CommitMatch;
use crate::stream::{SearchEvent, Sender, Stats};

/// The collaborators a commit search talks to.
#[derive(Clone)]
pub struct Services {
    pub repos: Arc<dyn RepoPager>,
    pub backend: Arc<dyn SearchClient>,
    pub users: Arc<dyn UserStore>,
    pub limits: Arc<dyn LimitsSource>,
}

/// Searches commit messages or diffs across every repository the query
/// resolves to, one backend call per repository.
#[derive(Debug, Clone)]
pub struct CommitSearchJob {
    pub query: Predicate,
    pub repo_opts: RepoOptions,
    pub diff: bool,
    pub has_time_filter: bool,
    /// Per-repository result cap passed to the backend.
    pub limit: usize,
    pub max_concurrency: Option<usize>,
    pub is_required: bool,
}

impl CommitSearchJob {
    pub fn new(query: &Query, diff: bool, limit: usize) -> Self {
        Self {
            query: to_predicate_tree(query, diff),
            repo_opts: RepoOptions::from_query(query),
            diff,
            has_time_filter: query.has_time_filter(),
            limit,
            max_concurrency: None,
            is_required: false,
        }
    }

    pub fn with_max_concurrency(mut self, max: Option<usize>) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    pub fn name(&self) -> &'static str {
        if self.diff { "Diff" } else { "Commit" }
    }

    /// Whether a composite search must fail when this job fails.
    pub fn is_required(&self) -> bool {
        self.is_required
    }

    fn result_type(&self) -> &'static str {
        if self.diff { "diff" } else { "commit" }
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        stream: Arc<dyn Sender>,
        services: &Services,
    ) -> Result<(), SearchError> {
        let start = Instant::now();
        info!(
            stage = "search",
            event = "search.begin",
            kind = self.name(),
            query = %self.query,
            "starting commit search"
        );

        let result = self.run_inner(cancel, stream, services).await;
        match &result {
            Ok(limit_hit) => info!(
                stage = "search",
                event = "search.end",
                kind = self.name(),
                result = "ok",
                limit_hit,
                duration_ms = start.elapsed().as_millis(),
                "commit search completed"
            ),
            Err(err) => error!(
                stage = "search",
                event = "search.end",
                kind = self.name(),
                result = "fail",
                duration_ms = start.elapsed().as_millis(),
                error = %err,
                "commit search failed"
            ),
        }
        result.map(|_| ())
    }

    async fn run_inner(
        &self,
        cancel: &CancellationToken,
        stream: Arc<dyn Sender>,
        services: &Services,
    ) -> Result<bool, SearchError> {
        // Expansion rewrites leaves in place, so it works on a copy owned by this run.
        let mut query = self.query.clone();
        expand_usernames(&mut query, services.users.as_ref()).await?;

        let repo_revs = self.resolve_repos(services).await?;
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let scope = cancel.child_token();
        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();
        for repo_rev in repo_revs {
            if repo_rev.revs.is_empty() {
                debug!(repo = %repo_rev.repo, "no revisions resolved, skipping repo");
                continue;
            }

            let request = SearchRequest {
                repo: repo_rev.repo,
                revisions: repo_rev.revs,
                query: query.clone(),
                include_diff: self.diff,
                limit: self.limit,
            };
            tasks.spawn(search_repo(
                services.backend.clone(),
                stream.clone(),
                request,
                scope.clone(),
                semaphore.clone(),
            ));
        }

        let mut stats = Stats::default();
        let mut first_err = None;
        let mut cancelled = false;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|err| Err(SearchError::Join(err.to_string())));
            match outcome {
                Ok(is_limit_hit) => stats.update(&Stats { is_limit_hit }),
                Err(SearchError::Cancelled) => cancelled = true,
                Err(err) => {
                    scope.cancel();
                    first_err.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }
        if cancelled {
            return Err(SearchError::Cancelled);
        }

        stream.send(SearchEvent {
            results: Vec::new(),
            stats,
        });
        Ok(stats.is_limit_hit)
    }

    async fn resolve_repos(&self, services: &Services) -> Result<Vec<RepositoryRevisions>, SearchError> {
        let mut opts = self.repo_opts.clone();
        let max = *opts
            .limit
            .get_or_insert_with(|| services.limits.search_limits().repos_limit(self.has_time_filter));

        let start = Instant::now();
        let has_time_filter = self.has_time_filter;
        let result_type = self.result_type();
        let mut repo_revs = Vec::new();
        services
            .repos
            .paginate(&opts, &mut |page: Resolved| {
                if page.has_next {
                    return Err(SearchError::repos_limit(max, has_time_filter, result_type));
                }
                repo_revs = page.repo_revs;
                Ok(())
            })
            .await?;

        info!(
            stage = "resolve",
            event = "resolve.end",
            result = "ok",
            repo_count = repo_revs.len(),
            max_repos = max,
            duration_ms = start.elapsed().as_millis(),
            "resolved repositories"
        );
        Ok(repo_revs)
    }
}

async fn search_repo(
    backend: Arc<dyn SearchClient>,
    stream: Arc<dyn Sender>,
    request: SearchRequest,
    scope: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
) -> Result<bool, SearchError> {
    let _permit = match semaphore {
        Some(sem) => tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(SearchError::Cancelled),
            permit = sem.acquire_owned() => Some(permit.map_err(|err| SearchError::Join(err.to_string()))?),
        },
        None => None,
    };
    if scope.is_cancelled() {
        return Err(SearchError::Cancelled);
    }

    let start = Instant::now();
    let repo = request.repo.clone();
    let diff = request.include_diff;
    let mut match_count = 0usize;
    let mut on_matches = |batch: Vec<RawCommitMatch>| {
        match_count += batch.len();
        let results = batch
            .into_iter()
            .map(|m| CommitMatch::from_raw(&repo, diff, m))
            .collect();
        stream.send(SearchEvent {
            results,
            stats: Stats::default(),
        });
    };

    let outcome = tokio::select! {
        biased;
        _ = scope.cancelled() => Err(SearchError::Cancelled),
        res = backend.search(&request, &mut on_matches) => res.map_err(|source| SearchError::Remote {
            repo: repo.clone(),
            source,
        }),
    };

    match &outcome {
        Ok(limit_hit) => debug!(
            stage = "dispatch",
            event = "dispatch.end",
            repo = %repo,
            result = "ok",
            match_count,
            limit_hit,
            duration_ms = start.elapsed().as_millis(),
            "repository search completed"
        ),
        Err(SearchError::Cancelled) => debug!(
            stage = "dispatch",
            event = "dispatch.end",
            repo = %repo,
            result = "cancelled",
            match_count,
            duration_ms = start.elapsed().as_millis(),
            "repository search cancelled"
        ),
        Err(err) => {
            // Stop siblings before this task's permit is released.
            scope.cancel();
            error!(
                stage = "dispatch",
                event = "dispatch.end",
                repo = %repo,
                result = "fail",
                match_count,
                duration_ms = start.elapsed().as_millis(),
                error = %err,
                "repository search failed"
            );
        }
    }
    outcome
}
