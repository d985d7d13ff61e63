use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use glob::Pattern;
use humantime::parse_duration;
use pointer_history_protocol::RevisionSpecifier;
use serde::Deserialize;
use tracing::warn;

use crate::identity::UserEmail;

const DEFAULT_COMMIT_DIFF_MAX_REPOS: usize = 50;
const DEFAULT_COMMIT_DIFF_WITH_TIME_FILTER_MAX_REPOS: usize = 10_000;
const DEFAULT_RESULT_LIMIT: usize = 500;
const DEFAULT_REQUEST_TIMEOUT: &str = "60s";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub limits: SearchLimits,
    pub search: SearchConfig,
    pub repos: Vec<RepoConfig>,
    pub users: Vec<UserConfig>,
}

/// Caps on how many repositories one commit or diff search may cover.
///
/// Unfiltered searches default to the smaller cap (50). A `before:`/`after:`
/// filter bounds the work per repository, so those default to 10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub commit_diff_max_repos: usize,
    pub commit_diff_with_time_filter_max_repos: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            commit_diff_max_repos: DEFAULT_COMMIT_DIFF_MAX_REPOS,
            commit_diff_with_time_filter_max_repos: DEFAULT_COMMIT_DIFF_WITH_TIME_FILTER_MAX_REPOS,
        }
    }
}

impl SearchLimits {
    pub fn validate(&self) -> Result<()> {
        if self.commit_diff_max_repos == 0 {
            bail!("limits.commit_diff_max_repos must be greater than zero");
        }
        if self.commit_diff_with_time_filter_max_repos == 0 {
            bail!("limits.commit_diff_with_time_filter_max_repos must be greater than zero");
        }
        Ok(())
    }

    pub fn repos_limit(&self, has_time_filter: bool) -> usize {
        if has_time_filter {
            self.commit_diff_with_time_filter_max_repos
        } else {
            self.commit_diff_max_repos
        }
    }
}

/// Supplies the current repository caps. Consulted once per search run.
pub trait LimitsSource: Send + Sync {
    fn search_limits(&self) -> SearchLimits;
}

impl LimitsSource for SearchLimits {
    fn search_limits(&self) -> SearchLimits {
        *self
    }
}

/// Re-reads the `[limits]` section of a config file on every call.
#[derive(Debug, Clone)]
pub struct FileLimits {
    path: PathBuf,
}

impl FileLimits {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LimitsSource for FileLimits {
    fn search_limits(&self) -> SearchLimits {
        let loaded = AppConfig::load(&self.path).and_then(|cfg| {
            cfg.limits.validate()?;
            Ok(cfg.limits)
        });
        match loaded {
            Ok(limits) => limits,
            Err(err) => {
                warn!(
                    stage = "config",
                    event = "config.limits.reload",
                    result = "fail",
                    config_path = %self.path.display(),
                    error = %format!("{err:#}"),
                    "falling back to default search limits"
                );
                SearchLimits::default()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub backend_url: Option<String>,
    /// Per-repository result cap sent with every backend request.
    pub result_limit: usize,
    pub max_concurrency: Option<usize>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub name: String,
    pub revisions: Vec<RevisionSpecifier>,
}

#[derive(Debug, Clone)]
pub struct UserConfig {
    pub username: String,
    pub emails: Vec<UserEmail>,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    limits: RawLimitsConfig,
    #[serde(default)]
    search: RawSearchConfig,
    #[serde(rename = "repo", default)]
    repos: Vec<RawRepoConfig>,
    #[serde(rename = "user", default)]
    users: Vec<RawUserConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLimitsConfig {
    commit_diff_max_repos: Option<usize>,
    commit_diff_with_time_filter_max_repos: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSearchConfig {
    backend_url: Option<String>,
    result_limit: Option<usize>,
    max_concurrency: Option<usize>,
    request_timeout: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepoConfig {
    name: String,
    revs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawUserConfig {
    username: String,
    #[serde(rename = "email", default)]
    emails: Vec<RawEmailConfig>,
}

#[derive(Debug, Deserialize)]
struct RawEmailConfig {
    address: String,
    #[serde(default)]
    verified: bool,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;

        Self::parse(&raw).with_context(|| format!("failed to load config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parsed: FileConfig = toml::from_str(raw).context("failed to parse TOML")?;
        Self::from_raw(parsed)
    }

    fn from_raw(raw: FileConfig) -> Result<Self> {
        let limits = SearchLimits {
            commit_diff_max_repos: raw
                .limits
                .commit_diff_max_repos
                .unwrap_or(DEFAULT_COMMIT_DIFF_MAX_REPOS),
            commit_diff_with_time_filter_max_repos: raw
                .limits
                .commit_diff_with_time_filter_max_repos
                .unwrap_or(DEFAULT_COMMIT_DIFF_WITH_TIME_FILTER_MAX_REPOS),
        };

        let request_timeout = parse_duration_string(
            raw.search
                .request_timeout
                .as_deref()
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            "search.request_timeout",
        )?;

        let search = SearchConfig {
            backend_url: raw.search.backend_url,
            result_limit: raw.search.result_limit.unwrap_or(DEFAULT_RESULT_LIMIT),
            max_concurrency: raw.search.max_concurrency,
            request_timeout,
        };

        let repos = raw
            .repos
            .into_iter()
            .map(|repo| RepoConfig {
                revisions: repo
                    .revs
                    .unwrap_or_else(|| vec!["HEAD".to_string()])
                    .iter()
                    .map(|rev| parse_revision(rev))
                    .collect(),
                name: repo.name,
            })
            .collect();

        let users = raw
            .users
            .into_iter()
            .map(|user| UserConfig {
                username: user.username,
                emails: user
                    .emails
                    .into_iter()
                    .map(|e| UserEmail {
                        address: e.address,
                        verified: e.verified,
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            limits,
            search,
            repos,
            users,
        })
    }

    pub fn validate_config(&self) -> Result<()> {
        self.limits.validate()?;
        if self.search.result_limit == 0 {
            bail!("search.result_limit must be greater than zero");
        }
        if self.search.max_concurrency == Some(0) {
            bail!("search.max_concurrency must be greater than zero when set");
        }
        if let Some(url) = &self.search.backend_url {
            if url.trim().is_empty() {
                bail!("search.backend_url must not be empty");
            }
        }

        let mut seen = HashSet::new();
        for repo in &self.repos {
            if repo.name.trim().is_empty() {
                bail!("repo.name must not be empty");
            }
            if !seen.insert(repo.name.as_str()) {
                bail!("duplicate repo '{}'", repo.name);
            }
            for rev in &repo.revisions {
                for glob in rev.ref_glob.iter().chain(rev.exclude_ref_glob.iter()) {
                    Pattern::new(glob).with_context(|| {
                        format!("invalid ref glob '{glob}' for repo '{}'", repo.name)
                    })?;
                }
            }
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.username.trim().is_empty() {
                bail!("user.username must not be empty");
            }
            if !seen.insert(user.username.as_str()) {
                bail!("duplicate user '{}'", user.username);
            }
            if user.emails.iter().any(|e| e.address.trim().is_empty()) {
                bail!("user '{}' has an email with an empty address", user.username);
            }
        }

        Ok(())
    }
}

/// `!glob` excludes refs, a string with glob characters includes refs, and
/// anything else is a single revision.
fn parse_revision(raw: &str) -> RevisionSpecifier {
    if let Some(glob) = raw.strip_prefix('!') {
        RevisionSpecifier::exclude_glob(glob)
    } else if is_glob_pattern(raw) {
        RevisionSpecifier::glob(raw)
    } else {
        RevisionSpecifier::rev(raw)
    }
}

fn parse_duration_string(value: &str, field: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .with_context(|| format!("invalid duration for {field}: '{value}'"))?;

    if duration.is_zero() {
        return Err(anyhow!("duration for {field} must be greater than zero"));
    }

    Ok(duration)
}

fn is_glob_pattern(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}
