use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use pointer_history::backend::HttpSearchClient;
use pointer_history::config::{AppConfig, FileLimits};
use pointer_history::identity::StaticUserStore;
use pointer_history::logging::init_logging;
use pointer_history::query::Query;
use pointer_history::resolve::StaticRepoPager;
use pointer_history::stream::JsonLinesSender;
use pointer_history::{CommitSearchJob, Services};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "pointer-history",
    version,
    about = "Search commit messages and diffs across repositories"
)]
struct Cli {
    #[arg(long)]
    config: PathBuf,
    /// Parsed query as JSON; `-` reads from stdin.
    #[arg(long)]
    query: Option<PathBuf>,
    /// Match against diffs instead of commit messages.
    #[arg(long, default_value_t = false)]
    diff: bool,
    #[arg(long, default_value_t = false)]
    required: bool,
    #[arg(long, default_value_t = false)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;
    info!(
        stage = "startup",
        event = "startup.begin",
        config_path = %cli.config.display(),
        "pointer-history process starting"
    );

    let load_start = Instant::now();
    let cfg = match AppConfig::load(&cli.config).context("failed to load pointer-history config") {
        Ok(cfg) => {
            info!(
                stage = "startup",
                event = "config.load.end",
                result = "ok",
                config_path = %cli.config.display(),
                repo_count = cfg.repos.len(),
                user_count = cfg.users.len(),
                duration_ms = load_start.elapsed().as_millis(),
                "configuration loaded"
            );
            cfg
        }
        Err(err) => {
            error!(
                stage = "startup",
                event = "config.load.end",
                result = "fail",
                config_path = %cli.config.display(),
                duration_ms = load_start.elapsed().as_millis(),
                error = %format!("{err:#}"),
                "configuration load failed"
            );
            return Err(err);
        }
    };

    if let Err(err) = cfg.validate_config() {
        error!(
            stage = "startup",
            event = "config.validate.end",
            result = "fail",
            error = %format!("{err:#}"),
            "configuration validation failed"
        );
        return Err(err);
    }
    info!(
        stage = "startup",
        event = "config.validate.end",
        result = "ok",
        "configuration validation completed"
    );

    if cli.validate_config {
        info!(
            stage = "startup",
            event = "startup.validate_only.exit",
            result = "ok",
            "configuration validation passed"
        );
        return Ok(());
    }

    let query_path = cli
        .query
        .as_deref()
        .ok_or_else(|| anyhow!("--query is required unless --validate-config is set"))?;
    let query = read_query(query_path)?;

    let backend_url = cfg
        .search
        .backend_url
        .as_deref()
        .ok_or_else(|| anyhow!("search.backend_url must be set to run a search"))?;
    let services = Services {
        repos: Arc::new(StaticRepoPager::from_config(&cfg.repos)),
        backend: Arc::new(HttpSearchClient::new(backend_url, cfg.search.request_timeout)?),
        users: Arc::new(StaticUserStore::from_config(&cfg.users)),
        limits: Arc::new(FileLimits::new(&cli.config)),
    };

    let job = CommitSearchJob::new(&query, cli.diff, cfg.search.result_limit)
        .with_max_concurrency(cfg.search.max_concurrency)
        .required(cli.required);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(
                stage = "shutdown",
                event = "shutdown.signal",
                "interrupt received, cancelling search"
            );
            on_signal.cancel();
        }
    });

    info!(
        stage = "search",
        event = "search.dispatch",
        kind = job.name(),
        required = job.is_required(),
        "running search"
    );
    job.run(&cancel, Arc::new(JsonLinesSender), &services)
        .await
        .with_context(|| format!("{} search failed", job.name()))
}

fn read_query(path: &Path) -> Result<Query> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read query from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read query {}", path.display()))?
    };

    serde_json::from_str(&raw).context("failed to parse query JSON")
}
