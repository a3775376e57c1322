mod backend_config;
mod cli;
mod webhook_server;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use patchpal_ai::OpenAiClient;
use patchpal_core::{
    start_watch, ArtifactFetchPolicy, ArtifactFetcher, ConfigStore, DispatchSettings, Dispatcher,
    HttpExternalContextResolver, PromptComposer, TasksConfig,
};
use patchpal_github::{GithubApiClient, GithubApiClientConfig, ReviewCommandMatcher};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::backend_config::BackendConfig;
use crate::cli::Cli;
use crate::webhook_server::{run_webhook_server, WebhookServerState};

const EXTERNAL_CONTEXT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    run(cli).await
}

fn init_tracing(log_level: &str) {
    let default_level = log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn read_secret_file(path: &Path, label: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {label} from {}", path.display()))?;
    let secret = raw.trim().to_string();
    if secret.is_empty() {
        bail!("{label} file {} is empty", path.display());
    }
    Ok(secret)
}

async fn run(cli: Cli) -> Result<()> {
    let hmac_secret = read_secret_file(&cli.hmac_secret_file, "webhook hmac secret")?;
    let github_token = read_secret_file(&cli.github_token_file, "github token")?;

    let mut github_config = GithubApiClientConfig::new(cli.github_api_base.clone(), github_token);
    github_config.dry_run = cli.dry_run;
    let github = GithubApiClient::new(github_config)?;

    let backend = BackendConfig::load(&cli.openai_config_file)?;
    let llm = OpenAiClient::new(backend.openai_config()?)
        .context("failed to build completion client")?;
    let contexts = HttpExternalContextResolver::new(EXTERNAL_CONTEXT_TIMEOUT)?;

    let tasks = Arc::new(
        ConfigStore::<TasksConfig>::load(cli.tasks_file.clone())
            .with_context(|| format!("failed to load tasks from {}", cli.tasks_file.display()))?,
    );
    info!(
        path = %cli.tasks_file.display(),
        scopes = tasks.snapshot().scope_count(),
        "loaded review tasks"
    );
    let mut watch = start_watch(
        Arc::clone(&tasks),
        Duration::from_millis(cli.tasks_reload_interval_ms),
        |snapshot: &Arc<TasksConfig>| {
            info!(scopes = snapshot.scope_count(), "review tasks reloaded");
        },
    );

    let settings = DispatchSettings {
        model: cli.openai_model.clone(),
        budgets: backend.model_budgets(),
        composer: PromptComposer::new(cli.max_patch_bytes),
        fetcher: ArtifactFetcher::new(ArtifactFetchPolicy {
            backoff: Duration::from_millis(cli.patch_retry_backoff_ms),
            max_attempts: cli.patch_retry_max_attempts,
        }),
    };
    let dispatcher = Dispatcher::new(
        tasks,
        Arc::new(github),
        Arc::new(llm),
        Arc::new(contexts),
        settings,
    );
    let state = Arc::new(WebhookServerState {
        dispatcher,
        matcher: ReviewCommandMatcher::new(&cli.command_verb)?,
        hmac_secret: hmac_secret.into_bytes(),
    });

    info!(
        model = %cli.openai_model,
        dry_run = cli.dry_run,
        command_verb = %cli.command_verb,
        "patchpal starting"
    );
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let served = run_webhook_server(bind_addr, state).await;
    watch.shutdown().await;
    served
}
