use std::path::PathBuf;

use clap::Parser;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "patchpal",
    about = "Webhook service that reviews pull requests with a chat-completion backend",
    version
)]
pub struct Cli {
    #[arg(long, env = "PATCHPAL_PORT", default_value_t = 8888, help = "Port to listen on.")]
    pub port: u16,

    #[arg(
        long,
        env = "PATCHPAL_DRY_RUN",
        default_value_t = false,
        help = "Log review comments instead of posting them."
    )]
    pub dry_run: bool,

    #[arg(
        long,
        env = "PATCHPAL_HMAC_SECRET_FILE",
        default_value = "/etc/webhook/hmac",
        help = "Path to the file containing the GitHub webhook HMAC secret."
    )]
    pub hmac_secret_file: PathBuf,

    #[arg(
        long,
        env = "PATCHPAL_GITHUB_TOKEN_FILE",
        default_value = "/etc/github/oauth",
        help = "Path to the file containing the GitHub API token."
    )]
    pub github_token_file: PathBuf,

    #[arg(
        long,
        env = "PATCHPAL_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL."
    )]
    pub github_api_base: String,

    #[arg(
        long,
        env = "PATCHPAL_OPENAI_CONFIG_FILE",
        default_value = "/etc/openai/config.yaml",
        help = "Path to the YAML file describing the completion backend."
    )]
    pub openai_config_file: PathBuf,

    #[arg(
        long,
        env = "PATCHPAL_OPENAI_MODEL",
        default_value = "gpt-3.5-turbo",
        help = "Chat model used for reviews."
    )]
    pub openai_model: String,

    #[arg(
        long,
        env = "PATCHPAL_TASKS_FILE",
        default_value = "/etc/patchpal/tasks.yaml",
        help = "Path to the review tasks document."
    )]
    pub tasks_file: PathBuf,

    #[arg(
        long,
        env = "PATCHPAL_TASKS_RELOAD_INTERVAL_MS",
        default_value_t = 60_000,
        value_parser = parse_positive_u64,
        help = "Interval between modification checks of the tasks document."
    )]
    pub tasks_reload_interval_ms: u64,

    #[arg(
        long,
        env = "PATCHPAL_COMMAND_VERB",
        default_value = "review",
        help = "Comment command verb, matched as `/<verb> <instruction>`."
    )]
    pub command_verb: String,

    #[arg(
        long,
        env = "PATCHPAL_MAX_PATCH_BYTES",
        default_value_t = 65_536,
        help = "Largest patch, in bytes, that is sent for review."
    )]
    pub max_patch_bytes: usize,

    #[arg(
        long,
        env = "PATCHPAL_PATCH_RETRY_BACKOFF_MS",
        default_value_t = 5_000,
        help = "Wait between patch fetches while GitHub has not materialized the diff."
    )]
    pub patch_retry_backoff_ms: u64,

    #[arg(
        long,
        env = "PATCHPAL_PATCH_RETRY_MAX_ATTEMPTS",
        default_value_t = 12,
        value_parser = parse_positive_u32,
        help = "Patch fetch attempts before the task fails."
    )]
    pub patch_retry_max_attempts: u32,

    #[arg(
        long,
        env = "PATCHPAL_LOG_LEVEL",
        default_value = "info",
        help = "Default tracing level when RUST_LOG is unset."
    )]
    pub log_level: String,
}
