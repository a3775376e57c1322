use std::path::PathBuf;

use patchpal_ai::PatchpalAiError;
use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `ConfigError` values.
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("task `{task}` in scope `{scope}` has invalid {field} `{pattern}`: {source}")]
    InvalidPattern {
        scope: String,
        task: String,
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("review host request failed: {0:#}")]
    Host(anyhow::Error),
    #[error("pull request patch was not ready after {attempts} attempts")]
    NotReady { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion backend failed: {0}")]
    Backend(#[from] PatchpalAiError),
    #[error("completion backend returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Error, PartialEq, Eq)]
/// The message cannot be delivered within the model's context window.
pub enum ChunkError {
    #[error("no context budget left for the user message")]
    BudgetExhausted,
    #[error(
        "review conversation needs about {required_tokens} tokens \
         but the model window is {window_tokens}"
    )]
    ContextWindowExceeded {
        required_tokens: usize,
        window_tokens: usize,
    },
}

#[derive(Debug, Error)]
/// Failure of a single review task; rendered into the failure notice comment.
pub enum TaskRunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl TaskRunError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Fetch(FetchError::Host(_)) => "task_fetch_failed",
            Self::Fetch(FetchError::NotReady { .. }) => "task_patch_not_ready",
            Self::Chunk(ChunkError::BudgetExhausted) => "task_chunk_budget_exhausted",
            Self::Chunk(ChunkError::ContextWindowExceeded { .. }) => "task_context_window_exceeded",
            Self::Completion(_) => "task_completion_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkError, CompletionError, FetchError, TaskRunError};

    #[test]
    fn unit_task_run_error_reason_codes_follow_source() {
        let not_ready = TaskRunError::from(FetchError::NotReady { attempts: 12 });
        assert_eq!(not_ready.reason_code(), "task_patch_not_ready");
        assert_eq!(
            not_ready.to_string(),
            "pull request patch was not ready after 12 attempts"
        );
        assert_eq!(
            TaskRunError::from(ChunkError::BudgetExhausted).reason_code(),
            "task_chunk_budget_exhausted"
        );
        let oversized = TaskRunError::from(ChunkError::ContextWindowExceeded {
            required_tokens: 16_000,
            window_tokens: 4_096,
        });
        assert_eq!(oversized.reason_code(), "task_context_window_exceeded");
        assert!(oversized.to_string().contains("16000 tokens"));
        assert_eq!(
            TaskRunError::from(CompletionError::EmptyResponse).reason_code(),
            "task_completion_failed"
        );
    }

    #[test]
    fn regression_fetch_host_error_keeps_context_chain() {
        let error = FetchError::Host(anyhow::anyhow!("connection reset").context("get patch"));
        assert_eq!(
            error.to_string(),
            "review host request failed: get patch: connection reset"
        );
    }
}
