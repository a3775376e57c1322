use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::github_transport_helpers::{
    is_retryable_github_status, parse_retry_after, retry_delay, truncate_for_error,
};
use crate::pull_request::PullRequest;

const GITHUB_PATCH_MEDIA_TYPE: &str = "application/vnd.github.v3.patch";
const ERROR_BODY_MAX_CHARS: usize = 800;

/// A GitHub call that did not return a success response.
#[derive(Debug, Error)]
pub enum GithubRequestError {
    #[error("github api {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    #[error("github api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl GithubRequestError {
    /// Throttling, server errors and connection trouble are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_retryable_github_status(*status),
            Self::Transport { source, .. } => source.is_timeout() || source.is_connect(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            Self::Transport { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubCommentCreateResponse {
    pub id: u64,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone)]
/// Connection settings for `GithubApiClient`.
pub struct GithubApiClientConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    /// Log mutating calls instead of sending them.
    pub dry_run: bool,
}

impl GithubApiClientConfig {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: token.into(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            dry_run: false,
        }
    }
}

#[derive(Clone)]
/// GitHub REST client for the pull request, patch and comment endpoints.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
    dry_run: bool,
}

impl GithubApiClient {
    pub fn new(config: GithubApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("patchpal-review-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
            dry_run: config.dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest> {
        self.request_json("get pull request", || {
            self.http
                .get(format!("{}/repos/{org}/{repo}/pulls/{number}", self.api_base))
        })
        .await
    }

    /// Fetch the raw patch text of a pull request.
    ///
    /// Immediately after a pull request is created GitHub may answer this
    /// endpoint with the JSON metadata document instead of the patch; callers
    /// are expected to detect and retry that case.
    pub async fn get_pull_request_patch(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<u8>> {
        let patch = self
            .request_bytes("get pull request patch", || {
                self.http
                    .get(format!("{}/repos/{org}/{repo}/pulls/{number}", self.api_base))
                    .header(reqwest::header::ACCEPT, GITHUB_PATCH_MEDIA_TYPE)
            })
            .await?;
        Ok(patch)
    }

    /// Create a comment on an issue or pull request. Returns `None` in dry-run mode.
    pub async fn create_issue_comment(
        &self,
        org: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Option<GithubCommentCreateResponse>> {
        if self.dry_run {
            info!(
                org,
                repo,
                number,
                body_chars = body.chars().count(),
                "dry-run: skipping github comment creation"
            );
            debug!(body, "dry-run comment body");
            return Ok(None);
        }

        let payload = json!({ "body": body });
        let created = self
            .request_json("create issue comment", || {
                self.http
                    .post(format!(
                        "{}/repos/{org}/{repo}/issues/{number}/comments",
                        self.api_base
                    ))
                    .json(&payload)
            })
            .await?;
        Ok(Some(created))
    }

    async fn send_once(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, GithubRequestError> {
        let transport = |source| GithubRequestError::Transport { operation, source };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(GithubRequestError::Status {
                operation,
                status: status.as_u16(),
                body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                retry_after,
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn request_bytes<F>(
        &self,
        operation: &'static str,
        build_request: F,
    ) -> Result<Vec<u8>, GithubRequestError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            match self.send_once(operation, build_request()).await {
                Err(error) if attempt < self.retry_max_attempts && error.is_transient() => {
                    let delay = retry_delay(self.retry_base_delay_ms, attempt, error.retry_after());
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying github request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn request_json<T, F>(&self, operation: &'static str, build_request: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let bytes = self.request_bytes(operation, build_request).await?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode github {operation} response"))
    }
}
