use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::retry::{is_transient_status, is_transient_transport, retry_after, RetrySchedule};
use crate::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, PatchpalAiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `OpenAiAuthScheme` values.
pub enum OpenAiAuthScheme {
    #[default]
    Bearer,
    /// Azure OpenAI deployments authenticate with an `api-key` header.
    ApiKeyHeader,
}

#[derive(Debug, Clone)]
/// Public struct `OpenAiConfig` used across patchpal components.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
    pub auth_scheme: OpenAiAuthScheme,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone)]
/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, PatchpalAiError> {
        if config.api_key.trim().is_empty() {
            return Err(PatchpalAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match config.auth_scheme {
            OpenAiAuthScheme::Bearer => {
                let bearer = format!("Bearer {}", config.api_key.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&bearer).map_err(|e| {
                        PatchpalAiError::InvalidResponse(format!("invalid API key header: {e}"))
                    })?,
                );
            }
            OpenAiAuthScheme::ApiKeyHeader => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(config.api_key.trim()).map_err(|e| {
                        PatchpalAiError::InvalidResponse(format!("invalid API key header: {e}"))
                    })?,
                );
            }
        }

        if let Some(org) = &config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    PatchpalAiError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

/// Why a single completion attempt did not produce a response body.
enum AttemptFailure {
    Status {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },
    Transport(reqwest::Error),
}

impl AttemptFailure {
    fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Transport(error) => is_transient_transport(error),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            Self::Transport(_) => None,
        }
    }
}

impl From<AttemptFailure> for PatchpalAiError {
    fn from(failure: AttemptFailure) -> Self {
        match failure {
            AttemptFailure::Status { status, body, .. } => Self::HttpStatus {
                status: status.as_u16(),
                body,
            },
            AttemptFailure::Transport(error) => Self::Http(error),
        }
    }
}

impl OpenAiClient {
    async fn send_once(&self, url: &str, body: &Value) -> Result<String, AttemptFailure> {
        let mut request = self.client.post(url).json(body);
        if let Some(api_version) = self.config.api_version.as_deref() {
            request = request.query(&[("api-version", api_version)]);
        }
        let response = request.send().await.map_err(AttemptFailure::Transport)?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.map_err(AttemptFailure::Transport)?;
        if !status.is_success() {
            return Err(AttemptFailure::Status {
                status,
                body: text,
                retry_after,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, PatchpalAiError> {
        let body = build_chat_request_body(&request);
        let url = self.chat_completions_url();
        let schedule = RetrySchedule::start(
            self.config.max_retries,
            self.config.retry_budget_ms,
            self.config.retry_jitter,
        );

        let mut attempt = 0;
        loop {
            let failure = match self.send_once(&url, &body).await {
                Ok(raw) => return parse_chat_response(&raw),
                Err(failure) => failure,
            };
            let delay = failure
                .is_transient()
                .then(|| schedule.delay_after(attempt, failure.retry_after()))
                .flatten();
            let Some(delay) = delay else {
                return Err(failure.into());
            };
            sleep(delay).await;
            attempt += 1;
        }
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            let mut serialized = json!({
                "role": message.role.as_str(),
                "content": message.content,
            });
            if let Some(name) = message.name.as_deref() {
                serialized["name"] = json!(name);
            }
            serialized
        })
        .collect::<Vec<_>>();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, PatchpalAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(PatchpalAiError::EmptyChoices)?;

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message::assistant_text(choice.message.content.unwrap_or_default()),
        finish_reason: choice.finish_reason,
        usage,
    })
}
