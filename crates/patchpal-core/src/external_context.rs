use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::tasks::ExternalContext;

const CONTENT_PLACEHOLDER: &str = "%s";

#[async_trait]
/// Loads the content behind an external context's `res_url`.
pub trait ExternalContextResolver: Send + Sync {
    async fn fetch(&self, res_url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
/// Resolves external contexts with a plain HTTP GET.
pub struct HttpExternalContextResolver {
    http: reqwest::Client,
}

impl HttpExternalContextResolver {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("patchpal-review-bot")
            .timeout(request_timeout)
            .build()
            .context("failed to create external context client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ExternalContextResolver for HttpExternalContextResolver {
    async fn fetch(&self, res_url: &str) -> Result<String> {
        let response = self
            .http
            .get(res_url)
            .send()
            .await
            .with_context(|| format!("failed to request external context {res_url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!(
                "external context {res_url} returned status {}",
                status.as_u16()
            );
        }
        response
            .text()
            .await
            .with_context(|| format!("failed to read external context {res_url}"))
    }
}

/// Substitute `content` for the first `%s` in `prompt_tpl`, or append it.
pub fn render_external_context(prompt_tpl: &str, content: &str) -> String {
    if prompt_tpl.contains(CONTENT_PLACEHOLDER) {
        prompt_tpl.replacen(CONTENT_PLACEHOLDER, content, 1)
    } else if prompt_tpl.trim().is_empty() {
        content.to_string()
    } else {
        format!("{prompt_tpl}\n{content}")
    }
}

/// Resolve every context in order; failures are logged and dropped.
pub async fn resolve_external_contexts(
    resolver: &dyn ExternalContextResolver,
    task: &str,
    contexts: &[ExternalContext],
) -> Vec<String> {
    let mut resolved = Vec::with_capacity(contexts.len());
    for context in contexts {
        if context.res_url.trim().is_empty() {
            continue;
        }
        match resolver.fetch(&context.res_url).await {
            Ok(content) => resolved.push(render_external_context(&context.prompt_tpl, &content)),
            Err(error) => warn!(
                task,
                res_url = %context.res_url,
                reason_code = "external_context_unavailable",
                error = %format!("{error:#}"),
                "external context omitted from prompt"
            ),
        }
    }
    resolved
}
