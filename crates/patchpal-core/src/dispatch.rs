//! End-to-end handling of one review event.
//!
//! Selected tasks run one after another. Each task ends in exactly one comment:
//! the review, the too-large notice, the not-mergeable notice or a failure
//! notice. A failing task never stops the tasks after it.

use std::sync::Arc;

use patchpal_ai::{ChatRequest, LlmClient, Message, MessageRole};
use patchpal_github::{
    render_command_reply, render_patch_too_large_notice, render_review_body,
    render_task_failure_notice, GithubIssueComment, PullRequest, NOT_MERGEABLE_NOTICE,
};
use tracing::{info, warn};

use crate::artifact_fetcher::ArtifactFetcher;
use crate::chunker::{split_user_message, MessageChunks};
use crate::config_store::ConfigStore;
use crate::error::{ChunkError, CompletionError, FetchError, TaskRunError};
use crate::external_context::{resolve_external_contexts, ExternalContextResolver};
use crate::intake::{ReviewEvent, ReviewTrigger};
use crate::prompt_composer::{ComposeSkip, PromptComposer};
use crate::review_host::ReviewHost;
use crate::task_selector::{select_tasks, SelectionTrigger, SkippedTask};
use crate::tasks::{TaskConfig, TasksConfig};
use crate::token_budget::{
    estimate_chat_request_tokens, estimate_text_tokens, ModelBudgetTable, TokenOverhead,
};

/// Reply cap for the "PART i/N received" acknowledgements.
pub const CHUNK_ACK_MAX_TOKENS: u32 = 32;

#[derive(Debug, Clone)]
/// Public struct `DispatchSettings` used across patchpal components.
pub struct DispatchSettings {
    pub model: String,
    pub budgets: ModelBudgetTable,
    pub composer: PromptComposer,
    pub fetcher: ArtifactFetcher,
}

impl DispatchSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            budgets: ModelBudgetTable::default(),
            composer: PromptComposer::default(),
            fetcher: ArtifactFetcher::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Per-task stages; a failure records the stage it happened in.
pub enum TaskStage {
    Fetching,
    Composing,
    Sending,
    Publishing,
}

impl TaskStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Composing => "composing",
            Self::Sending => "sending",
            Self::Publishing => "publishing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Terminal state of one task run.
pub enum TaskOutcome {
    Reviewed { parts: usize },
    SkippedTooLarge { artifact_bytes: usize, limit_bytes: usize },
    SkippedNotMergeable,
    Failed { stage: TaskStage, reason_code: &'static str, error: String },
}

impl TaskOutcome {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Reviewed { .. } => "task_reviewed",
            Self::SkippedTooLarge { .. } => "task_skipped_patch_too_large",
            Self::SkippedNotMergeable => "task_skipped_not_mergeable",
            Self::Failed { reason_code, .. } => *reason_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: String,
    pub outcome: TaskOutcome,
    pub comment_published: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub org: String,
    pub repo: String,
    pub number: u64,
    pub tasks: Vec<TaskReport>,
    pub skipped: Vec<SkippedTask>,
}

impl DispatchReport {
    pub fn comments_published(&self) -> usize {
        self.tasks
            .iter()
            .filter(|report| report.comment_published)
            .count()
    }
}

/// Lazily resolved pull request state shared by the tasks of one event.
struct EventContext {
    org: String,
    repo: String,
    number: u64,
    source_comment: Option<GithubIssueComment>,
    pull_request: Option<PullRequest>,
    artifact: Option<Arc<[u8]>>,
}

impl EventContext {
    fn new(event: ReviewEvent) -> Self {
        let (source_comment, pull_request) = match event.trigger {
            ReviewTrigger::Lifecycle { pull_request } => (None, Some(pull_request)),
            ReviewTrigger::Command { comment, .. } => (Some(comment), None),
        };
        Self {
            org: event.org,
            repo: event.repo,
            number: event.number,
            source_comment,
            pull_request,
            artifact: None,
        }
    }

    async fn pull_request(&mut self, host: &dyn ReviewHost) -> Result<PullRequest, FetchError> {
        if let Some(pull_request) = &self.pull_request {
            return Ok(pull_request.clone());
        }
        let pull_request = host
            .get_pull_request(&self.org, &self.repo, self.number)
            .await
            .map_err(FetchError::Host)?;
        self.pull_request = Some(pull_request.clone());
        Ok(pull_request)
    }

    async fn artifact(
        &mut self,
        fetcher: &ArtifactFetcher,
        host: &dyn ReviewHost,
    ) -> Result<Arc<[u8]>, FetchError> {
        if let Some(artifact) = &self.artifact {
            return Ok(Arc::clone(artifact));
        }
        let artifact: Arc<[u8]> = fetcher
            .fetch(host, &self.org, &self.repo, self.number)
            .await?
            .into();
        self.artifact = Some(Arc::clone(&artifact));
        Ok(artifact)
    }
}

/// A task's terminal outcome together with the comment body announcing it.
struct TaskResolution {
    outcome: TaskOutcome,
    body: String,
}

#[derive(Clone)]
/// Runs the selected review tasks for one event, sequentially, one comment each.
pub struct Dispatcher {
    tasks: Arc<ConfigStore<TasksConfig>>,
    host: Arc<dyn ReviewHost>,
    llm: Arc<dyn LlmClient>,
    contexts: Arc<dyn ExternalContextResolver>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        tasks: Arc<ConfigStore<TasksConfig>>,
        host: Arc<dyn ReviewHost>,
        llm: Arc<dyn LlmClient>,
        contexts: Arc<dyn ExternalContextResolver>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            tasks,
            host,
            llm,
            contexts,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn dispatch(&self, event: ReviewEvent) -> DispatchReport {
        let snapshot = self.tasks.snapshot();
        let trigger_kind = event.trigger.kind();
        let selection = match &event.trigger {
            ReviewTrigger::Lifecycle { pull_request } => select_tasks(
                &snapshot,
                &event.org,
                &event.repo,
                SelectionTrigger::Lifecycle { pull_request },
            ),
            ReviewTrigger::Command { instruction, .. } => select_tasks(
                &snapshot,
                &event.org,
                &event.repo,
                SelectionTrigger::Command { instruction },
            ),
        };
        drop(snapshot);

        let mut context = EventContext::new(event);
        let mut report = DispatchReport {
            org: context.org.clone(),
            repo: context.repo.clone(),
            number: context.number,
            tasks: Vec::with_capacity(selection.tasks.len()),
            skipped: selection.skipped,
        };
        if selection.tasks.is_empty() {
            info!(
                org = %report.org,
                repo = %report.repo,
                number = report.number,
                trigger = trigger_kind,
                reason_code = "event_no_tasks_selected",
                "no review tasks apply to event"
            );
            return report;
        }

        for task in &selection.tasks {
            let resolution = self.run_task(&mut context, task).await;
            let comment_published = self.publish(&context, task, &resolution).await;
            report.tasks.push(TaskReport {
                task: task.name.clone(),
                outcome: resolution.outcome,
                comment_published,
            });
        }
        report
    }

    async fn run_task(&self, context: &mut EventContext, task: &TaskConfig) -> TaskResolution {
        let result = self.review(context, task).await;
        match result {
            Ok(resolution) => resolution,
            Err((stage, error)) => {
                warn!(
                    org = %context.org,
                    repo = %context.repo,
                    number = context.number,
                    task = %task.name,
                    stage = stage.as_str(),
                    reason_code = error.reason_code(),
                    error = %error,
                    "review task failed"
                );
                TaskResolution {
                    body: render_task_failure_notice(&task.name, &error.to_string()),
                    outcome: TaskOutcome::Failed {
                        stage,
                        reason_code: error.reason_code(),
                        error: error.to_string(),
                    },
                }
            }
        }
    }

    async fn review(
        &self,
        context: &mut EventContext,
        task: &TaskConfig,
    ) -> Result<TaskResolution, (TaskStage, TaskRunError)> {
        let host = self.host.as_ref();
        let pull_request = context
            .pull_request(host)
            .await
            .map_err(|error| (TaskStage::Fetching, TaskRunError::from(error)))?;
        if context.source_comment.is_some() && pull_request.mergeable == Some(false) {
            return Ok(TaskResolution {
                outcome: TaskOutcome::SkippedNotMergeable,
                body: NOT_MERGEABLE_NOTICE.to_string(),
            });
        }
        let artifact = context
            .artifact(&self.settings.fetcher, host)
            .await
            .map_err(|error| (TaskStage::Fetching, TaskRunError::from(error)))?;

        let composer = self.settings.composer;
        if let Err(ComposeSkip::ArtifactTooLarge {
            artifact_bytes,
            limit_bytes,
        }) = composer.check_artifact(&artifact)
        {
            info!(
                org = %context.org,
                repo = %context.repo,
                number = context.number,
                task = %task.name,
                artifact_bytes,
                limit_bytes,
                reason_code = "task_skipped_patch_too_large",
                "patch exceeds review ceiling"
            );
            return Ok(TaskResolution {
                outcome: TaskOutcome::SkippedTooLarge {
                    artifact_bytes,
                    limit_bytes,
                },
                body: render_patch_too_large_notice(&task.name, artifact_bytes, limit_bytes),
            });
        }
        let external_contexts = resolve_external_contexts(
            self.contexts.as_ref(),
            &task.name,
            &task.external_contexts,
        )
        .await;
        let message = match composer.compose(
            task,
            &pull_request.title,
            pull_request.body_text(),
            &artifact,
            &external_contexts,
        ) {
            Ok(message) => message,
            Err(ComposeSkip::ArtifactTooLarge {
                artifact_bytes,
                limit_bytes,
            }) => {
                return Ok(TaskResolution {
                    outcome: TaskOutcome::SkippedTooLarge {
                        artifact_bytes,
                        limit_bytes,
                    },
                    body: render_patch_too_large_notice(&task.name, artifact_bytes, limit_bytes),
                })
            }
        };

        let (review, parts) = self
            .converse(task, &message)
            .await
            .map_err(|error| match error {
                TaskRunError::Chunk(_) => (TaskStage::Composing, error),
                _ => (TaskStage::Sending, error),
            })?;
        info!(
            org = %context.org,
            repo = %context.repo,
            number = context.number,
            task = %task.name,
            parts,
            reason_code = "task_reviewed",
            "review completed"
        );
        Ok(TaskResolution {
            outcome: TaskOutcome::Reviewed { parts },
            body: render_review_body(task.head_note(), &review),
        })
    }

    /// Send the message, chunked when needed, and return the final reply.
    ///
    /// Each request resends every earlier part and acknowledgement, so the
    /// whole conversation must fit the model's window. It is sized before the
    /// first call and each request is checked again before it is sent.
    async fn converse(
        &self,
        task: &TaskConfig,
        message: &str,
    ) -> Result<(String, usize), TaskRunError> {
        let model = self.settings.model.as_str();
        let budget = self.settings.budgets.budget_for(model);
        let window_tokens = budget.context_tokens;
        let part_bytes = self.settings.budgets.chunk_budget(
            model,
            &task.system_message,
            task.max_response_tokens,
        );
        let chunks = split_user_message(message, part_bytes)?;
        let parts = chunks.total();

        let required_tokens = projected_conversation_tokens(task, chunks.clone(), budget.overhead);
        if required_tokens > window_tokens {
            return Err(ChunkError::ContextWindowExceeded {
                required_tokens,
                window_tokens,
            }
            .into());
        }

        let mut messages = vec![Message::system(task.system_message.clone())];
        for chunk in chunks {
            messages.push(Message::user(chunk.render()));
            let max_tokens = if chunk.is_final {
                task.max_response_tokens
            } else {
                CHUNK_ACK_MAX_TOKENS
            };
            let request = ChatRequest {
                model: model.to_string(),
                messages: messages.clone(),
                max_tokens: Some(max_tokens),
                temperature: Some(task.temperature),
            };
            let estimate = estimate_chat_request_tokens(&request, budget.overhead);
            if estimate.total_tokens > window_tokens {
                return Err(ChunkError::ContextWindowExceeded {
                    required_tokens: estimate.total_tokens,
                    window_tokens,
                }
                .into());
            }
            let response = self
                .llm
                .complete(request)
                .await
                .map_err(CompletionError::Backend)?;
            let reply = response.message.text_content().to_string();
            if chunk.is_final {
                if reply.trim().is_empty() {
                    return Err(CompletionError::EmptyResponse.into());
                }
                return Ok((reply, parts));
            }
            messages.push(Message::assistant_text(reply));
        }
        Err(CompletionError::EmptyResponse.into())
    }

    async fn publish(
        &self,
        context: &EventContext,
        task: &TaskConfig,
        resolution: &TaskResolution,
    ) -> bool {
        let body = match &context.source_comment {
            Some(comment) => render_command_reply(
                &comment.user.login,
                &comment.html_url,
                &comment.body,
                &resolution.body,
            ),
            None => resolution.body.clone(),
        };
        match self
            .host
            .create_comment(&context.org, &context.repo, context.number, &body)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    org = %context.org,
                    repo = %context.repo,
                    number = context.number,
                    task = %task.name,
                    stage = TaskStage::Publishing.as_str(),
                    reason_code = "task_comment_publish_failed",
                    error = %format!("{error:#}"),
                    "failed to publish review comment"
                );
                false
            }
        }
    }
}

/// Tokens of the last request in a conversation over `chunks`: the system
/// prompt, every part, an acknowledgement at its reply cap after each
/// non-final part, and the reserved review reply.
fn projected_conversation_tokens(
    task: &TaskConfig,
    chunks: MessageChunks<'_>,
    overhead: TokenOverhead,
) -> usize {
    let acknowledgements = chunks.total().saturating_sub(1);
    let mut messages = Vec::with_capacity(chunks.total() + 1);
    messages.push(Message::system(task.system_message.clone()));
    messages.extend(chunks.map(|chunk| Message::user(chunk.render())));
    let request = ChatRequest {
        model: String::new(),
        messages,
        max_tokens: Some(task.max_response_tokens),
        temperature: None,
    };
    let acknowledgement_tokens = usize::try_from(overhead.tokens_per_message).unwrap_or(0)
        + estimate_text_tokens(MessageRole::Assistant.as_str())
        + CHUNK_ACK_MAX_TOKENS as usize;
    estimate_chat_request_tokens(&request, overhead)
        .total_tokens
        .saturating_add(acknowledgements * acknowledgement_tokens)
}
