//! Review dispatch engine for patchpal.
//!
//! Holds the hot-reloadable task configuration, decides which review tasks
//! apply to a pull request event, fetches and bounds the patch, composes and
//! chunks the prompt, and publishes one comment per task.

pub mod artifact_fetcher;
pub mod chunker;
pub mod config_store;
pub mod dispatch;
pub mod error;
pub mod external_context;
pub mod intake;
pub mod prompt_composer;
pub mod review_host;
pub mod task_selector;
pub mod tasks;
pub mod token_budget;

pub use artifact_fetcher::{ArtifactFetchPolicy, ArtifactFetcher};
pub use chunker::{split_user_message, MessageChunk, MessageChunks};
pub use config_store::{start_watch, ConfigDocument, ConfigStore, ConfigWatchHandle};
pub use dispatch::{
    DispatchReport, DispatchSettings, Dispatcher, TaskOutcome, TaskReport, TaskStage,
};
pub use error::{ChunkError, CompletionError, ConfigError, FetchError, TaskRunError};
pub use external_context::{ExternalContextResolver, HttpExternalContextResolver};
pub use intake::{review_event_from_webhook, IntakeSkip, ReviewEvent, ReviewTrigger};
pub use prompt_composer::{ComposeSkip, PromptComposer};
pub use review_host::ReviewHost;
pub use task_selector::{select_tasks, Selection, SelectionTrigger, SkipReason, SkippedTask};
pub use tasks::{ExternalContext, RepoTasks, TaskConfig, TasksConfig};
pub use token_budget::{
    estimate_chat_request_tokens, ChatRequestTokenEstimate, ModelBudget, ModelBudgetTable,
    TokenOverhead,
};
