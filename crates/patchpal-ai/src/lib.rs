//! Chat-completion client surface for patchpal.
//!
//! Provides provider-neutral message types, the `LlmClient` trait consumed by
//! the review dispatcher, and an OpenAI-compatible HTTP client with bounded
//! retry/backoff.
mod openai;
mod retry;
mod types;

pub use openai::{OpenAiAuthScheme, OpenAiClient, OpenAiConfig};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, PatchpalAiError,
};
