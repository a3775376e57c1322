//! Token accounting against a model's context window.
//!
//! Counts are estimates: four characters per token plus the fixed
//! per-message cost of the model family's chat format.

use std::collections::BTreeMap;

use patchpal_ai::{ChatRequest, Message};
use serde::Deserialize;

/// Tokens held back for the part markers and wait instructions around each chunk.
pub const CHUNK_FRAMING_RESERVE_TOKENS: usize = 256;
/// Tokens the backend adds to prime every reply.
const REPLY_PRIMING_TOKENS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
/// Fixed per-message and per-name token cost of a model family's chat format.
pub struct TokenOverhead {
    pub tokens_per_message: i64,
    pub tokens_per_name: i64,
}

impl TokenOverhead {
    pub const GPT_3_5: Self = Self {
        tokens_per_message: 4,
        tokens_per_name: -1,
    };
    pub const GPT_4: Self = Self {
        tokens_per_message: 3,
        tokens_per_name: 1,
    };
}

impl Default for TokenOverhead {
    fn default() -> Self {
        Self::GPT_4
    }
}

/// Estimate tokens for `text` with the four-characters-per-token heuristic.
pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count().saturating_add(3) / 4
}

pub fn num_tokens_from_messages(messages: &[Message], overhead: TokenOverhead) -> usize {
    let mut total = REPLY_PRIMING_TOKENS;
    for message in messages {
        total += overhead.tokens_per_message;
        total += estimate_text_tokens(message.text_content()) as i64;
        total += estimate_text_tokens(message.role.as_str()) as i64;
        if let Some(name) = message.name.as_deref().filter(|name| !name.is_empty()) {
            total += estimate_text_tokens(name) as i64;
            total += overhead.tokens_per_name;
        }
    }
    total.max(0) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatRequestTokenEstimate {
    pub input_tokens: usize,
    /// Input plus the reply tokens reserved by `max_tokens`.
    pub total_tokens: usize,
}

/// Window space a request occupies: every message sent plus the reply it reserves.
pub fn estimate_chat_request_tokens(
    request: &ChatRequest,
    overhead: TokenOverhead,
) -> ChatRequestTokenEstimate {
    let input_tokens = num_tokens_from_messages(&request.messages, overhead);
    let reply_tokens = request.max_tokens.unwrap_or(0) as usize;
    ChatRequestTokenEstimate {
        input_tokens,
        total_tokens: input_tokens.saturating_add(reply_tokens),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ModelBudget {
    pub context_tokens: usize,
    #[serde(default)]
    pub overhead: TokenOverhead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Context budgets per model name, matched by longest prefix.
pub struct ModelBudgetTable {
    models: BTreeMap<String, ModelBudget>,
    fallback: ModelBudget,
}

impl Default for ModelBudgetTable {
    fn default() -> Self {
        let gpt_3_5 = ModelBudget {
            context_tokens: 4_096,
            overhead: TokenOverhead::GPT_3_5,
        };
        let gpt_4 = ModelBudget {
            context_tokens: 8_192,
            overhead: TokenOverhead::GPT_4,
        };
        let models = BTreeMap::from([
            ("gpt-3.5-turbo".to_string(), gpt_3_5),
            ("gpt-4".to_string(), gpt_4),
            (
                "gpt-4-32k".to_string(),
                ModelBudget {
                    context_tokens: 32_768,
                    overhead: TokenOverhead::GPT_4,
                },
            ),
        ]);
        Self {
            models,
            fallback: gpt_3_5,
        }
    }
}

impl ModelBudgetTable {
    pub fn with_model(mut self, model: impl Into<String>, budget: ModelBudget) -> Self {
        self.models.insert(model.into(), budget);
        self
    }

    pub fn with_fallback(mut self, fallback: ModelBudget) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn budget_for(&self, model: &str) -> ModelBudget {
        self.models
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, budget)| *budget)
            .unwrap_or(self.fallback)
    }

    /// Bytes available for one user part once the system prompt and reply are paid for.
    ///
    /// This sizes a single part. Parts accumulate in the conversation, so the
    /// dispatcher still checks every request against the full window.
    pub fn chunk_budget(
        &self,
        model: &str,
        system_message: &str,
        max_response_tokens: u32,
    ) -> usize {
        let budget = self.budget_for(model);
        let system_tokens =
            num_tokens_from_messages(&[Message::system(system_message)], budget.overhead);
        budget
            .context_tokens
            .saturating_sub(system_tokens)
            .saturating_sub(max_response_tokens as usize)
            .saturating_sub(CHUNK_FRAMING_RESERVE_TOKENS)
    }
}
