//! Review task configuration model.
//!
//! The tasks document is keyed by `"org/repo"` or `"org"`, then by task name:
//!
//! ```yaml
//! acme/widget:
//!   security:
//!     user_prompt: Look for injection risks.
//!     always_run: true
//!     skip_authors: [dependabot]
//!     skip_branch_patterns: ["^release-"]
//! ```

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::Deserialize;

use crate::config_store::ConfigDocument;
use crate::error::ConfigError;

pub const DEFAULT_TASK_NAME: &str = "default";
pub const INSTRUCTION_TASK_NAME: &str = "instruction";
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are an experienced software developer. \
    You will act as a reviewer for a GitHub Pull Request, \
    and you should answer by markdown format.";
pub const DEFAULT_USER_PROMPT: &str =
    "Please identify potential problems and give some fixing suggestions.";
pub const DEFAULT_PATCH_INTRODUCE_PROMPT: &str = "This is the diff for the pull request:";
pub const DEFAULT_MAX_RESPONSE_TOKENS: u32 = 500;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_OUTPUT_HEAD_NOTE: &str = "> **I have already done a preliminary review for you, \
    and I hope to help you do a better job.**\n------\n";

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
/// One `{prompt_tpl, res_url}` pair; `%s` in the template receives the fetched content.
pub struct ExternalContext {
    #[serde(default)]
    pub prompt_tpl: String,
    #[serde(default)]
    pub res_url: String,
}

#[derive(Debug, Clone, Default)]
struct CompiledSkipPatterns {
    branches: Vec<Regex>,
    labels: Vec<Regex>,
}

#[derive(Debug, Clone, Deserialize)]
/// Public struct `TaskConfig` used across patchpal components.
pub struct TaskConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub patch_introduce_prompt: String,
    #[serde(default, alias = "output_static_head_note")]
    pub output_head_note: Option<String>,
    #[serde(default)]
    pub max_response_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub external_contexts: Vec<ExternalContext>,
    #[serde(default)]
    pub always_run: bool,
    #[serde(default)]
    pub skip_authors: Vec<String>,
    #[serde(default, alias = "skip_branche_regs")]
    pub skip_branch_patterns: Vec<String>,
    #[serde(default, alias = "skip_label_regs")]
    pub skip_label_patterns: Vec<String>,
    #[serde(skip)]
    compiled: CompiledSkipPatterns,
}

impl TaskConfig {
    /// The built-in task used for the `default` instruction.
    pub fn builtin_default() -> Self {
        Self {
            name: DEFAULT_TASK_NAME.to_string(),
            description: None,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
            patch_introduce_prompt: DEFAULT_PATCH_INTRODUCE_PROMPT.to_string(),
            output_head_note: Some(DEFAULT_OUTPUT_HEAD_NOTE.to_string()),
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            external_contexts: Vec::new(),
            always_run: false,
            skip_authors: Vec::new(),
            skip_branch_patterns: Vec::new(),
            skip_label_patterns: Vec::new(),
            compiled: CompiledSkipPatterns::default(),
        }
    }

    /// An ad-hoc task that asks the comment author's question against the default persona.
    pub fn from_instruction(instruction: &str) -> Self {
        Self {
            name: INSTRUCTION_TASK_NAME.to_string(),
            user_prompt: instruction.trim().to_string(),
            ..Self::builtin_default()
        }
    }

    /// Fill empty fields with the built-in defaults and recompile skip patterns.
    pub fn prepare(&mut self, scope: &str, name: &str) -> Result<(), ConfigError> {
        self.name = name.to_string();
        if self.system_message.trim().is_empty() {
            self.system_message = DEFAULT_SYSTEM_MESSAGE.to_string();
        }
        if self.user_prompt.trim().is_empty() {
            self.user_prompt = DEFAULT_USER_PROMPT.to_string();
        }
        if self.patch_introduce_prompt.trim().is_empty() {
            self.patch_introduce_prompt = DEFAULT_PATCH_INTRODUCE_PROMPT.to_string();
        }
        if self.max_response_tokens == 0 {
            self.max_response_tokens = DEFAULT_MAX_RESPONSE_TOKENS;
        }
        self.compiled = CompiledSkipPatterns {
            branches: compile_patterns(
                scope,
                name,
                "skip_branch_patterns",
                &self.skip_branch_patterns,
            )?,
            labels: compile_patterns(
                scope,
                name,
                "skip_label_patterns",
                &self.skip_label_patterns,
            )?,
        };
        Ok(())
    }

    pub fn skips_author(&self, login: &str) -> bool {
        self.skip_authors.iter().any(|author| author == login)
    }

    /// First branch pattern matching `branch`, if any.
    pub fn matching_branch_pattern(&self, branch: &str) -> Option<&str> {
        self.compiled
            .branches
            .iter()
            .find(|pattern| pattern.is_match(branch))
            .map(Regex::as_str)
    }

    /// First `(label, pattern)` pair where the pattern matches the label.
    pub fn matching_label_pattern<'a, I>(&self, labels: I) -> Option<(&'a str, &str)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels.into_iter().find_map(|label| {
            self.compiled
                .labels
                .iter()
                .find(|pattern| pattern.is_match(label))
                .map(|pattern| (label, pattern.as_str()))
        })
    }

    pub fn head_note(&self) -> Option<&str> {
        self.output_head_note.as_deref()
    }
}

fn compile_patterns(
    scope: &str,
    task: &str,
    field: &'static str,
    patterns: &[String],
) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                scope: scope.to_string(),
                task: task.to_string(),
                field,
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Tasks for one repository or organization, ordered by task name.
pub type RepoTasks = BTreeMap<String, TaskConfig>;

#[derive(Debug, Clone, Default)]
/// Review tasks keyed by `org` or `org/repo` scope.
pub struct TasksConfig {
    scopes: HashMap<String, RepoTasks>,
}

impl TasksConfig {
    pub fn from_scopes(mut scopes: HashMap<String, RepoTasks>) -> Result<Self, ConfigError> {
        for (scope, tasks) in scopes.iter_mut() {
            for (name, task) in tasks.iter_mut() {
                task.prepare(scope, name)?;
            }
        }
        Ok(Self { scopes })
    }

    /// Repository tasks shadow organization tasks entirely.
    pub fn tasks_for(&self, org: &str, repo: &str) -> Option<&RepoTasks> {
        self.scopes
            .get(&format!("{org}/{repo}"))
            .or_else(|| self.scopes.get(org))
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl ConfigDocument for TasksConfig {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let scopes: Option<HashMap<String, RepoTasks>> = serde_yaml::from_str(raw)?;
        Self::from_scopes(scopes.unwrap_or_default())
    }
}
