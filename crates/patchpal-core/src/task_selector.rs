//! Which configured tasks run for a review event.
//!
//! Lifecycle events run a scope's `always_run` tasks that no author, branch or
//! label rule skips. A command runs one task: the built-in default, or one
//! built from the command's free-form instruction.

use patchpal_github::{is_default_instruction, PullRequest};
use tracing::{debug, info};

use crate::tasks::{TaskConfig, TasksConfig};

#[derive(Debug, Clone, Copy)]
/// What caused a review: a pull request lifecycle event or a comment command.
pub enum SelectionTrigger<'a> {
    Lifecycle { pull_request: &'a PullRequest },
    Command { instruction: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `SkipReason` values.
pub enum SkipReason {
    Author { login: String },
    BaseBranch { branch: String, pattern: String },
    Label { label: String, pattern: String },
}

impl SkipReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Author { .. } => "task_skipped_author",
            Self::BaseBranch { .. } => "task_skipped_base_branch",
            Self::Label { .. } => "task_skipped_label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub task: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
/// Tasks to run, in order, plus the tasks suppressed by skip rules.
pub struct Selection {
    pub tasks: Vec<TaskConfig>,
    pub skipped: Vec<SkippedTask>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub fn select_tasks(
    snapshot: &TasksConfig,
    org: &str,
    repo: &str,
    trigger: SelectionTrigger<'_>,
) -> Selection {
    let pull_request = match trigger {
        SelectionTrigger::Command { instruction } => {
            let task = if is_default_instruction(instruction) {
                TaskConfig::builtin_default()
            } else {
                TaskConfig::from_instruction(instruction)
            };
            return Selection {
                tasks: vec![task],
                skipped: Vec::new(),
            };
        }
        SelectionTrigger::Lifecycle { pull_request } => pull_request,
    };

    let Some(configured) = snapshot.tasks_for(org, repo) else {
        debug!(org, repo, "no tasks configured for repository or organization");
        return Selection::default();
    };

    let mut selection = Selection::default();
    for task in configured.values().filter(|task| task.always_run) {
        match skip_reason(task, pull_request) {
            Some(reason) => {
                info!(
                    org,
                    repo,
                    task = %task.name,
                    reason_code = reason.reason_code(),
                    "review task skipped"
                );
                selection.skipped.push(SkippedTask {
                    task: task.name.clone(),
                    reason,
                });
            }
            None => selection.tasks.push(task.clone()),
        }
    }
    selection
}

/// Evaluate skip rules in order: author, base branch, labels.
pub fn skip_reason(task: &TaskConfig, pull_request: &PullRequest) -> Option<SkipReason> {
    let author = pull_request.user.login.as_str();
    if task.skips_author(author) {
        return Some(SkipReason::Author {
            login: author.to_string(),
        });
    }
    let branch = pull_request.base.ref_name.as_str();
    if let Some(pattern) = task.matching_branch_pattern(branch) {
        return Some(SkipReason::BaseBranch {
            branch: branch.to_string(),
            pattern: pattern.to_string(),
        });
    }
    task.matching_label_pattern(pull_request.label_names())
        .map(|(label, pattern)| SkipReason::Label {
            label: label.to_string(),
            pattern: pattern.to_string(),
        })
}
