use crate::github_transport_helpers::truncate_for_error;

pub const PATCH_TOO_LARGE_NOTICE: &str =
    "Skipped the review: the change is too large for an automated review.";
pub const NOT_MERGEABLE_NOTICE: &str =
    "Skipped the review: this pull request is not mergeable. Please resolve the conflicts first.";

/// Render a reply that quotes the comment which triggered the run.
pub fn render_command_reply(
    author: &str,
    source_comment_url: &str,
    source_comment_body: &str,
    reply: &str,
) -> String {
    let quoted = source_comment_body
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "@{author}: {reply}\n\n<details>\n\n\
         In response to [this]({source_comment_url}):\n\n{quoted}\n</details>"
    )
}

/// Prefix the backend answer with the task's head note, when configured.
pub fn render_review_body(head_note: Option<&str>, review: &str) -> String {
    match head_note.map(str::trim_end).filter(|note| !note.is_empty()) {
        Some(note) => format!("{note}\n{review}"),
        None => review.to_string(),
    }
}

pub fn render_patch_too_large_notice(task: &str, patch_bytes: usize, limit_bytes: usize) -> String {
    format!(
        "{PATCH_TOO_LARGE_NOTICE}\n\n\
         _task `{task}` | patch `{patch_bytes}` bytes | limit `{limit_bytes}` bytes_"
    )
}

/// Render the comment body posted when a task fails.
pub fn render_task_failure_notice(task: &str, error_message: &str) -> String {
    format!(
        "The `{task}` review could not be completed.\n\nError: `{}`",
        truncate_for_error(error_message, 600)
    )
}
