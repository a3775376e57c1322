//! GitHub-facing helpers for patchpal.
//! This crate provides the REST client used by the review dispatcher, webhook
//! payload parsing and signature verification, and comment rendering helpers.

pub mod github_api_client;
pub mod github_transport_helpers;
pub mod issue_comment;
pub mod pull_request;
pub mod review_command;
pub mod webhook_events;
pub mod webhook_signature;

pub use github_api_client::{
    GithubApiClient, GithubApiClientConfig, GithubCommentCreateResponse, GithubRequestError,
};
pub use pull_request::{GithubIssueComment, GithubLabel, GithubUser, PullRequest, PullRequestBranch};
pub use webhook_events::{
    parse_webhook, IssueCommentEvent, PullRequestEvent, WebhookEvent, WebhookParseError,
};
pub use issue_comment::{
    render_command_reply, render_patch_too_large_notice, render_review_body,
    render_task_failure_notice, NOT_MERGEABLE_NOTICE, PATCH_TOO_LARGE_NOTICE,
};
pub use review_command::{is_default_instruction, ReviewCommandMatcher, DEFAULT_INSTRUCTION_KEYWORD};
pub use webhook_signature::verify_github_sha256_signature;
