//! GitHub webhook payload parsing.
//!
//! Only `issue_comment` and `pull_request` deliveries are decoded; every other
//! event type parses to `Ok(None)` and is ignored by the caller.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::pull_request::{GithubIssueComment, PullRequest};

pub const ISSUE_COMMENT_ACTION_CREATED: &str = "created";
pub const PULL_REQUEST_ACTION_OPENED: &str = "opened";
pub const PULL_REQUEST_ACTION_SYNCHRONIZE: &str = "synchronize";
pub const PULL_REQUEST_ACTION_REOPENED: &str = "reopened";

#[derive(Debug, Error)]
/// Enumerates supported `WebhookParseError` values.
pub enum WebhookParseError {
    #[error("malformed {event_type} payload: {source}")]
    Json {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
/// Repository owner/name pair present on every delivery.
pub struct WebhookRepository {
    pub owner: WebhookOwner,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WebhookOwner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WebhookIssue {
    pub number: u64,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

impl WebhookIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
/// Public struct `IssueCommentEvent` used across patchpal components.
pub struct IssueCommentEvent {
    pub action: String,
    pub issue: WebhookIssue,
    pub comment: GithubIssueComment,
    pub repository: WebhookRepository,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
/// Public struct `PullRequestEvent` used across patchpal components.
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: WebhookRepository,
}

impl PullRequestEvent {
    /// Lifecycle actions that carry new code to review.
    pub fn is_reviewable_action(&self) -> bool {
        matches!(
            self.action.as_str(),
            PULL_REQUEST_ACTION_OPENED
                | PULL_REQUEST_ACTION_SYNCHRONIZE
                | PULL_REQUEST_ACTION_REOPENED
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Enumerates supported `WebhookEvent` values.
pub enum WebhookEvent {
    IssueComment(IssueCommentEvent),
    PullRequest(PullRequestEvent),
}

/// Parse a webhook payload by its `X-GitHub-Event` type.
pub fn parse_webhook(
    event_type: &str,
    payload: &[u8],
) -> Result<Option<WebhookEvent>, WebhookParseError> {
    match event_type {
        "issue_comment" => serde_json::from_slice::<IssueCommentEvent>(payload)
            .map(|event| Some(WebhookEvent::IssueComment(event)))
            .map_err(|source| WebhookParseError::Json {
                event_type: "issue_comment",
                source,
            }),
        "pull_request" => serde_json::from_slice::<PullRequestEvent>(payload)
            .map(|event| Some(WebhookEvent::PullRequest(event)))
            .map_err(|source| WebhookParseError::Json {
                event_type: "pull_request",
                source,
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_webhook, WebhookEvent, WebhookParseError};

    const ISSUE_COMMENT_PAYLOAD: &str = r#"{
        "action": "created",
        "issue": {"number": 42, "pull_request": {"url": "https://api.github.com/x"}},
        "comment": {
            "id": 9,
            "body": "/review default",
            "user": {"login": "octocat"},
            "html_url": "https://github.com/acme/widget/pull/42#issuecomment-9"
        },
        "repository": {"owner": {"login": "acme"}, "name": "widget"}
    }"#;

    #[test]
    fn functional_parse_webhook_decodes_issue_comment() {
        let parsed = parse_webhook("issue_comment", ISSUE_COMMENT_PAYLOAD.as_bytes())
            .expect("parse")
            .expect("known event");
        let WebhookEvent::IssueComment(event) = parsed else {
            panic!("expected issue comment event");
        };
        assert_eq!(event.action, "created");
        assert!(event.issue.is_pull_request());
        assert_eq!(event.comment.user.login, "octocat");
        assert_eq!(event.repository.owner.login, "acme");
    }

    #[test]
    fn functional_parse_webhook_decodes_pull_request_lifecycle() {
        let payload = r#"{
            "action": "synchronize",
            "number": 5,
            "pull_request": {
                "number": 5,
                "title": "t",
                "user": {"login": "dev"},
                "base": {"ref": "main"},
                "draft": true
            },
            "repository": {"owner": {"login": "acme"}, "name": "widget"}
        }"#;
        let parsed = parse_webhook("pull_request", payload.as_bytes())
            .expect("parse")
            .expect("known event");
        let WebhookEvent::PullRequest(event) = parsed else {
            panic!("expected pull request event");
        };
        assert!(event.is_reviewable_action());
        assert!(event.pull_request.draft);
    }

    #[test]
    fn unit_parse_webhook_ignores_unknown_event_types() {
        assert!(parse_webhook("push", b"{}").expect("parse").is_none());
    }

    #[test]
    fn regression_parse_webhook_reports_malformed_payloads() {
        let error = parse_webhook("pull_request", b"{\"action\":").expect_err("malformed");
        assert!(matches!(
            error,
            WebhookParseError::Json {
                event_type: "pull_request",
                ..
            }
        ));
    }
}
