//! Turns parsed webhook deliveries into review events.

use patchpal_github::webhook_events::ISSUE_COMMENT_ACTION_CREATED;
use patchpal_github::{GithubIssueComment, PullRequest, ReviewCommandMatcher, WebhookEvent};

#[derive(Debug, Clone, PartialEq)]
/// A webhook delivery reduced to the pull request it concerns and why.
pub struct ReviewEvent {
    pub org: String,
    pub repo: String,
    pub number: u64,
    pub trigger: ReviewTrigger,
}

#[derive(Debug, Clone, PartialEq)]
/// Enumerates supported `ReviewTrigger` values.
pub enum ReviewTrigger {
    Lifecycle {
        pull_request: PullRequest,
    },
    Command {
        comment: GithubIssueComment,
        instruction: String,
    },
}

impl ReviewTrigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lifecycle { .. } => "lifecycle",
            Self::Command { .. } => "command",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reasons a delivery does not start a review.
pub enum IntakeSkip {
    CommentActionIgnored,
    CommentNotOnPullRequest,
    CommentNotACommand,
    PullRequestActionIgnored,
    PullRequestDraft,
    PullRequestNotMergeable,
}

impl IntakeSkip {
    pub fn reason_code(self) -> &'static str {
        match self {
            Self::CommentActionIgnored => "intake_comment_action_ignored",
            Self::CommentNotOnPullRequest => "intake_comment_not_on_pull_request",
            Self::CommentNotACommand => "intake_comment_not_a_command",
            Self::PullRequestActionIgnored => "intake_pull_request_action_ignored",
            Self::PullRequestDraft => "intake_pull_request_draft",
            Self::PullRequestNotMergeable => "intake_pull_request_not_mergeable",
        }
    }
}

pub fn review_event_from_webhook(
    event: WebhookEvent,
    matcher: &ReviewCommandMatcher,
) -> Result<ReviewEvent, IntakeSkip> {
    match event {
        WebhookEvent::IssueComment(event) => {
            if event.action != ISSUE_COMMENT_ACTION_CREATED {
                return Err(IntakeSkip::CommentActionIgnored);
            }
            if !event.issue.is_pull_request() {
                return Err(IntakeSkip::CommentNotOnPullRequest);
            }
            let instruction = matcher
                .instruction(&event.comment.body)
                .ok_or(IntakeSkip::CommentNotACommand)?
                .to_string();
            Ok(ReviewEvent {
                org: event.repository.owner.login,
                repo: event.repository.name,
                number: event.issue.number,
                trigger: ReviewTrigger::Command {
                    comment: event.comment,
                    instruction,
                },
            })
        }
        WebhookEvent::PullRequest(event) => {
            if !event.is_reviewable_action() {
                return Err(IntakeSkip::PullRequestActionIgnored);
            }
            if event.pull_request.draft {
                return Err(IntakeSkip::PullRequestDraft);
            }
            if event.pull_request.mergeable == Some(false) {
                return Err(IntakeSkip::PullRequestNotMergeable);
            }
            Ok(ReviewEvent {
                org: event.repository.owner.login,
                repo: event.repository.name,
                number: event.number,
                trigger: ReviewTrigger::Lifecycle {
                    pull_request: event.pull_request,
                },
            })
        }
    }
}
