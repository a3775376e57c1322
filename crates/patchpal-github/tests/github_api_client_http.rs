use httpmock::prelude::*;
use patchpal_github::{GithubApiClient, GithubApiClientConfig, GithubRequestError};
use serde_json::json;

fn test_client(base_url: String, dry_run: bool) -> GithubApiClient {
    let mut config = GithubApiClientConfig::new(base_url, "test-token");
    config.request_timeout_ms = 5_000;
    config.retry_max_attempts = 3;
    config.retry_base_delay_ms = 1;
    config.dry_run = dry_run;
    GithubApiClient::new(config).expect("github client")
}

#[tokio::test]
async fn integration_get_pull_request_decodes_review_fields() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widget/pulls/7")
            .header("authorization", "Bearer test-token")
            .header("accept", "application/vnd.github+json");
        then.status(200).json_body(json!({
            "number": 7,
            "title": "Add widget",
            "body": "Implements the widget.",
            "user": {"login": "octocat"},
            "base": {"ref": "release-1.0"},
            "labels": [{"name": "kind/feature"}],
            "draft": false,
            "mergeable": true
        }));
    });

    let client = test_client(server.base_url(), false);
    let pr = client
        .get_pull_request("acme", "widget", 7)
        .await
        .expect("pull request");
    mock.assert();
    assert_eq!(pr.title, "Add widget");
    assert_eq!(pr.base.ref_name, "release-1.0");
    assert_eq!(pr.mergeable, Some(true));
}

#[tokio::test]
async fn integration_get_pull_request_patch_requests_patch_media_type() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widget/pulls/7")
            .header("accept", "application/vnd.github.v3.patch");
        then.status(200).body("From 1234 Mon Sep 17 00:00:00 2001\n+fn main() {}\n");
    });

    let client = test_client(server.base_url(), false);
    let patch = client
        .get_pull_request_patch("acme", "widget", 7)
        .await
        .expect("patch");
    mock.assert();
    assert!(patch.starts_with(b"From 1234"));
}

#[tokio::test]
async fn integration_create_issue_comment_posts_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/widget/issues/7/comments")
            .json_body_includes(json!({"body": "review text"}).to_string());
        then.status(201).json_body(json!({
            "id": 99,
            "html_url": "https://github.com/acme/widget/pull/7#issuecomment-99"
        }));
    });

    let client = test_client(server.base_url(), false);
    let created = client
        .create_issue_comment("acme", "widget", 7, "review text")
        .await
        .expect("comment")
        .expect("comment response");
    mock.assert();
    assert_eq!(created.id, 99);
}

#[tokio::test]
async fn functional_create_issue_comment_dry_run_skips_http_call() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/repos/acme/widget/issues/7/comments");
        then.status(201).json_body(json!({"id": 1}));
    });

    let client = test_client(server.base_url(), true);
    assert!(client.is_dry_run());
    let created = client
        .create_issue_comment("acme", "widget", 7, "review text")
        .await
        .expect("dry-run comment");
    assert!(created.is_none());
    mock.assert_calls(0);
}

#[tokio::test]
async fn regression_request_retries_server_errors_until_attempts_exhausted() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widget/pulls/7");
        then.status(502).body("bad gateway");
    });

    let client = test_client(server.base_url(), false);
    let error = client
        .get_pull_request("acme", "widget", 7)
        .await
        .expect_err("server error should surface");
    mock.assert_calls(3);
    assert!(error.to_string().contains("status 502"));
    let request_error = error
        .downcast_ref::<GithubRequestError>()
        .expect("typed github error");
    assert!(request_error.is_transient());
}

#[tokio::test]
async fn regression_request_does_not_retry_client_errors() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widget/pulls/404");
        then.status(404).json_body(json!({"message": "Not Found"}));
    });

    let client = test_client(server.base_url(), false);
    let error = client
        .get_pull_request("acme", "widget", 404)
        .await
        .expect_err("not found should surface");
    mock.assert_calls(1);
    assert!(error.to_string().contains("Not Found"));
    assert!(matches!(
        error.downcast_ref::<GithubRequestError>(),
        Some(GithubRequestError::Status { status: 404, .. })
    ));
}
