//! GitHub webhook endpoint.
//!
//! Deliveries are verified, parsed and acknowledged right away; the review
//! itself runs on its own tokio task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use patchpal_core::{review_event_from_webhook, Dispatcher};
use patchpal_github::webhook_signature::{
    GITHUB_DELIVERY_HEADER, GITHUB_EVENT_HEADER, GITHUB_SIGNATURE_HEADER,
};
use patchpal_github::{parse_webhook, verify_github_sha256_signature, ReviewCommandMatcher};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub const HOOK_ENDPOINT: &str = "/hook";
pub const HEALTH_ENDPOINT: &str = "/healthz";
const EVENT_RECEIVED_MESSAGE: &str = "Event received. Have a nice day.";

/// Shared state for the webhook handlers.
pub struct WebhookServerState {
    pub dispatcher: Dispatcher,
    pub matcher: ReviewCommandMatcher,
    pub hmac_secret: Vec<u8>,
}

pub fn build_webhook_router(state: Arc<WebhookServerState>) -> Router {
    Router::new()
        .route(HOOK_ENDPOINT, post(handle_hook))
        .route(HEALTH_ENDPOINT, get(handle_healthz))
        .with_state(state)
}

pub async fn run_webhook_server(
    bind_addr: SocketAddr,
    state: Arc<WebhookServerState>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind webhook server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound webhook server address")?;
    info!(addr = %local_addr, endpoint = HOOK_ENDPOINT, "webhook server listening");

    axum::serve(listener, build_webhook_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("webhook server exited unexpectedly")
}

async fn handle_healthz() -> &'static str {
    "ok"
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn handle_hook(
    State(state): State<Arc<WebhookServerState>>,
    headers: HeaderMap,
    payload: Bytes,
) -> Response {
    let Some(event_type) = header_str(&headers, GITHUB_EVENT_HEADER).map(str::to_string) else {
        return (StatusCode::BAD_REQUEST, "missing X-GitHub-Event header").into_response();
    };
    let delivery = header_str(&headers, GITHUB_DELIVERY_HEADER)
        .unwrap_or_default()
        .to_string();
    let Some(signature) = header_str(&headers, GITHUB_SIGNATURE_HEADER) else {
        warn!(event_type, delivery, reason_code = "webhook_signature_missing", "rejected webhook");
        return (StatusCode::FORBIDDEN, "missing X-Hub-Signature-256 header").into_response();
    };
    if let Err(error) = verify_github_sha256_signature(&payload, signature, &state.hmac_secret) {
        warn!(
            event_type,
            delivery,
            reason_code = "webhook_signature_invalid",
            error = %error,
            "rejected webhook"
        );
        return (StatusCode::FORBIDDEN, "invalid webhook signature").into_response();
    }

    match parse_webhook(&event_type, &payload) {
        Ok(Some(event)) => match review_event_from_webhook(event, &state.matcher) {
            Ok(review_event) => {
                info!(
                    event_type,
                    delivery,
                    org = %review_event.org,
                    repo = %review_event.repo,
                    number = review_event.number,
                    trigger = review_event.trigger.kind(),
                    "dispatching review event"
                );
                let dispatcher = state.dispatcher.clone();
                tokio::spawn(async move {
                    let report = dispatcher.dispatch(review_event).await;
                    info!(
                        delivery,
                        org = %report.org,
                        repo = %report.repo,
                        number = report.number,
                        tasks = report.tasks.len(),
                        skipped = report.skipped.len(),
                        comments = report.comments_published(),
                        "review event finished"
                    );
                });
            }
            Err(skip) => debug!(
                event_type,
                delivery,
                reason_code = skip.reason_code(),
                "webhook ignored"
            ),
        },
        Ok(None) => debug!(event_type, delivery, "skipping unsupported event type"),
        Err(parse_error) => error!(
            event_type,
            delivery,
            reason_code = "webhook_payload_invalid",
            error = %parse_error,
            "failed to parse webhook payload"
        ),
    }

    (StatusCode::OK, EVENT_RECEIVED_MESSAGE).into_response()
}
