//! Tool-call surface
//!
//! Every tool answers HTTP 200 with a structured outcome; failures are
//! reported in the body, never as a transport error. Malformed request
//! JSON is rejected by the extractor before a tool runs.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use token_auth::{CredentialStore, Document, TokenFile};
use token_resolver::{OutcomeStatus, TokenResolver, ToolOutcome};
use tracing::{Instrument, info, info_span, warn};

use crate::metrics;

pub const READ_CREDENTIALS_TOOL: &str = "get-tokens-api-keys-credentials-from-store";
pub const GET_AUTH_TOKEN_TOOL: &str = "get-auth-token";
pub const GET_AUTH_TOKEN_TO_FILE_TOOL: &str = "get-auth-token-to-file";

/// Shared state for all tool handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TokenResolver>,
    pub store: Arc<CredentialStore>,
    pub started_at: Instant,
    pub calls_served: Arc<AtomicU64>,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(
        resolver: TokenResolver,
        store: CredentialStore,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            store: Arc::new(store),
            started_at: Instant::now(),
            calls_served: Arc::new(AtomicU64::new(0)),
            prometheus,
        }
    }
}

/// Build the router. At most `max_connections` calls run at once; the rest queue.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route(
            &format!("/tools/{READ_CREDENTIALS_TOOL}"),
            post(read_credentials_handler),
        )
        .route(
            &format!("/tools/{GET_AUTH_TOKEN_TOOL}"),
            post(get_auth_token_handler),
        )
        .route(
            &format!("/tools/{GET_AUTH_TOKEN_TO_FILE_TOOL}"),
            post(get_auth_token_to_file_handler),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct GetAuthTokenRequest {
    pub url: String,
    #[serde(default)]
    pub force_generate_token: bool,
}

#[derive(Debug, Deserialize)]
pub struct GetAuthTokenToFileRequest {
    pub url: String,
    pub path: PathBuf,
}

/// `{"status":"success","credentials":{...}}` or `{"status":"error","message":"..."}`.
#[derive(Debug, Serialize)]
pub struct CredentialsOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome types that carry a success/error status for metrics.
trait Reported {
    fn status(&self) -> OutcomeStatus;
}

impl Reported for ToolOutcome {
    fn status(&self) -> OutcomeStatus {
        self.status
    }
}

impl Reported for CredentialsOutcome {
    fn status(&self) -> OutcomeStatus {
        self.status
    }
}

/// Run one tool call inside a `call_<uuid>` span and record its metrics.
async fn traced_call<T, F>(state: &AppState, tool: &'static str, call: F) -> T
where
    T: Reported,
    F: Future<Output = T>,
{
    let call_id = format!("call_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("tool_call", call_id = %call_id, tool);
    let started = Instant::now();

    let outcome = call.instrument(span.clone()).await;

    let status = outcome.status().label();
    let elapsed = started.elapsed();
    metrics::record_tool_call(tool, status, elapsed.as_secs_f64());
    state.calls_served.fetch_add(1, Ordering::Relaxed);
    span.in_scope(|| {
        info!(
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "tool call finished"
        )
    });
    outcome
}

async fn read_credentials_handler(State(state): State<AppState>) -> Json<CredentialsOutcome> {
    let outcome = traced_call(&state, READ_CREDENTIALS_TOOL, async {
        match state.store.load_or_create().await {
            Ok(credentials) => CredentialsOutcome {
                status: OutcomeStatus::Success,
                credentials: Some(credentials),
                message: None,
            },
            Err(e) => {
                warn!(error = %e, "reading credential store failed");
                CredentialsOutcome {
                    status: OutcomeStatus::Error,
                    credentials: None,
                    message: Some(e.to_string()),
                }
            }
        }
    })
    .await;
    Json(outcome)
}

async fn get_auth_token_handler(
    State(state): State<AppState>,
    Json(request): Json<GetAuthTokenRequest>,
) -> Json<ToolOutcome> {
    let outcome = traced_call(&state, GET_AUTH_TOKEN_TOOL, async {
        state
            .resolver
            .resolve_outcome(
                &request.url,
                request.force_generate_token,
                state.store.as_ref(),
            )
            .await
    })
    .await;
    Json(outcome)
}

async fn get_auth_token_to_file_handler(
    State(state): State<AppState>,
    Json(request): Json<GetAuthTokenToFileRequest>,
) -> Json<ToolOutcome> {
    let sink = TokenFile::new(request.path);
    let outcome = traced_call(&state, GET_AUTH_TOKEN_TO_FILE_TOOL, async {
        state.resolver.resolve_outcome(&request.url, false, &sink).await
    })
    .await;
    Json(outcome)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "store_path": state.store.path().display().to_string(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "calls_served": state.calls_served.load(Ordering::Relaxed),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
