//! Test doubles: a scripted authorization server and recording browsers
//!
//! `ScriptedAuthServer` is a real axum server on `127.0.0.1:0`. Poll and
//! refresh replies are taken from queues in order; an empty poll queue
//! answers `pending` forever. Hit counters let tests assert how many
//! requests a flow issued, including "none at all".

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::browser::BrowserLauncher;
use crate::error::{Error, Result};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with this JSON body.
    Json(Value),
    /// Arbitrary status code with this JSON body.
    Status(u16, Value),
    /// 200 with a body that is not JSON.
    Garbage,
    /// Sleep before answering `pending`; used to trip request timeouts.
    Stall(Duration),
}

impl Reply {
    pub fn pending() -> Self {
        Reply::Json(json!({"status": "pending"}))
    }

    pub fn success(access_token: &str) -> Self {
        Reply::Json(json!({"status": "success", "access_token": access_token}))
    }

    pub fn error(message: &str) -> Self {
        Reply::Json(json!({"status": "error", "message": message}))
    }

    async fn render(self) -> Response {
        match self {
            Reply::Json(body) => (StatusCode::OK, axum::Json(body)).into_response(),
            Reply::Status(code, body) => {
                let status =
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, axum::Json(body)).into_response()
            }
            Reply::Garbage => (StatusCode::OK, "<html>not json</html>").into_response(),
            Reply::Stall(delay) => {
                tokio::time::sleep(delay).await;
                (StatusCode::OK, axum::Json(json!({"status": "pending"}))).into_response()
            }
        }
    }
}

#[derive(Default)]
struct ServerState {
    poll_script: Mutex<VecDeque<Reply>>,
    refresh_script: Mutex<VecDeque<Reply>>,
    polls: AtomicUsize,
    refreshes: AtomicUsize,
    starts: AtomicUsize,
    request_ids: Mutex<Vec<String>>,
    refresh_tokens: Mutex<Vec<String>>,
}

/// Scripted stand-in for the external authorization service.
pub struct ScriptedAuthServer {
    origin: String,
    state: Arc<ServerState>,
    _handle: tokio::task::JoinHandle<()>,
}

impl ScriptedAuthServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind scripted auth server");
        let addr = listener.local_addr().expect("local addr");

        let app = Router::new().fallback(dispatch).with_state(state.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            origin: format!("http://{addr}"),
            state,
            _handle: handle,
        }
    }

    /// Base URL for a service mounted at `/{path}`.
    pub fn base_url(&self, path: &str) -> String {
        format!("{}/{}", self.origin, path.trim_start_matches('/'))
    }

    /// Queue replies for successive `get-token` polls.
    pub fn script_polls(&self, replies: impl IntoIterator<Item = Reply>) {
        lock(&self.state.poll_script).extend(replies);
    }

    /// Queue replies for successive `refresh-token` calls.
    pub fn script_refreshes(&self, replies: impl IntoIterator<Item = Reply>) {
        lock(&self.state.refresh_script).extend(replies);
    }

    pub fn polls(&self) -> usize {
        self.state.polls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    /// Direct hits on `start` (the browser normally makes these).
    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    /// Total requests of every kind.
    pub fn total_requests(&self) -> usize {
        self.polls() + self.refreshes() + self.starts()
    }

    /// `request_id` values seen on polls, in order.
    pub fn polled_request_ids(&self) -> Vec<String> {
        lock(&self.state.request_ids).clone()
    }

    /// `refresh_token` values seen on refresh calls, in order.
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        lock(&self.state.refresh_tokens).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn dispatch(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let path = uri.path();

    if path.ends_with("/get-token") {
        state.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = params.get("request_id") {
            lock(&state.request_ids).push(id.clone());
        }
        let reply = lock(&state.poll_script)
            .pop_front()
            .unwrap_or_else(Reply::pending);
        reply.render().await
    } else if path.ends_with("/refresh-token") {
        state.refreshes.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = params.get("refresh_token") {
            lock(&state.refresh_tokens).push(token.clone());
        }
        let reply = lock(&state.refresh_script)
            .pop_front()
            .unwrap_or_else(|| Reply::error("no refresh scripted"));
        reply.render().await
    } else if path.ends_with("/start") {
        state.starts.fetch_add(1, Ordering::SeqCst);
        (StatusCode::OK, "authorize in this window").into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Records every URL it is asked to open; optionally fails each launch.
#[derive(Default)]
pub struct RecordingBrowser {
    opened: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher whose every launch fails, after recording the URL.
    pub fn failing() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        lock(&self.opened).push(url.to_owned());
        if self.fail {
            return Err(Error::BrowserLaunchFailed("no display available".into()));
        }
        Ok(())
    }
}
