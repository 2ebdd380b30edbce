//! Test utilities for vaultsort-core
//!
//! This module provides a mock chat-completions server that can be used for
//! development and integration tests of the HTTP backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use crate::ai::reply_for_prompt;

/// How the mock server answers chat completion requests
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Classify the prompt's items with the keyword classifier
    Classify,
    /// Answer every request with this HTTP status
    AlwaysFail(u16),
    /// Fail the first `times` requests with `status`, then classify
    FailThenOk { times: usize, status: u16 },
    /// Return 429 with a `Retry-After` header the first `times` requests
    RateLimited { times: usize, retry_after_secs: u64 },
    /// Return a 200 whose body is not a completion
    Garbage,
    /// Return a completion whose content has no JSON array
    Prose,
    /// Wait before classifying
    Slow(Duration),
}

struct ServerState {
    mode: MockMode,
    requests: AtomicUsize,
    last_authorization: Mutex<Option<String>>,
    last_model: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

/// Mock OpenAI-style chat completions server
pub struct MockChatServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockChatServer {
    /// Start the mock server on an available port
    pub async fn start(mode: MockMode) -> Self {
        let state = Arc::new(ServerState {
            mode,
            requests: AtomicUsize::new(0),
            last_authorization: Mutex::new(None),
            last_model: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL for this mock server, including the API version segment
    pub fn url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Chat completion requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in arrival order
    pub fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }

    pub fn last_model(&self) -> Option<String> {
        self.state.last_model.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatRequestMessage {
    content: String,
}

/// Model listing endpoint (health check)
async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model"}]
    }))
}

/// Chat completions endpoint
async fn handle_chat(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    // Zero-based index of this request
    let n = state.requests.fetch_add(1, Ordering::SeqCst);

    *state.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_model.lock().unwrap() = Some(request.model.clone());

    let prompt = request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    state.prompts.lock().unwrap().push(prompt.clone());

    match state.mode {
        MockMode::Classify => completion(&request.model, &classify(&prompt)),
        MockMode::AlwaysFail(status) => error_status(status),
        MockMode::FailThenOk { times, status } if n < times => error_status(status),
        MockMode::FailThenOk { .. } => completion(&request.model, &classify(&prompt)),
        MockMode::RateLimited {
            times,
            retry_after_secs,
        } if n < times => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_secs.to_string())],
            "rate limited",
        )
            .into_response(),
        MockMode::RateLimited { .. } => completion(&request.model, &classify(&prompt)),
        MockMode::Garbage => (StatusCode::OK, "<html>upstream hiccup</html>").into_response(),
        MockMode::Prose => completion(&request.model, "Sorry, I can't categorize these."),
        MockMode::Slow(delay) => {
            tokio::time::sleep(delay).await;
            completion(&request.model, &classify(&prompt))
        }
    }
}

fn classify(prompt: &str) -> String {
    reply_for_prompt(prompt).unwrap_or_else(|| "[]".to_string())
}

fn error_status(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": {"message": "mock failure"}}))).into_response()
}

fn completion(model: &str, content: &str) -> Response {
    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}
