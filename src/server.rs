//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, engine state, and row count |
//! | `POST` | `/search` | Retrieval only: context text plus the best-matching record |
//! | `POST` | `/ask` | Retrieval plus generation |
//!
//! Request body for `/search` and `/ask`:
//!
//! ```json
//! { "question": "How many daily prayers are there?", "top_k": 5 }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `encoding_failed` | 400 |
//! | `timeout` | 408 |
//! | `internal` | 500 |
//! | `generation_failed` | 502 |
//! | `not_ready` | 503 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use qa_context_core::error::RetrievalError;
use qa_context_core::models::RetrievalResponse;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::ask::{AskResponse, AskService};
use crate::config::Config;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    service: AskService,
    timeout: Duration,
}

/// Starts the HTTP server on `[server].bind`.
///
/// The engine is loaded before the listener binds; a load failure is
/// returned and the server never starts.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = AskService::from_config(config).await?;
    let app = router(
        service,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("qactx server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over a ready [`AskService`].
pub fn router(service: AskService, timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .layer(cors)
        .with_state(AppState { service, timeout })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let status = match err {
            RetrievalError::Encoding(_) => StatusCode::BAD_REQUEST,
            RetrievalError::NotReady(_) | RetrievalError::Load(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RetrievalError::Generation(_) => StatusCode::BAD_GATEWAY,
            RetrievalError::DimensionMismatch { .. } | RetrievalError::EmptyResultSet => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "request failed");
        }
        let code = match err {
            RetrievalError::Load(_) => "not_ready",
            ref other => other.code(),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

/// Run `fut` under the request timeout.
async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, RetrievalError>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(timeout_error(format!("request exceeded {:?}", limit))),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    state: String,
    rows: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.service.engine();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: engine.state().to_string(),
        rows: engine.corpus().map(|c| c.len()).unwrap_or(0),
    })
}

// ============ POST /search, POST /ask ============

#[derive(Debug, Deserialize)]
struct QuestionRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

impl QuestionRequest {
    fn validate(
        body: Result<Json<QuestionRequest>, JsonRejection>,
    ) -> Result<QuestionRequest, AppError> {
        let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
        if req.question.trim().is_empty() {
            return Err(bad_request("question must not be empty"));
        }
        if req.top_k == Some(0) {
            return Err(bad_request("top_k must be >= 1"));
        }
        Ok(req)
    }
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<RetrievalResponse>, AppError> {
    let req = QuestionRequest::validate(body)?;
    let top_k = req.top_k.unwrap_or(state.service.default_top_k());
    let result = with_timeout(
        state.timeout,
        state.service.engine().query(&req.question, top_k),
    )
    .await?;
    Ok(Json(result.to_response()))
}

async fn handle_ask(
    State(state): State<AppState>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let req = QuestionRequest::validate(body)?;
    let response = with_timeout(state.timeout, state.service.ask(&req.question, req.top_k)).await?;
    Ok(Json(response))
}
