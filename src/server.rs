//! JSON HTTP server.
//!
//! Exposes the prompt finder to browser and chat front-ends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/search` | `{ "query": "..." }` → answer or no-match |
//! | `POST` | `/candidates` | `{ "query": "...", "threshold"?, "limit"? }` → selected prompts, no generation |
//! | `GET`  | `/stats` | Current index statistics |
//! | `POST` | `/refresh` | Force an index rebuild |
//!
//! # Response Contract
//!
//! `POST /search` always answers 200 when the pipeline ran, tagging the body
//! with a `status`:
//!
//! ```json
//! { "status": "answer", "answer": "...", "matches": [ { "id": "...", "title": "...", "score": 0.42 } ] }
//! { "status": "no_match", "message": "No relevant prompt found." }
//! ```
//!
//! Errors follow a single schema:
//!
//! ```json
//! { "error": { "code": "unavailable", "message": "knowledge base fetch failed: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::Error;
use crate::models::ScoredCandidate;
use crate::search::{PromptFinder, SearchOutcome};
use crate::stats::IndexStats;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    finder: Arc<PromptFinder>,
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let finder = Arc::new(PromptFinder::from_config(config)?);
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    serve(listener, finder).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, finder: Arc<PromptFinder>) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "prompt finder listening");
    axum::serve(listener, router(finder)).await?;
    Ok(())
}

/// Build the application router.
pub fn router(finder: Arc<PromptFinder>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/candidates", post(handle_candidates))
        .route("/stats", get(handle_stats))
        .route("/refresh", post(handle_refresh))
        .layer(cors)
        .with_state(AppState { finder })
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match err {
            Error::FetchFailure(_) | Error::GenerationFailure(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            Error::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::MalformedRecord { .. } | Error::EmptyVocabulary => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
struct MatchSummary {
    id: String,
    title: String,
    score: f64,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SearchResponse {
    Answer {
        answer: String,
        matches: Vec<MatchSummary>,
    },
    NoMatch {
        message: String,
    },
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = payload?;

    let response = match state.finder.search(&req.query).await? {
        SearchOutcome::NoMatch => SearchResponse::NoMatch {
            message: "No relevant prompt found.".to_string(),
        },
        SearchOutcome::Answer(answer) => SearchResponse::Answer {
            answer: answer.text,
            matches: answer
                .matches
                .into_iter()
                .map(|m| MatchSummary {
                    id: m.document.id,
                    title: m.document.title,
                    score: m.score,
                })
                .collect(),
        },
    };
    Ok(Json(response))
}

// ============ POST /candidates ============

#[derive(Deserialize)]
struct CandidatesRequest {
    query: String,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct CandidatesResponse {
    candidates: Vec<ScoredCandidate>,
}

async fn handle_candidates(
    State(state): State<AppState>,
    payload: Result<Json<CandidatesRequest>, JsonRejection>,
) -> Result<Json<CandidatesResponse>, AppError> {
    let Json(req) = payload?;

    let mut params = state.finder.select_params().clone();
    if let Some(t) = req.threshold {
        if !(0.0..1.0).contains(&t) {
            return Err(bad_request("threshold must be in [0.0, 1.0)"));
        }
        params.relevance_threshold = t;
    }
    if let Some(n) = req.limit {
        if n == 0 {
            return Err(bad_request("limit must be >= 1"));
        }
        params.max_results = n;
    }

    let candidates = state.finder.candidates_with(&req.query, &params).await?;
    Ok(Json(CandidatesResponse { candidates }))
}

// ============ GET /stats, POST /refresh ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(state.finder.stats().await?))
}

async fn handle_refresh(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(state.finder.refresh().await?))
}
