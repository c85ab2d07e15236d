//! Local HTTP host: the side-by-side compare page, prompt history, and a
//! streaming compare endpoint.
//!
//! `POST /api/compare` answers with Server-Sent Events, one `outcome` event
//! per target in completion order, followed by a single `done` event.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{Method, StatusCode, header},
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::fanout::{Aggregator, OutcomeReport, Submission, TargetOutcome};
use crate::providers::ProviderTarget;

/// Shared state for every handler.
pub struct ServerState {
    pub aggregator: Aggregator,
    pub targets: Vec<ProviderTarget>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index_handler))
        .route("/app.js", get(js_handler))
        .route("/api/history", get(history_handler))
        .route("/api/save-prompt", post(save_prompt_handler))
        .route("/api/targets", get(targets_handler))
        .route("/api/compare", post(compare_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: Arc<ServerState>) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| format!("Failed to bind to {addr}: {err}"))?;
    let local_addr = listener.local_addr().unwrap_or(addr);
    tracing::info!(%local_addr, "compare server listening");
    eprintln!("Server running at: http://{local_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("compare server shutting down");
        })
        .await
        .map_err(|err| format!("Server error: {err}"))
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("static/index.html"))
}

async fn js_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("static/app.js"),
    )
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    order: Option<String>,
}

async fn history_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<String>> {
    let log = state.aggregator.history().snapshot();
    let prompts = match query.order.as_deref() {
        Some("newest_first") => log.newest_first(),
        _ => log.oldest_first().to_vec(),
    };
    Json(prompts)
}

#[derive(Debug, Deserialize)]
struct SavePromptRequest {
    #[serde(default)]
    prompt: String,
}

async fn save_prompt_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SavePromptRequest>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing prompt".to_string()));
    }
    let log = state.aggregator.history().record(prompt);
    Ok(Json(log.oldest_first().to_vec()))
}

async fn targets_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<ProviderTarget>> {
    Json(state.targets.clone())
}

#[derive(Debug, Deserialize)]
struct CompareRequest {
    #[serde(default)]
    prompt: String,
    targets: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(error: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
}

async fn compare_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CompareRequest>,
) -> Response {
    let targets = match select(&state.targets, req.targets.as_deref()) {
        Ok(targets) => targets,
        Err(error) => return bad_request(error),
    };
    let submission = match state.aggregator.submit(&req.prompt, &targets) {
        Ok(submission) => submission,
        Err(err) => return bad_request(err.to_string()),
    };

    Sse::new(outcome_stream(submission))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn select(
    configured: &[ProviderTarget],
    ids: Option<&[String]>,
) -> Result<Vec<ProviderTarget>, String> {
    let Some(ids) = ids else {
        return Ok(configured.to_vec());
    };
    if let Some(unknown) = ids
        .iter()
        .find(|id| !configured.iter().any(|target| &target.id == *id))
    {
        return Err(format!("Unknown target '{unknown}'."));
    }
    Ok(configured
        .iter()
        .map(|target| target.clone().enabled(ids.contains(&target.id)))
        .collect())
}

struct StreamState {
    submission: Option<Submission>,
    succeeded: usize,
    failed: usize,
}

fn outcome_stream(submission: Submission) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        submission: Some(submission),
        succeeded: 0,
        failed: 0,
    };
    stream::unfold(initial, |mut state| async move {
        let mut submission = state.submission.take()?;
        match submission.next_outcome().await {
            Some(outcome) => {
                if outcome.outcome.is_success() {
                    state.succeeded += 1;
                } else {
                    state.failed += 1;
                }
                state.submission = Some(submission);
                Some((Ok(outcome_event(&outcome)), state))
            }
            None => {
                let done = Event::default()
                    .event("done")
                    .data(json!({"succeeded": state.succeeded, "failed": state.failed}).to_string());
                Some((Ok(done), state))
            }
        }
    })
}

fn outcome_event(outcome: &TargetOutcome) -> Event {
    Event::default()
        .event("outcome")
        .json_data(OutcomeReport::from(outcome))
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to encode outcome event");
            Event::default().comment("unencodable outcome")
        })
}
