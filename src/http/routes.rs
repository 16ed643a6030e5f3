//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::store::leaderboard::LEADERBOARD_CAPACITY;
use crate::store::LeaderboardEntry;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::ServerInfo;

/// Requests other than the websocket upgrade give up after this long
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/leaderboard/:id", get(best_time_handler))
        .route("/server-info", get(server_info_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.client_origins))
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// Origins from `CLIENT_ORIGIN`; any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<header::HeaderValue> = origins
        .iter()
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        sessions: state.server.stats().sessions(),
    })
}

async fn server_info_handler(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(state.server.info())
}

// ============================================================================
// Leaderboard endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let limit = query.limit.unwrap_or(LEADERBOARD_CAPACITY);
    if limit == 0 || limit > LEADERBOARD_CAPACITY {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {LEADERBOARD_CAPACITY}"
        )));
    }
    let mut entries = state.store.leaderboard();
    entries.truncate(limit);
    Ok(Json(entries))
}

#[derive(Serialize)]
struct BestTimeResponse {
    id: String,
    time: f64,
}

async fn best_time_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BestTimeResponse>, AppError> {
    let time = state
        .store
        .best_time(&id)
        .ok_or_else(|| AppError::NotFound(format!("no time recorded for {id}")))?;
    Ok(Json(BestTimeResponse { id, time }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
