//! Read-only REST endpoints over the decision log.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::DatabaseError;
use crate::store::DecisionLog;
use crate::taxonomy::Disposition;

/// Shared state for dashboard routes.
#[derive(Clone)]
pub struct DashboardState {
    pub log: Arc<DecisionLog>,
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    limit: Option<u64>,
}

const DEFAULT_RECENT_LIMIT: u64 = 3;

/// GET /api/decisions
///
/// All recorded decisions, most recent first.
async fn list_decisions(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.log.list_all().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => db_error(e),
    }
}

/// GET /api/decisions/recent?limit=N
///
/// The N most recent decisions (default 3).
async fn recent_decisions(
    State(state): State<DashboardState>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    match state.log.list_recent(limit as usize).await {
        Ok(records) => Json(records).into_response(),
        Err(DatabaseError::InvalidLimit) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "limit must be greater than zero"})),
        )
            .into_response(),
        Err(e) => db_error(e),
    }
}

/// GET /api/decisions/action/{name}
///
/// Decisions filtered by disposition. Unrecognized names resolve the same
/// way stored values do, so this never 404s on the name itself.
async fn decisions_by_action(
    State(state): State<DashboardState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let disposition = Disposition::parse(&name);
    match state.log.list_by_disposition(disposition).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => db_error(e),
    }
}

fn db_error(e: DatabaseError) -> axum::response::Response {
    error!(error = %e, "Dashboard query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "database query failed"})),
    )
        .into_response()
}

/// Build the dashboard routes.
pub fn dashboard_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/api/decisions", get(list_decisions))
        .route("/api/decisions/recent", get(recent_decisions))
        .route("/api/decisions/action/{name}", get(decisions_by_action))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the dashboard until the process exits.
pub async fn serve(state: DashboardState, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!(port, "Dashboard server started");
    axum::serve(listener, dashboard_routes(state)).await
}
