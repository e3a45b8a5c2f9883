pub mod locations;
pub mod notifications;
pub mod trips;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{Role, SessionIdentity, credential_from_request};
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(locations::router())
        .merge(trips::router())
        .merge(notifications::router())
        .merge(ws::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bearer-token identity for REST calls that act on behalf of a user.
pub(crate) fn identify(
    state: &AppState,
    headers: &HeaderMap,
    allowed: &[Role],
) -> Result<SessionIdentity, AppError> {
    let credential = credential_from_request(headers, None);
    Ok(state.authenticator.authenticate(credential, allowed)?)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    tracked_keys: usize,
    trip_feeds: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tracked_keys: state.cache.len(),
        trip_feeds: state.feeds.trip_feed_count(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
