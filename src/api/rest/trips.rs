use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::api::rest::identify;
use crate::auth::{ANY_ROLE, DRIVER_ONLY};
use crate::engine::risk::TripRiskSnapshot;
use crate::error::AppError;
use crate::models::chat::ChatMessage;
use crate::models::trip::AssignmentStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips/risk", get(list_trip_risk))
        .route("/trips/:trip_id/risk", get(get_trip_risk))
        .route("/trips/:trip_id/chat", get(chat_history).post(send_chat))
        .route("/trips/:trip_id/assignment", patch(update_assignment))
}

#[derive(Deserialize)]
pub struct SendChatRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateAssignmentRequest {
    pub status: AssignmentStatus,
}

async fn list_trip_risk(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TripRiskSnapshot>>, AppError> {
    Ok(Json(state.risk.open_snapshots(Utc::now()).await?))
}

async fn get_trip_risk(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripRiskSnapshot>, AppError> {
    Ok(Json(state.risk.snapshot(&trip_id, Utc::now()).await?))
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    identify(&state, &headers, ANY_ROLE)?;
    Ok(Json(state.chat.history(&trip_id).await?))
}

async fn send_chat(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SendChatRequest>,
) -> Result<Json<ChatMessage>, AppError> {
    let sender = identify(&state, &headers, ANY_ROLE)?;
    let message = state.chat.send(&trip_id, &sender, &payload.content).await?;
    Ok(Json(message))
}

/// A driver moves their own assignment along its lifecycle; the response is
/// the trip's snapshot as the resolver now sees it.
async fn update_assignment(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateAssignmentRequest>,
) -> Result<Json<TripRiskSnapshot>, AppError> {
    let driver = identify(&state, &headers, DRIVER_ONLY)?;
    if let AssignmentStatus::Other(raw) = &payload.status {
        return Err(AppError::BadRequest(format!("unknown assignment status {raw:?}")));
    }

    state
        .store
        .update_assignment_status(&trip_id, &driver.user_id, payload.status.clone())
        .await?;
    info!(
        trip_id = %trip_id,
        driver_id = %driver.user_id,
        status = %payload.status,
        "assignment status updated"
    );

    Ok(Json(state.risk.snapshot(&trip_id, Utc::now()).await?))
}
