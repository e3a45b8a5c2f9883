use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch};
use uuid::Uuid;

use crate::api::rest::identify;
use crate::auth::DISPATCH_ROLES;
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", patch(mark_read))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, AppError> {
    let caller = identify(&state, &headers, DISPATCH_ROLES)?;
    Ok(Json(state.store.list_notifications(&caller.user_id).await?))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Notification>, AppError> {
    identify(&state, &headers, DISPATCH_ROLES)?;

    let notification = state
        .store
        .mark_notification_read(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    Ok(Json(notification))
}
