use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use serde::Serialize;

use crate::engine::risk::LocationSource;
use crate::error::AppError;
use crate::models::location::LocationSample;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/locations/:driver_id/:trip_id/latest", get(latest_location))
        .route("/locations/:driver_id/:trip_id/history", get(location_history))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestLocationResponse {
    #[serde(flatten)]
    pub sample: LocationSample,
    pub source: LocationSource,
}

async fn latest_location(
    State(state): State<Arc<AppState>>,
    Path((driver_id, trip_id)): Path<(String, String)>,
) -> Result<Json<LatestLocationResponse>, AppError> {
    if let Some(sample) = state.cache.latest(&driver_id, &trip_id) {
        return Ok(Json(LatestLocationResponse {
            sample,
            source: LocationSource::Live,
        }));
    }

    // The durable record only knows the driver's last position, not per trip.
    let point = state
        .store
        .find_driver(&driver_id)
        .await?
        .and_then(|driver| driver.last_location)
        .ok_or_else(|| {
            AppError::NotFound(format!("no location for driver {driver_id} on trip {trip_id}"))
        })?;

    Ok(Json(LatestLocationResponse {
        sample: LocationSample::new(driver_id, trip_id, point.lat, point.lng),
        source: LocationSource::Durable,
    }))
}

async fn location_history(
    State(state): State<Arc<AppState>>,
    Path((driver_id, trip_id)): Path<(String, String)>,
) -> Json<Vec<LocationSample>> {
    Json(state.cache.history(&driver_id, &trip_id))
}
