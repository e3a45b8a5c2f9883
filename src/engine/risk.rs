use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::resolver::resolve_active_assignment;
use crate::engine::sla::{RiskLevel, classify_risk, trip_eta, trip_sla_due};
use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::trip::{AssignmentStatus, Trip};
use crate::store::DurableStore;
use crate::tracking::cache::LocationCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Live,
    Durable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDriver {
    pub id: String,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_source: Option<LocationSource>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRiskSnapshot {
    pub trip_id: String,
    pub trip_status: String,
    pub risk: RiskLevel,
    pub sla_due: Option<DateTime<Utc>>,
    pub eta: Option<DateTime<Utc>>,
    pub resolved_driver: Option<ResolvedDriver>,
    pub resolved_vehicle: Option<String>,
    pub assignment_status: Option<AssignmentStatus>,
    pub delay_reason: Option<String>,
}

/// Derives SLA, ETA and risk for trips and merges in where the resolved
/// driver is, live positions first.
pub struct RiskEngine {
    cache: Arc<LocationCache>,
    store: Arc<dyn DurableStore>,
}

impl RiskEngine {
    pub fn new(cache: Arc<LocationCache>, store: Arc<dyn DurableStore>) -> Self {
        Self { cache, store }
    }

    pub async fn snapshot(
        &self,
        trip_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TripRiskSnapshot, AppError> {
        let trip = self
            .store
            .load_trip(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        Ok(self.build(&trip, now).await)
    }

    /// Snapshots for every trip still open, most urgent deadline first.
    pub async fn open_snapshots(&self, now: DateTime<Utc>) -> Result<Vec<TripRiskSnapshot>, AppError> {
        let trips = self.store.list_trips().await?;

        let mut snapshots = Vec::new();
        for trip in trips.iter().filter(|trip| !trip.is_closed()) {
            snapshots.push(self.build(trip, now).await);
        }

        // Trips without a deadline sort last.
        snapshots.sort_by_key(|s| (s.sla_due.is_none(), s.sla_due));
        Ok(snapshots)
    }

    async fn build(&self, trip: &Trip, now: DateTime<Utc>) -> TripRiskSnapshot {
        let assignment = resolve_active_assignment(&trip.assignments);

        let resolved_driver = match assignment.and_then(|a| a.driver_id.as_deref()) {
            Some(driver_id) => Some(self.locate_driver(driver_id, &trip.id).await),
            None => None,
        };

        let resolved_vehicle = assignment
            .and_then(|a| a.vehicle_id.clone())
            .or_else(|| trip.vehicle_id.clone());

        TripRiskSnapshot {
            trip_id: trip.id.clone(),
            trip_status: trip.status.as_str().to_string(),
            risk: classify_risk(trip, now),
            sla_due: trip_sla_due(trip),
            eta: trip_eta(trip),
            resolved_driver,
            resolved_vehicle,
            assignment_status: assignment.map(|a| a.status.clone()),
            delay_reason: trip.delay_reason.clone(),
        }
    }

    async fn locate_driver(&self, driver_id: &str, trip_id: &str) -> ResolvedDriver {
        let live = self.cache.latest(driver_id, trip_id).map(|sample| sample.point());

        // With a live position the durable record only contributes the name.
        let durable = match self.store.find_driver(driver_id).await {
            Ok(driver) => driver,
            Err(err) if live.is_some() => {
                debug!(driver_id = %driver_id, error = %err, "driver name unavailable");
                None
            }
            Err(err) => {
                warn!(driver_id = %driver_id, error = %err, "driver lookup failed");
                None
            }
        };
        let name = durable.as_ref().map(|d| d.name.clone());

        let (point, source) = match live {
            Some(point) => (Some(point), Some(LocationSource::Live)),
            None => match durable.and_then(|d| d.last_location) {
                Some(point) => (Some(point), Some(LocationSource::Durable)),
                None => (None, None),
            },
        };

        ResolvedDriver {
            id: driver_id.to_string(),
            name,
            latitude: point.map(|p: GeoPoint| p.lat),
            longitude: point.map(|p: GeoPoint| p.lng),
            location_source: source,
        }
    }
}
