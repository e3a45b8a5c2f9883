use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::{Order, PriorityLevel, Trip, TripStatus};

const URGENT_SLA_HOURS: i64 = 4;
const NORMAL_SLA_HOURS: i64 = 24;
const DUE_SOON_MINUTES: i64 = 240;
const AVERAGE_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Completed,
    Overdue,
    DueSoon,
    OnTrack,
    Unknown,
}

/// Deadline for one order carried by `trip`. Extensions granted on the trip
/// push every order's deadline. `None` when the stored values put the deadline
/// outside the representable range.
pub fn order_sla_due(order: &Order, trip: &Trip) -> Option<DateTime<Utc>> {
    let created_at = order.created_at?;
    let base_hours = match order.priority_level {
        PriorityLevel::Urgent => URGENT_SLA_HOURS,
        PriorityLevel::Normal => NORMAL_SLA_HOURS,
    };
    let extension = Duration::try_minutes(trip.sla_extension_minutes.unwrap_or(0))?;
    let window = Duration::try_hours(base_hours)?.checked_add(&extension)?;

    created_at.checked_add_signed(window)
}

/// The trip is bound by its most urgent order.
pub fn trip_sla_due(trip: &Trip) -> Option<DateTime<Utc>> {
    trip.orders
        .iter()
        .filter_map(|order| order_sla_due(order, trip))
        .min()
}

pub fn trip_eta(trip: &Trip) -> Option<DateTime<Utc>> {
    if let Some(arrival) = trip.scheduled_arrival {
        return Some(arrival);
    }

    let created_at = trip.created_at?;
    let distance_km = trip.distance_km?;
    if !distance_km.is_finite() || distance_km < 0.0 {
        return None;
    }

    let minutes = (distance_km / AVERAGE_SPEED_KMH * 60.0).trunc();
    if minutes >= i64::MAX as f64 {
        return None;
    }

    created_at.checked_add_signed(Duration::try_minutes(minutes as i64)?)
}

pub fn classify_risk(trip: &Trip, now: DateTime<Utc>) -> RiskLevel {
    if trip.status == TripStatus::Completed {
        return RiskLevel::Completed;
    }

    let Some(sla_due) = trip_sla_due(trip) else {
        return RiskLevel::Unknown;
    };

    let remaining = sla_due - now;
    if remaining < Duration::zero() {
        RiskLevel::Overdue
    } else if remaining < Duration::minutes(DUE_SOON_MINUTES) {
        RiskLevel::DueSoon
    } else {
        RiskLevel::OnTrack
    }
}
