use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityLevel {
    #[default]
    Normal,
    Urgent,
}

/// Lifecycle of a driver's assignment to a trip.
///
/// Stored records carry free-form status text; anything unrecognised is kept
/// verbatim in `Other` and never takes part in a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Declined,
    Cancelled,
    Other(String),
}

impl AssignmentStatus {
    pub fn parse(raw: &str) -> Self {
        match normalize_status(raw).as_str() {
            "assigned" => Self::Assigned,
            "accepted" => Self::Accepted,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "declined" => Self::Declined,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Other(raw) => raw,
        }
    }

    /// Someone is currently working the trip under this assignment.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::Accepted | Self::InProgress)
    }

    pub fn can_transition_to(&self, next: &AssignmentStatus) -> bool {
        use AssignmentStatus::*;

        matches!(
            (self, next),
            (Assigned, Accepted)
                | (Assigned, Declined)
                | (Assigned, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

impl From<String> for AssignmentStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<AssignmentStatus> for String {
    fn from(status: AssignmentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TripStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
    Other(String),
}

impl TripStatus {
    pub fn parse(raw: &str) -> Self {
        match normalize_status(raw).as_str() {
            "planned" | "scheduled" => Self::Planned,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for TripStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<TripStatus> for String {
    fn from(status: TripStatus) -> Self {
        status.as_str().to_string()
    }
}

fn normalize_status(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
        .replace("inprogress", "in_progress")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripAssignment {
    #[serde(default)]
    pub driver_id: Option<String>,
    pub trip_id: String,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub vehicle_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub priority_level: PriorityLevel,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Carried for the order desk; deadlines use the trip-level extension.
    #[serde(default)]
    pub sla_extension_minutes: Option<i64>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    pub trip_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub status: TripStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub sla_extension_minutes: Option<i64>,
    #[serde(default)]
    pub delay_reason: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub orders: Vec<Order>,
    /// Append-only reassignment history, oldest first.
    #[serde(default)]
    pub assignments: Vec<TripAssignment>,
}

impl Trip {
    pub fn is_closed(&self) -> bool {
        matches!(self.status, TripStatus::Completed | TripStatus::Cancelled)
    }
}
