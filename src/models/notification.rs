use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const KIND_CHAT_MESSAGE: &str = "CHAT_MESSAGE";
pub const SEVERITY_INFO: &str = "INFO";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    /// `None` addresses every dispatcher.
    #[serde(default)]
    pub target_user: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub trip_id: Option<String>,
    pub target_user: Option<String>,
}
