use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub trip_id: String,
    pub sender_username: String,
    pub sender_role: Role,
    pub recipient_driver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub trip_id: String,
    pub sender_username: String,
    pub sender_role: Role,
    pub recipient_driver_id: String,
    pub content: String,
}
