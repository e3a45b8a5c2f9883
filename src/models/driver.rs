use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    /// Login name of the linked user account, used to address chat delivery.
    #[serde(default)]
    pub username: Option<String>,
    pub name: String,
    #[serde(default)]
    pub last_location: Option<GeoPoint>,
    #[serde(default)]
    pub location_updated_at: Option<DateTime<Utc>>,
}

impl Driver {
    /// Address of the driver's private chat channel.
    pub fn chat_address(&self) -> &str {
        match self.username.as_deref() {
            Some(username) if !username.trim().is_empty() => username,
            _ => &self.id,
        }
    }
}
