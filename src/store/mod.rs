pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::chat::{ChatMessage, NewChatMessage};
use crate::models::driver::Driver;
use crate::models::location::GeoPoint;
use crate::models::notification::{NewNotification, Notification};
use crate::models::trip::{AssignmentStatus, Trip};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stale reference: {0}")]
    StaleReference(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid assignment transition from {from} to {to}")]
    InvalidTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    #[error("store call timed out after {0}ms")]
    Timeout(u64),
}

/// Narrow view of the durable record that the tracking core reads and writes.
/// Implementations own their own transaction discipline; callers never hold a
/// cache lock across these calls.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn find_driver(&self, driver_id: &str) -> Result<Option<Driver>, StoreError>;

    async fn update_driver_location(
        &self,
        driver_id: &str,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Loads a trip together with its orders and full assignment history.
    async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>, StoreError>;

    async fn list_trips(&self) -> Result<Vec<Trip>, StoreError>;

    /// Moves the trip's assignment for `driver_id` to `status`, enforcing the
    /// assignment lifecycle.
    async fn update_assignment_status(
        &self,
        trip_id: &str,
        driver_id: &str,
        status: AssignmentStatus,
    ) -> Result<(), StoreError>;

    async fn insert_chat_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError>;

    /// Oldest first.
    async fn list_chat_messages(&self, trip_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError>;

    /// Notifications addressed to `user` plus broadcast ones, newest first.
    async fn list_notifications(&self, user: &str) -> Result<Vec<Notification>, StoreError>;

    async fn mark_notification_read(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;
}
