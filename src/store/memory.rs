use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::models::chat::{ChatMessage, NewChatMessage};
use crate::models::driver::Driver;
use crate::models::location::GeoPoint;
use crate::models::notification::{NewNotification, Notification};
use crate::models::trip::{AssignmentStatus, Trip};
use crate::store::{DurableStore, StoreError};

#[derive(Debug, Default, Deserialize)]
struct SeedData {
    #[serde(default)]
    drivers: Vec<Driver>,
    #[serde(default)]
    trips: Vec<Trip>,
}

/// Process-local durable store. Backs local runs and tests; each `fail_*`
/// switch makes the matching operations fail with `StoreError::Unavailable`.
#[derive(Default)]
pub struct MemoryStore {
    drivers: DashMap<String, Driver>,
    trips: DashMap<String, Trip>,
    chat: DashMap<String, Vec<ChatMessage>>,
    notifications: DashMap<Uuid, Notification>,
    fail_driver_reads: AtomicBool,
    fail_location_writes: AtomicBool,
    stall_location_writes: AtomicBool,
    fail_chat_writes: AtomicBool,
    fail_notification_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::Unavailable(format!("failed to read seed {}: {err}", path.display()))
        })?;
        let seed: SeedData = serde_json::from_str(&raw).map_err(|err| {
            StoreError::Unavailable(format!("invalid seed {}: {err}", path.display()))
        })?;

        let store = Self::new();
        let (drivers, trips) = (seed.drivers.len(), seed.trips.len());
        seed.drivers.into_iter().for_each(|d| store.insert_driver(d));
        seed.trips.into_iter().for_each(|t| store.insert_trip(t));

        info!(path = %path.display(), drivers, trips, "durable store seeded");
        Ok(store)
    }

    pub fn insert_driver(&self, driver: Driver) {
        self.drivers.insert(driver.id.clone(), driver);
    }

    pub fn insert_trip(&self, trip: Trip) {
        self.trips.insert(trip.id.clone(), trip);
    }

    pub fn fail_driver_reads(&self, fail: bool) {
        self.fail_driver_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_location_writes(&self, fail: bool) {
        self.fail_location_writes.store(fail, Ordering::SeqCst);
    }

    /// Location writes never complete while set; callers see their timeout.
    pub fn stall_location_writes(&self, stall: bool) {
        self.stall_location_writes.store(stall, Ordering::SeqCst);
    }

    pub fn fail_chat_writes(&self, fail: bool) {
        self.fail_chat_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }
}

fn check(flag: &AtomicBool, operation: &str) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable(format!("{operation} rejected")));
    }
    Ok(())
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn find_driver(&self, driver_id: &str) -> Result<Option<Driver>, StoreError> {
        check(&self.fail_driver_reads, "driver lookup")?;
        Ok(self.drivers.get(driver_id).map(|entry| entry.value().clone()))
    }

    async fn update_driver_location(
        &self,
        driver_id: &str,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        check(&self.fail_location_writes, "driver location update")?;
        if self.stall_location_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let mut driver = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| StoreError::StaleReference(format!("driver {driver_id} is gone")))?;
        driver.last_location = Some(location);
        driver.location_updated_at = Some(at);
        Ok(())
    }

    async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>, StoreError> {
        Ok(self.trips.get(trip_id).map(|entry| entry.value().clone()))
    }

    async fn list_trips(&self) -> Result<Vec<Trip>, StoreError> {
        let mut trips: Vec<Trip> = self
            .trips
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        trips.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(trips)
    }

    async fn update_assignment_status(
        &self,
        trip_id: &str,
        driver_id: &str,
        status: AssignmentStatus,
    ) -> Result<(), StoreError> {
        let mut trip = self
            .trips
            .get_mut(trip_id)
            .ok_or_else(|| StoreError::NotFound(format!("trip {trip_id} not found")))?;

        // The newest record for the driver is the one still in play.
        let assignment = trip
            .assignments
            .iter_mut()
            .rev()
            .find(|a| a.driver_id.as_deref() == Some(driver_id))
            .ok_or_else(|| {
                StoreError::NotFound(format!("driver {driver_id} is not assigned to {trip_id}"))
            })?;

        if !assignment.status.can_transition_to(&status) {
            return Err(StoreError::InvalidTransition {
                from: assignment.status.clone(),
                to: status,
            });
        }

        assignment.status = status;
        Ok(())
    }

    async fn insert_chat_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        check(&self.fail_chat_writes, "chat insert")?;

        let stored = ChatMessage {
            id: Uuid::new_v4(),
            trip_id: message.trip_id,
            sender_username: message.sender_username,
            sender_role: message.sender_role,
            recipient_driver_id: message.recipient_driver_id,
            content: message.content,
            created_at: Utc::now(),
        };

        self.chat
            .entry(stored.trip_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_chat_messages(&self, trip_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .chat
            .get(trip_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        check(&self.fail_notification_writes, "notification insert")?;

        let stored = Notification {
            id: Uuid::new_v4(),
            kind: notification.kind,
            severity: notification.severity,
            title: notification.title,
            message: notification.message,
            trip_id: notification.trip_id,
            target_user: notification.target_user,
            is_read: false,
            created_at: Utc::now(),
        };

        self.notifications.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_notifications(&self, user: &str) -> Result<Vec<Notification>, StoreError> {
        let mut visible: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| match entry.target_user.as_deref() {
                None => true,
                Some(target) => target == user,
            })
            .map(|entry| entry.value().clone())
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visible)
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.notifications.get_mut(&id).map(|mut entry| {
            entry.is_read = true;
            entry.clone()
        }))
    }
}
