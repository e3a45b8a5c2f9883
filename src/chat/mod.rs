use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::{Role, SessionIdentity};
use crate::engine::resolver::resolve_assigned_driver;
use crate::error::AppError;
use crate::models::chat::{ChatMessage, NewChatMessage};
use crate::models::notification::{KIND_CHAT_MESSAGE, NewNotification, SEVERITY_INFO};
use crate::observability::metrics::Metrics;
use crate::store::DurableStore;
use crate::tracking::feeds::Topics;

/// Private per-driver chat channels plus the shared dispatch channel.
pub struct ChatChannels {
    drivers: Topics<ChatMessage>,
    dispatch_tx: broadcast::Sender<ChatMessage>,
}

impl ChatChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (dispatch_tx, _unused_rx) = broadcast::channel(buffer_size.max(1));

        Self {
            drivers: Topics::new(buffer_size),
            dispatch_tx,
        }
    }

    pub fn subscribe_driver(&self, address: &str) -> broadcast::Receiver<ChatMessage> {
        self.drivers.subscribe(address)
    }

    pub fn release_driver(&self, address: &str) -> bool {
        self.drivers.release(address)
    }

    pub fn subscribe_dispatch(&self) -> broadcast::Receiver<ChatMessage> {
        self.dispatch_tx.subscribe()
    }

    fn deliver_to_driver(&self, address: &str, message: &ChatMessage) -> usize {
        self.drivers.publish(address, message.clone())
    }

    fn broadcast_dispatch(&self, message: &ChatMessage) -> usize {
        self.dispatch_tx.send(message.clone()).unwrap_or(0)
    }
}

pub struct ChatRelay {
    store: Arc<dyn DurableStore>,
    channels: Arc<ChatChannels>,
    metrics: Metrics,
}

impl ChatRelay {
    pub fn new(store: Arc<dyn DurableStore>, channels: Arc<ChatChannels>, metrics: Metrics) -> Self {
        Self {
            store,
            channels,
            metrics,
        }
    }

    /// Persists a trip message addressed to the trip's driver, then fans it out.
    ///
    /// The stored message is the result; live delivery and the dispatcher
    /// notification are best effort and never fail the call.
    pub async fn send(
        &self,
        trip_id: &str,
        sender: &SessionIdentity,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("message content cannot be empty".to_string()));
        }

        let trip = self
            .store
            .load_trip(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        let recipient = resolve_assigned_driver(&trip.assignments)
            .and_then(|a| a.driver_id.clone())
            .ok_or_else(|| AppError::NoAssignedDriver(trip_id.to_string()))?;

        let message = self
            .store
            .insert_chat_message(NewChatMessage {
                trip_id: trip.id.clone(),
                sender_username: sender.user_id.clone(),
                sender_role: sender.role,
                recipient_driver_id: recipient.clone(),
                content: content.to_string(),
            })
            .await
            .inspect_err(|_| {
                self.metrics
                    .durable_writes_total
                    .with_label_values(&["chat", "error"])
                    .inc();
            })?;
        self.metrics
            .durable_writes_total
            .with_label_values(&["chat", "ok"])
            .inc();
        self.metrics
            .chat_messages_total
            .with_label_values(&[sender.role.as_str()])
            .inc();

        let address = self.driver_address(&recipient).await;
        let delivered = self.channels.deliver_to_driver(&address, &message);
        debug!(trip_id = %trip.id, address = %address, delivered, "chat delivered to driver channel");

        if sender.role == Role::Driver {
            self.notify_dispatch(&message).await;
        }

        info!(
            trip_id = %message.trip_id,
            sender = %message.sender_username,
            recipient = %message.recipient_driver_id,
            "chat message stored"
        );

        Ok(message)
    }

    pub async fn history(&self, trip_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        if self.store.load_trip(trip_id).await?.is_none() {
            return Err(AppError::NotFound(format!("trip {trip_id} not found")));
        }
        Ok(self.store.list_chat_messages(trip_id).await?)
    }

    /// Username when the driver record has one, else the driver id.
    async fn driver_address(&self, driver_id: &str) -> String {
        match self.store.find_driver(driver_id).await {
            Ok(Some(driver)) => driver.chat_address().to_string(),
            Ok(None) => driver_id.to_string(),
            Err(err) => {
                warn!(driver_id = %driver_id, error = %err, "driver lookup failed; addressing by id");
                driver_id.to_string()
            }
        }
    }

    async fn notify_dispatch(&self, message: &ChatMessage) {
        let listeners = self.channels.broadcast_dispatch(message);
        debug!(trip_id = %message.trip_id, listeners, "chat forwarded to dispatch channel");

        let notification = NewNotification {
            kind: KIND_CHAT_MESSAGE.to_string(),
            severity: SEVERITY_INFO.to_string(),
            title: format!("New message on trip {}", message.trip_id),
            message: format!("{}: {}", message.sender_username, message.content),
            trip_id: Some(message.trip_id.clone()),
            target_user: None,
        };

        let outcome = match self.store.insert_notification(notification).await {
            Ok(_) => "ok",
            Err(err) => {
                warn!(trip_id = %message.trip_id, error = %err, "failed to persist chat notification");
                "error"
            }
        };
        self.metrics
            .durable_writes_total
            .with_label_values(&["notification", outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ChatChannels, ChatRelay};
    use crate::auth::{Role, SessionIdentity};
    use crate::error::AppError;
    use crate::models::driver::Driver;
    use crate::models::trip::{AssignmentStatus, Trip, TripAssignment, TripStatus};
    use crate::observability::metrics::Metrics;
    use crate::store::{DurableStore, MemoryStore};

    fn trip(assignments: Vec<(Option<&str>, AssignmentStatus)>) -> Trip {
        Trip {
            id: "T1".to_string(),
            status: TripStatus::InProgress,
            created_at: None,
            scheduled_departure: None,
            scheduled_arrival: None,
            actual_departure: None,
            actual_arrival: None,
            distance_km: None,
            sla_extension_minutes: None,
            delay_reason: None,
            route_id: None,
            vehicle_id: None,
            orders: Vec::new(),
            assignments: assignments
                .into_iter()
                .map(|(driver, status)| TripAssignment {
                    driver_id: driver.map(str::to_string),
                    trip_id: "T1".to_string(),
                    status,
                    vehicle_id: None,
                })
                .collect(),
        }
    }

    fn setup(t: Trip) -> (Arc<MemoryStore>, Arc<ChatChannels>, ChatRelay) {
        let store = Arc::new(MemoryStore::new());
        store.insert_trip(t);
        store.insert_driver(Driver {
            id: "D2".to_string(),
            username: Some("dana".to_string()),
            name: "Dana".to_string(),
            last_location: None,
            location_updated_at: None,
        });
        let channels = Arc::new(ChatChannels::new(16));
        let relay = ChatRelay::new(store.clone(), channels.clone(), Metrics::new());
        (store, channels, relay)
    }

    fn identity(user: &str, role: Role) -> SessionIdentity {
        SessionIdentity {
            user_id: user.to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn dispatcher_message_reaches_driver_without_notification() {
        let (store, channels, relay) = setup(trip(vec![
            (Some("D1"), AssignmentStatus::Completed),
            (Some("D2"), AssignmentStatus::InProgress),
        ]));
        let mut driver_rx = channels.subscribe_driver("dana");
        let mut dispatch_rx = channels.subscribe_dispatch();

        let message = relay
            .send("T1", &identity("ops-1", Role::Dispatcher), "  gate 4 please ")
            .await
            .unwrap();

        assert_eq!(message.recipient_driver_id, "D2");
        assert_eq!(message.content, "gate 4 please");
        assert_eq!(driver_rx.recv().await.unwrap().id, message.id);
        assert!(dispatch_rx.try_recv().is_err());
        assert_eq!(store.notification_count(), 0);
    }

    #[tokio::test]
    async fn driver_message_notifies_dispatch() {
        let (store, channels, relay) = setup(trip(vec![(Some("D2"), AssignmentStatus::Accepted)]));
        let mut dispatch_rx = channels.subscribe_dispatch();

        let message = relay
            .send("T1", &identity("D2", Role::Driver), "stuck in traffic")
            .await
            .unwrap();

        assert_eq!(dispatch_rx.recv().await.unwrap().id, message.id);

        let notifications = store.list_notifications("ops-1").await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].trip_id.as_deref(), Some("T1"));
        assert!(notifications[0].target_user.is_none());
        assert!(!notifications[0].is_read);
    }

    #[tokio::test]
    async fn driver_without_username_is_addressed_by_id() {
        let (_store, channels, relay) = setup(trip(vec![(Some("D9"), AssignmentStatus::Assigned)]));
        let mut by_id = channels.subscribe_driver("D9");

        relay
            .send("T1", &identity("ops-1", Role::Admin), "hello")
            .await
            .unwrap();

        assert_eq!(by_id.recv().await.unwrap().recipient_driver_id, "D9");
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_send() {
        let (store, _channels, relay) = setup(trip(vec![(Some("D2"), AssignmentStatus::Accepted)]));
        store.fail_notification_writes(true);

        let message = relay
            .send("T1", &identity("D2", Role::Driver), "eta 10 min")
            .await
            .unwrap();

        assert_eq!(relay.history("T1").await.unwrap()[0].id, message.id);
        assert_eq!(store.notification_count(), 0);
    }

    #[tokio::test]
    async fn trip_without_driver_is_a_resolution_failure() {
        let (_store, _channels, relay) = setup(trip(vec![(None, AssignmentStatus::Assigned)]));

        let err = relay
            .send("T1", &identity("ops-1", Role::Dispatcher), "anyone?")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoAssignedDriver(_)));
        assert!(relay.history("T1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_persistence_failure_is_surfaced() {
        let (store, _channels, relay) = setup(trip(vec![(Some("D2"), AssignmentStatus::Accepted)]));
        store.fail_chat_writes(true);

        let err = relay
            .send("T1", &identity("ops-1", Role::Dispatcher), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn rejects_empty_content_and_unknown_trip() {
        let (_store, _channels, relay) = setup(trip(vec![(Some("D2"), AssignmentStatus::Accepted)]));
        let sender = identity("ops-1", Role::Dispatcher);

        assert!(matches!(
            relay.send("T1", &sender, "   ").await.unwrap_err(),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            relay.send("T404", &sender, "hi").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn released_driver_channel_is_dropped_once_unsubscribed() {
        let channels = ChatChannels::new(16);
        let rx = channels.subscribe_driver("dana");
        assert!(!channels.release_driver("dana"));

        drop(rx);
        assert!(channels.release_driver("dana"));
    }
}
