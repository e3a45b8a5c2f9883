use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::auth::SessionIdentity;
use crate::models::location::{InboundLocation, LocationSample};
use crate::observability::metrics::Metrics;
use crate::store::{DurableStore, StoreError};
use crate::tracking::cache::LocationCache;
use crate::tracking::feeds::{FeedDelivery, LocationFeeds};

/// Reasons an inbound stream message is dropped. None of these reach the
/// sender; the stream has no acknowledgement channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestRejection {
    #[error("no authenticated identity on session")]
    Unauthenticated,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("missing trip reference")]
    MissingTripId,

    #[error("missing coordinates")]
    MissingCoordinates,

    #[error("coordinates out of range: lat={lat}, lng={lng}")]
    CoordinatesOutOfRange { lat: f64, lng: f64 },
}

impl IngestRejection {
    fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Malformed(_) => "malformed",
            Self::MissingTripId => "missing_trip",
            Self::MissingCoordinates => "missing_coordinates",
            Self::CoordinatesOutOfRange { .. } => "out_of_range",
        }
    }
}

/// Result of the two-sink write: the live view and feeds always move first,
/// the durable record only when the store cooperates.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub sample: LocationSample,
    pub cached: bool,
    pub persisted: bool,
    pub delivery: FeedDelivery,
}

pub struct LocationIngestor {
    cache: Arc<LocationCache>,
    feeds: Arc<LocationFeeds>,
    store: Arc<dyn DurableStore>,
    store_timeout: Duration,
    metrics: Metrics,
}

impl LocationIngestor {
    pub fn new(
        cache: Arc<LocationCache>,
        feeds: Arc<LocationFeeds>,
        store: Arc<dyn DurableStore>,
        store_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            cache,
            feeds,
            store,
            store_timeout,
            metrics,
        }
    }

    /// Entry point for raw stream frames. Rejections are logged and counted
    /// here so transports can ignore them.
    pub async fn receive(
        &self,
        raw: &str,
        session: Option<&SessionIdentity>,
    ) -> Result<IngestOutcome, IngestRejection> {
        let start = Instant::now();

        let result = match session {
            None => Err(IngestRejection::Unauthenticated),
            Some(identity) => match serde_json::from_str::<InboundLocation>(raw) {
                Ok(message) => self.ingest(identity, message).await,
                Err(err) => Err(IngestRejection::Malformed(err.to_string())),
            },
        };

        let outcome = match &result {
            Ok(_) => "accepted",
            Err(rejection) => {
                warn!(
                    user_id = session.map(|s| s.user_id.as_str()).unwrap_or("<none>"),
                    reason = %rejection,
                    "dropping location message"
                );
                rejection.label()
            }
        };
        self.metrics
            .location_updates_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .ingest_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    pub async fn ingest(
        &self,
        identity: &SessionIdentity,
        message: InboundLocation,
    ) -> Result<IngestOutcome, IngestRejection> {
        let trip_id = message
            .trip_id
            .filter(|trip_id| !trip_id.trim().is_empty())
            .ok_or(IngestRejection::MissingTripId)?;
        let (lat, lng) = match (message.latitude, message.longitude) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return Err(IngestRejection::MissingCoordinates),
        };
        if !valid_coordinates(lat, lng) {
            return Err(IngestRejection::CoordinatesOutOfRange { lat, lng });
        }

        if let Some(claimed) = message.driver_id.as_deref() {
            if claimed != identity.user_id {
                warn!(
                    user_id = %identity.user_id,
                    claimed_driver_id = %claimed,
                    "ignoring client-supplied driver id"
                );
            }
        }

        // Cache first so anyone reacting to the broadcast reads the new state.
        // Subscribers never wait on the durable write.
        let sample = self.cache.put(&identity.user_id, &trip_id, lat, lng);
        let delivery = self.feeds.publish(&sample);

        let (persisted, write_outcome) = match self.persist(&sample).await {
            Ok(true) => (true, "ok"),
            Ok(false) => {
                debug!(driver_id = %sample.driver_id, "no durable driver record for identity");
                (false, "no_record")
            }
            Err(err) => {
                warn!(
                    driver_id = %sample.driver_id,
                    trip_id = %sample.trip_id,
                    error = %err,
                    "durable location write failed; live stream continues"
                );
                (false, "error")
            }
        };
        self.metrics
            .durable_writes_total
            .with_label_values(&["location", write_outcome])
            .inc();

        debug!(
            driver_id = %sample.driver_id,
            trip_id = %sample.trip_id,
            persisted,
            global_subscribers = delivery.global,
            trip_subscribers = delivery.trip,
            "location ingested"
        );

        Ok(IngestOutcome {
            sample,
            cached: true,
            persisted,
            delivery,
        })
    }

    /// `Ok(false)` when there is no durable driver record for the identity.
    async fn persist(&self, sample: &LocationSample) -> Result<bool, StoreError> {
        let write = async {
            match self.store.find_driver(&sample.driver_id).await? {
                Some(driver) => {
                    self.store
                        .update_driver_location(&driver.id, sample.point(), Utc::now())
                        .await?;
                    Ok::<_, StoreError>(true)
                }
                None => Ok(false),
            }
        };

        timeout(self.store_timeout, write)
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout.as_millis() as u64))?
    }
}

fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{IngestRejection, LocationIngestor};
    use crate::auth::{Role, SessionIdentity};
    use crate::models::driver::Driver;
    use crate::observability::metrics::Metrics;
    use crate::store::{DurableStore, MemoryStore};
    use crate::tracking::cache::LocationCache;
    use crate::tracking::feeds::LocationFeeds;

    struct Harness {
        cache: Arc<LocationCache>,
        feeds: Arc<LocationFeeds>,
        store: Arc<MemoryStore>,
        ingestor: LocationIngestor,
    }

    fn harness() -> Harness {
        let cache = Arc::new(LocationCache::new(None));
        let feeds = Arc::new(LocationFeeds::new(16));
        let store = Arc::new(MemoryStore::new());
        store.insert_driver(Driver {
            id: "D1".to_string(),
            username: Some("dana".to_string()),
            name: "Dana".to_string(),
            last_location: None,
            location_updated_at: None,
        });

        let ingestor = LocationIngestor::new(
            cache.clone(),
            feeds.clone(),
            store.clone(),
            Duration::from_millis(500),
            Metrics::new(),
        );

        Harness {
            cache,
            feeds,
            store,
            ingestor,
        }
    }

    fn driver(id: &str) -> SessionIdentity {
        SessionIdentity {
            user_id: id.to_string(),
            role: Role::Driver,
        }
    }

    #[tokio::test]
    async fn accepted_message_updates_cache_store_and_feeds() {
        let h = harness();
        let mut global = h.feeds.subscribe_global();
        let mut trip = h.feeds.subscribe_trip("T9");

        let outcome = h
            .ingestor
            .receive(
                r#"{"tripId":"T9","latitude":10.0,"longitude":20.0}"#,
                Some(&driver("D1")),
            )
            .await
            .unwrap();

        assert!(outcome.cached);
        assert!(outcome.persisted);
        assert_eq!(outcome.delivery.global, 1);
        assert_eq!(outcome.delivery.trip, 1);
        assert_eq!(h.cache.latest("D1", "T9"), Some(outcome.sample.clone()));
        assert_eq!(global.recv().await.unwrap(), outcome.sample);
        assert_eq!(trip.recv().await.unwrap(), outcome.sample);

        let stored = h.store.find_driver("D1").await.unwrap().unwrap();
        let point = stored.last_location.unwrap();
        assert_eq!((point.lat, point.lng), (10.0, 20.0));
    }

    #[tokio::test]
    async fn claimed_driver_id_is_replaced_by_session_identity() {
        let h = harness();
        let mut global = h.feeds.subscribe_global();

        let outcome = h
            .ingestor
            .receive(
                r#"{"driverId":"MALLORY","tripId":"T9","latitude":1.0,"longitude":2.0}"#,
                Some(&driver("D1")),
            )
            .await
            .unwrap();

        assert_eq!(outcome.sample.driver_id, "D1");
        assert_eq!(global.recv().await.unwrap().driver_id, "D1");
        assert!(h.cache.latest("MALLORY", "T9").is_none());
        assert!(h.cache.latest("D1", "T9").is_some());
    }

    #[tokio::test]
    async fn durable_failure_still_caches_and_broadcasts() {
        let h = harness();
        h.store.fail_location_writes(true);
        let mut global = h.feeds.subscribe_global();

        let outcome = h
            .ingestor
            .receive(
                r#"{"tripId":"T9","latitude":1.0,"longitude":2.0}"#,
                Some(&driver("D1")),
            )
            .await
            .unwrap();

        assert!(outcome.cached);
        assert!(!outcome.persisted);
        assert_eq!(outcome.delivery.global, 1);
        assert!(h.cache.latest("D1", "T9").is_some());
        assert_eq!(global.recv().await.unwrap(), outcome.sample);

        let stored = h.store.find_driver("D1").await.unwrap().unwrap();
        assert!(stored.last_location.is_none());
    }

    #[tokio::test]
    async fn driver_lookup_failure_is_swallowed() {
        let h = harness();
        h.store.fail_driver_reads(true);

        let outcome = h
            .ingestor
            .receive(
                r#"{"tripId":"T9","latitude":1.0,"longitude":2.0}"#,
                Some(&driver("D1")),
            )
            .await
            .unwrap();

        assert!(!outcome.persisted);
        assert!(h.cache.latest("D1", "T9").is_some());
    }

    #[tokio::test]
    async fn unknown_driver_is_cached_but_not_persisted() {
        let h = harness();
        let outcome = h
            .ingestor
            .receive(
                r#"{"tripId":"T1","latitude":1.0,"longitude":2.0}"#,
                Some(&driver("D404")),
            )
            .await
            .unwrap();

        assert!(outcome.cached);
        assert!(!outcome.persisted);
        assert!(h.cache.latest("D404", "T1").is_some());
    }

    #[tokio::test]
    async fn rejected_messages_touch_nothing() {
        let h = harness();
        let mut global = h.feeds.subscribe_global();

        let cases = [
            (
                r#"{"tripId":"T9","latitude":1.0,"longitude":2.0}"#,
                None,
                IngestRejection::Unauthenticated,
            ),
            (
                r#"{"latitude":1.0,"longitude":2.0}"#,
                Some(driver("D1")),
                IngestRejection::MissingTripId,
            ),
            (
                r#"{"tripId":"T9","latitude":1.0}"#,
                Some(driver("D1")),
                IngestRejection::MissingCoordinates,
            ),
            (
                r#"{"tripId":"T9","latitude":91.0,"longitude":2.0}"#,
                Some(driver("D1")),
                IngestRejection::CoordinatesOutOfRange { lat: 91.0, lng: 2.0 },
            ),
        ];

        for (raw, session, expected) in cases {
            let err = h.ingestor.receive(raw, session.as_ref()).await.unwrap_err();
            assert_eq!(err, expected);
        }

        let err = h
            .ingestor
            .receive("not json", Some(&driver("D1")))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestRejection::Malformed(_)));

        assert!(h.cache.is_empty());
        assert!(global.try_recv().is_err());
    }

    #[tokio::test]
    async fn stalled_store_does_not_hold_back_subscribers() {
        let h = harness();
        h.store.stall_location_writes(true);
        let mut global = h.feeds.subscribe_global();
        let ingest_done = Cell::new(false);

        let identity = driver("D1");
        let ingest = async {
            let outcome = h
                .ingestor
                .receive(r#"{"tripId":"T9","latitude":1.0,"longitude":2.0}"#, Some(&identity))
                .await;
            ingest_done.set(true);
            outcome
        };
        let subscriber = async {
            let sample = global.recv().await.unwrap();
            (sample, ingest_done.get())
        };

        let (outcome, (sample, ingest_done_at_delivery)) = tokio::join!(ingest, subscriber);
        let outcome = outcome.unwrap();

        assert!(!ingest_done_at_delivery);
        assert_eq!(sample, outcome.sample);
        assert!(!outcome.persisted);
        assert_eq!(outcome.delivery.global, 1);
    }
}
