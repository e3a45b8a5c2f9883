use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::models::location::LocationSample;

/// Receiver counts reached by one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedDelivery {
    pub global: usize,
    pub trip: usize,
}

/// Lazily created broadcast channels addressed by key. A channel whose last
/// subscriber is gone is dropped on the next publish to it, or when the
/// departing subscriber calls `release`.
pub struct Topics<T> {
    txs: DashMap<String, broadcast::Sender<T>>,
    buffer_size: usize,
}

impl<T: Clone> Topics<T> {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            txs: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<T> {
        self.txs
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Returns how many receivers got the value.
    pub fn publish(&self, key: &str, value: T) -> usize {
        let delivered = match self.txs.get(key) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            self.txs.remove_if(key, |_, tx| tx.receiver_count() == 0);
        }

        delivered
    }

    /// Drops the channel for `key` once nobody is subscribed to it.
    pub fn release(&self, key: &str) -> bool {
        self.txs
            .remove_if(key, |_, tx| tx.receiver_count() == 0)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

/// Global location feed plus one feed per trip.
pub struct LocationFeeds {
    global_tx: broadcast::Sender<LocationSample>,
    trips: Topics<LocationSample>,
}

impl LocationFeeds {
    pub fn new(buffer_size: usize) -> Self {
        let (global_tx, _unused_rx) = broadcast::channel(buffer_size.max(1));

        Self {
            global_tx,
            trips: Topics::new(buffer_size),
        }
    }

    pub fn subscribe_global(&self) -> broadcast::Receiver<LocationSample> {
        self.global_tx.subscribe()
    }

    pub fn subscribe_trip(&self, trip_id: &str) -> broadcast::Receiver<LocationSample> {
        self.trips.subscribe(trip_id)
    }

    /// Sends to both feeds. A feed with no subscribers is not an error.
    pub fn publish(&self, sample: &LocationSample) -> FeedDelivery {
        FeedDelivery {
            global: self.global_tx.send(sample.clone()).unwrap_or(0),
            trip: self.trips.publish(&sample.trip_id, sample.clone()),
        }
    }

    pub fn release_trip(&self, trip_id: &str) -> bool {
        self.trips.release(trip_id)
    }

    pub fn trip_feed_count(&self) -> usize {
        self.trips.len()
    }
}
