use std::fmt;

use dashmap::DashMap;

use crate::models::location::LocationSample;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey {
    pub driver_id: String,
    pub trip_id: String,
}

impl LocationKey {
    pub fn new(driver_id: &str, trip_id: &str) -> Self {
        Self {
            driver_id: driver_id.to_string(),
            trip_id: trip_id.to_string(),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.driver_id, self.trip_id)
    }
}

// `latest` and `history` share one entry so both move under the same shard lock.
#[derive(Debug)]
struct Track {
    latest: LocationSample,
    history: Vec<LocationSample>,
}

/// Live view of driver positions per (driver, trip).
///
/// Locking is per shard, so writers on unrelated keys rarely contend. Every
/// key with a latest sample has a history ending in that same sample.
#[derive(Debug, Default)]
pub struct LocationCache {
    tracks: DashMap<LocationKey, Track>,
    history_limit: Option<usize>,
}

impl LocationCache {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            tracks: DashMap::new(),
            history_limit: history_limit.filter(|limit| *limit > 0),
        }
    }

    pub fn put(&self, driver_id: &str, trip_id: &str, lat: f64, lng: f64) -> LocationSample {
        let sample = LocationSample::new(driver_id, trip_id, lat, lng);
        let key = LocationKey::new(driver_id, trip_id);

        let mut track = self.tracks.entry(key).or_insert_with(|| Track {
            latest: sample.clone(),
            history: Vec::new(),
        });
        track.latest = sample.clone();
        track.history.push(sample.clone());

        if let Some(limit) = self.history_limit {
            let excess = track.history.len().saturating_sub(limit);
            if excess > 0 {
                track.history.drain(..excess);
            }
        }

        sample
    }

    pub fn latest(&self, driver_id: &str, trip_id: &str) -> Option<LocationSample> {
        self.tracks
            .get(&LocationKey::new(driver_id, trip_id))
            .map(|track| track.latest.clone())
    }

    /// Oldest first; empty when the key was never written.
    pub fn history(&self, driver_id: &str, trip_id: &str) -> Vec<LocationSample> {
        self.tracks
            .get(&LocationKey::new(driver_id, trip_id))
            .map(|track| track.history.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
