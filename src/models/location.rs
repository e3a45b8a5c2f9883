use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A single position report for a driver working a trip.
///
/// This is also the outbound broadcast payload, so the field names follow the
/// stream wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub driver_id: String,
    pub trip_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationSample {
    pub fn new(driver_id: impl Into<String>, trip_id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            driver_id: driver_id.into(),
            trip_id: trip_id.into(),
            latitude: lat,
            longitude: lng,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

/// Inbound stream message sent by a driver. Any `driverId` the client sends is
/// accepted by the parser and then ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundLocation {
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}
