//! Geofence and trip-quality predicate

use super::RawTripRecord;
use crate::config::GeofenceConfig;

/// Decides whether a raw trip is kept.
///
/// A trip is accepted iff both zones are inside the geofence, the distance is
/// strictly above `min_distance` and the fare strictly above `min_fare`.
/// Missing values and NaN never pass.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    geofence: GeofenceConfig,
}

impl RecordFilter {
    pub fn new(geofence: GeofenceConfig) -> Self {
        Self { geofence }
    }

    pub fn accept(&self, record: &RawTripRecord) -> bool {
        let in_zone = |zone: Option<i64>| zone.is_some_and(|z| self.geofence.zones.contains(z));
        let above = |value: Option<f64>, threshold: f64| value.is_some_and(|v| v > threshold);

        in_zone(record.pickup_zone)
            && in_zone(record.dropoff_zone)
            && above(record.trip_distance, self.geofence.min_distance)
            && above(record.fare_amount, self.geofence.min_fare)
    }
}
