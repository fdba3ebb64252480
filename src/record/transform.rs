//! Normalization of accepted trips into [`CanonicalEdge`]s

use chrono::{DateTime, NaiveDateTime, SubsecRound};

use super::{CanonicalEdge, RawTimestamp, RawTripRecord};
use crate::error::{IngestError, IngestResult};

/// Textual layouts accepted for string timestamp columns; fractional seconds are optional
const TEXT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Converts filtered records into canonical edges.
///
/// Deterministic: the output depends only on the input record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTransformer;

impl RecordTransformer {
    pub fn new() -> Self {
        RecordTransformer
    }

    /// Normalize one record that already passed [`super::RecordFilter`].
    pub fn transform(&self, record: &RawTripRecord) -> IngestResult<CanonicalEdge> {
        Ok(CanonicalEdge {
            pickup_dt: normalize_timestamp("pickup", record.pickup_datetime.as_ref())?,
            dropoff_dt: normalize_timestamp("dropoff", record.dropoff_datetime.as_ref())?,
            pickup_zone: required("pickup zone", record.pickup_zone)?,
            dropoff_zone: required("dropoff zone", record.dropoff_zone)?,
            distance: required("trip distance", record.trip_distance)?,
            fare: required("fare amount", record.fare_amount)?,
        })
    }
}

fn required<T>(name: &str, value: Option<T>) -> IngestResult<T> {
    value.ok_or_else(|| IngestError::Read(format!("trip is missing {}", name)))
}

/// Second-granularity wall-clock time; sub-second parts are truncated, never rounded.
fn normalize_timestamp(
    field: &'static str,
    raw: Option<&RawTimestamp>,
) -> IngestResult<NaiveDateTime> {
    let malformed = |value: String| IngestError::MalformedTimestamp { field, value };

    let parsed = match raw {
        None => return Err(malformed("<null>".to_string())),
        Some(RawTimestamp::Naive(dt)) => Some(*dt),
        Some(RawTimestamp::Epoch { value, unit }) => {
            let (secs, nanos) = RawTimestamp::epoch_parts(*value, *unit);
            DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
        }
        Some(RawTimestamp::Text(text)) => TEXT_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text.trim(), format).ok()),
    };

    parsed
        .map(|dt| dt.trunc_subsecs(0))
        .ok_or_else(|| malformed(raw.map(|r| r.to_string()).unwrap_or_default()))
}
