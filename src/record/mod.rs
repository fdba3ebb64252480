//! Trip record types
//!
//! - [`RawTripRecord`]: one row as produced by the columnar reader
//! - [`ZoneSet`]: the geofence of zone ids a trip must start and end in
//! - [`CanonicalEdge`]: an accepted, normalized trip ready for staging

pub mod filter;
pub mod transform;

pub use filter::RecordFilter;
pub use transform::RecordTransformer;

use chrono::NaiveDateTime;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Zone ids covering the Bronx in the NYC TLC taxi zone map
pub const BRONX_ZONES: [i64; 43] = [
    3, 18, 20, 31, 32, 46, 47, 51, 58, 59, 60, 69, 78, 81, 94, 119, 126, 136, 147, 159, 167, 168,
    169, 174, 182, 183, 184, 185, 199, 200, 208, 212, 213, 220, 235, 240, 241, 242, 247, 248, 250,
    254, 259,
];

/// Fixed set of zone identifiers defining the area of interest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneSet(FxHashSet<i64>);

impl ZoneSet {
    pub fn new(zones: impl IntoIterator<Item = i64>) -> Self {
        ZoneSet(zones.into_iter().collect())
    }

    /// The Bronx geofence used by default
    pub fn bronx() -> Self {
        Self::new(BRONX_ZONES)
    }

    pub fn contains(&self, zone: i64) -> bool {
        self.0.contains(&zone)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ZoneSet {
    fn default() -> Self {
        Self::bronx()
    }
}

/// Resolution of an epoch-encoded timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl EpochUnit {
    fn per_second(self) -> i64 {
        match self {
            EpochUnit::Seconds => 1,
            EpochUnit::Millis => 1_000,
            EpochUnit::Micros => 1_000_000,
            EpochUnit::Nanos => 1_000_000_000,
        }
    }
}

/// Timestamp as the reader found it, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Wall-clock time without zone information
    Naive(NaiveDateTime),
    /// Wall-clock time encoded as an offset from the epoch (no zone attached)
    Epoch { value: i64, unit: EpochUnit },
    /// Textual timestamp from a string column
    Text(String),
}

impl RawTimestamp {
    pub(crate) fn epoch_parts(value: i64, unit: EpochUnit) -> (i64, u32) {
        let per_second = unit.per_second();
        let secs = value.div_euclid(per_second);
        let nanos = value.rem_euclid(per_second) * (1_000_000_000 / per_second);
        (secs, nanos as u32)
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTimestamp::Naive(dt) => write!(f, "{}", dt),
            RawTimestamp::Epoch { value, unit } => write!(f, "{} ({:?} since epoch)", value, unit),
            RawTimestamp::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One trip row from the columnar input.
///
/// Every field is optional because the source columns are nullable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTripRecord {
    pub pickup_datetime: Option<RawTimestamp>,
    pub dropoff_datetime: Option<RawTimestamp>,
    pub pickup_zone: Option<i64>,
    pub dropoff_zone: Option<i64>,
    pub trip_distance: Option<f64>,
    pub fare_amount: Option<f64>,
}

/// Validated, normalized trip; one row of the staging artifact and one TRIP edge in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEdge {
    #[serde(with = "iso_seconds")]
    pub pickup_dt: NaiveDateTime,
    #[serde(with = "iso_seconds")]
    pub dropoff_dt: NaiveDateTime,
    pub pickup_zone: i64,
    pub dropoff_zone: i64,
    pub distance: f64,
    pub fare: f64,
}

/// ISO-8601 at second granularity, the format the store's `datetime()` parses
pub mod iso_seconds {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn format(dt: &NaiveDateTime) -> String {
        dt.format(FORMAT).to_string()
    }

    pub fn parse(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, FORMAT)
    }

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}
