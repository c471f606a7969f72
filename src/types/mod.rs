use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Deserializer, Serialize};

/// A position on the map, in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        let a = Point::new(self.longitude, self.latitude);
        let b = Point::new(other.longitude, other.latitude);
        a.haversine_distance(&b)
    }
}

/// One normalized observation from the location provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinates: Coordinates,
    /// m/s; 0 when the provider could not measure it
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, speed: f64) -> Self {
        Self {
            coordinates: Coordinates::new(latitude, longitude),
            speed,
            timestamp: Utc::now(),
        }
    }
}

/// Derived fact that the driver has stopped after moving
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParkedEvent {
    pub coordinates: Coordinates,
    pub detected_at: DateTime<Utc>,
}

/// Why a spot is being reported
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// User pressed "report spot"
    Manual,
    /// Automatic report after park detection
    Parked,
}

/// Backend-owned parking spot, as returned by the nearby query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParkingSpot {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "timestamp", deserialize_with = "deserialize_reported_at")]
    pub reported_at: DateTime<Utc>,
    /// Distance from the query point, when the backend provides it
    #[serde(rename = "distance", default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl ParkingSpot {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Age of the report rounded to whole minutes
    pub fn minutes_since_reported(&self, now: DateTime<Utc>) -> i64 {
        let seconds = now.signed_duration_since(self.reported_at).num_seconds();
        (seconds as f64 / 60.0).round() as i64
    }
}

/// Accepts RFC 3339 as well as naive ISO-8601 timestamps (read as UTC)
fn deserialize_reported_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
