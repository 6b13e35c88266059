use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only trip sample, recorded at most once per sampling interval.
#[derive(Debug, Clone, FromRow)]
pub struct Position {
    pub position_id: i64,
    pub vehicle_id: Uuid,
    pub trip_id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub ignition: bool,
    pub battery: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Insert payload for a sample the trip state machine wants recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub vehicle_id: Uuid,
    pub trip_id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub ignition: bool,
    pub battery: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}
