use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

pub const TRIP_ACTIVE: &str = "active";
pub const TRIP_COMPLETED: &str = "completed";
pub const TRIP_INTERRUPTED: &str = "interrupted";

#[derive(Debug, Clone, FromRow)]
pub struct Trip {
    pub trip_id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: Option<f64>,
    pub end_lon: Option<f64>,
    /// Pairwise Haversine sum over recorded samples, in kilometers.
    pub distance_km: f64,
    /// Device-reported trip odometer converted to kilometers; authoritative
    /// for average speed when nonzero.
    pub odometer_km: f64,
    pub duration_min: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub position_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn is_active(&self) -> bool {
        self.status == TRIP_ACTIVE
    }
}
