use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Per-geofence transition state, keyed by geofence id on the vehicle row.
pub type GeofenceStateMap = HashMap<Uuid, GeofenceState>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceState {
    pub inside: bool,
    pub entry_alert_sent: bool,
    pub exit_alert_sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    Moving,
    Stopped,
    Inactive,
    Immobilized,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Moving => "moving",
            VehicleStatus::Stopped => "stopped",
            VehicleStatus::Inactive => "inactive",
            VehicleStatus::Immobilized => "immobilized",
        }
    }

    /// Unknown strings map to `inactive` rather than failing the row.
    pub fn parse(s: &str) -> Self {
        match s {
            "moving" => VehicleStatus::Moving,
            "stopped" => VehicleStatus::Stopped,
            "immobilized" => VehicleStatus::Immobilized,
            _ => VehicleStatus::Inactive,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct Vehicle {
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub imei: String,
    pub name: String,
    pub license_plate: Option<String>,
    pub current_status: String,
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
    pub last_speed: Option<f64>,
    pub last_heading: Option<f64>,
    pub last_ignition: Option<bool>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub extended_data: Option<Json<serde_json::Value>>,
    pub geofence_states: Json<GeofenceStateMap>,
    pub speed_alerted: bool,
    pub battery_alerted: bool,
}

impl Vehicle {
    pub fn status(&self) -> VehicleStatus {
        VehicleStatus::parse(&self.current_status)
    }

    /// Last position usable for heading computation: both coordinates
    /// present and nonzero.
    pub fn last_valid_position(&self) -> Option<(f64, f64)> {
        match (self.last_lat, self.last_lon) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => Some((lat, lon)),
            _ => None,
        }
    }
}
