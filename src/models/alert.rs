use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    SpeedAlert,
    BatteryAlert,
    GeofenceEntry,
    GeofenceExit,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SpeedAlert => "SPEED_ALERT",
            AlertType::BatteryAlert => "BATTERY_ALERT",
            AlertType::GeofenceEntry => "GEOFENCE_ENTRY",
            AlertType::GeofenceExit => "GEOFENCE_EXIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SPEED_ALERT" => Some(AlertType::SpeedAlert),
            "BATTERY_ALERT" => Some(AlertType::BatteryAlert),
            "GEOFENCE_ENTRY" => Some(AlertType::GeofenceEntry),
            "GEOFENCE_EXIT" => Some(AlertType::GeofenceExit),
            _ => None,
        }
    }

    /// The opposite-direction geofence event, if any. Creating one
    /// auto-resolves open alerts of the other.
    pub fn opposite_geofence_event(&self) -> Option<AlertType> {
        match self {
            AlertType::GeofenceEntry => Some(AlertType::GeofenceExit),
            AlertType::GeofenceExit => Some(AlertType::GeofenceEntry),
            _ => None,
        }
    }
}

/// Threshold rule configured by the management layer. Read-only here.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRule {
    pub rule_id: Uuid,
    pub rule_type: String,
    pub threshold: Option<f64>,
    pub enabled: bool,
}

impl AlertRule {
    pub fn alert_type(&self) -> Option<AlertType> {
        AlertType::parse(&self.rule_type)
    }
}

#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct Alert {
    pub alert_id: Uuid,
    pub vehicle_id: Uuid,
    pub alert_type: String,
    pub message: String,
    pub data: Json<Value>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An alert the evaluator wants raised. The orchestrator applies duplicate
/// suppression, geocoding and counter side effects before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertIntent {
    pub alert_type: AlertType,
    pub message: String,
    pub data: Value,
    /// Set for geofence events; scopes duplicate suppression and
    /// auto-resolution to the (vehicle, geofence) pair.
    pub geofence_id: Option<Uuid>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}
