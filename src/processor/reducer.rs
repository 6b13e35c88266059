use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::geo;
use crate::models::frame::TelemetryFrame;
use crate::models::vehicle::{Vehicle, VehicleStatus};

/// A validated position taken from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub heading: Option<f64>,
    pub ignition: bool,
    pub timestamp: DateTime<Utc>,
}

/// Output of the per-frame reduction: the vehicle's next status, its new
/// last position (when the frame carried a usable fix) and the extended
/// telemetry snapshot. Persisted together with the trip/geofence/alert
/// effects of the same frame.
#[derive(Debug)]
pub struct ReducedState {
    pub status: VehicleStatus,
    pub fix: Option<PositionFix>,
    pub extended: Value,
}

/// Classify one frame against the vehicle's previous state.
///
/// `now` is the fallback timestamp for frames without a GPS time.
pub fn reduce(vehicle: &Vehicle, frame: &TelemetryFrame, now: DateTime<Utc>) -> ReducedState {
    let ignition_on = frame.ignition_on();
    let moving = ignition_on && frame.speed() > 0.0;

    // `immobilized` is set by the immobilization flow and is sticky here.
    let status = if vehicle.status() == VehicleStatus::Immobilized {
        VehicleStatus::Immobilized
    } else if frame.battery().is_none() {
        VehicleStatus::Inactive
    } else if moving {
        VehicleStatus::Moving
    } else if ignition_on {
        VehicleStatus::Stopped
    } else {
        VehicleStatus::Inactive
    };

    // Heading comes from the previous stored position, so it has to be
    // derived before that position is overwritten.
    let fix = if frame.has_valid_position() {
        let (lat, lon) = (frame.lat.unwrap_or(0.0), frame.lon.unwrap_or(0.0));
        let heading = vehicle
            .last_valid_position()
            .map(|(prev_lat, prev_lon)| geo::initial_bearing(prev_lat, prev_lon, lat, lon));
        Some(PositionFix {
            lat,
            lon,
            speed: frame.speed(),
            heading,
            ignition: ignition_on,
            timestamp: frame.timestamp.unwrap_or(now),
        })
    } else {
        None
    };

    ReducedState {
        status,
        fix,
        extended: frame.extended_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::types::Json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn vehicle(status: &str) -> Vehicle {
        Vehicle {
            vehicle_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            imei: "352094087354021".into(),
            name: "van-7".into(),
            license_plate: Some("XYZ-123".into()),
            current_status: status.into(),
            last_lat: None,
            last_lon: None,
            last_speed: None,
            last_heading: None,
            last_ignition: None,
            last_seen_at: None,
            extended_data: None,
            geofence_states: Json(HashMap::new()),
            speed_alerted: false,
            battery_alerted: false,
        }
    }

    fn frame(json: &str) -> TelemetryFrame {
        serde_json::from_str(json).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1764396915, 0).unwrap()
    }

    #[test]
    fn moving_when_ignition_on_and_speed_positive() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":35.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("stopped"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Moving);
    }

    #[test]
    fn stopped_when_ignition_on_but_not_moving() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":0.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("moving"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Stopped);
    }

    #[test]
    fn inactive_when_ignition_off() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":0.0,"ignition":false,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("moving"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Inactive);
    }

    #[test]
    fn dead_battery_forces_inactive_even_while_moving() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":35.0,"ignition":true,
                "extendedData":{"vehicleBattery":0}}"#,
        );
        let reduced = reduce(&vehicle("moving"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Inactive);

        let f = frame(r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":35.0,"ignition":true}"#);
        let reduced = reduce(&vehicle("moving"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Inactive);
    }

    #[test]
    fn immobilized_is_never_overwritten() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":35.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("immobilized"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Immobilized);

        // Not even by the dead-battery rule.
        let f = frame(r#"{"IMEI":"1","lat":20.0,"lon":-100.0}"#);
        let reduced = reduce(&vehicle("immobilized"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Immobilized);
    }

    #[test]
    fn din1_counts_as_ignition_for_motion() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":12.0,
                "extendedData":{"vehicleBattery":12.4,"DIN1":1}}"#,
        );
        let reduced = reduce(&vehicle("inactive"), &f, now());
        assert_eq!(reduced.status, VehicleStatus::Moving);
    }

    #[test]
    fn heading_derives_from_previous_position() {
        let mut v = vehicle("moving");
        v.last_lat = Some(10.0);
        v.last_lon = Some(20.0);

        // Due north of the previous fix.
        let f = frame(
            r#"{"IMEI":"1","lat":11.0,"lon":20.0,"speedGps":50.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&v, &f, now());
        let heading = reduced.fix.unwrap().heading.unwrap();
        assert!(heading.abs() < 1e-6, "got {heading}");
    }

    #[test]
    fn heading_undefined_without_a_previous_fix() {
        let f = frame(
            r#"{"IMEI":"1","lat":11.0,"lon":20.0,"speedGps":50.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("inactive"), &f, now());
        assert_eq!(reduced.fix.unwrap().heading, None);

        // A stored (0, 0) placeholder does not count as a previous fix.
        let mut v = vehicle("inactive");
        v.last_lat = Some(0.0);
        v.last_lon = Some(0.0);
        let f = frame(
            r#"{"IMEI":"1","lat":11.0,"lon":20.0,"speedGps":50.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&v, &f, now());
        assert_eq!(reduced.fix.unwrap().heading, None);
    }

    #[test]
    fn invalid_coordinates_produce_no_fix() {
        let f = frame(
            r#"{"IMEI":"1","lat":0.0,"lon":0.0,"speedGps":35.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("inactive"), &f, now());
        assert!(reduced.fix.is_none());
        // Status is still classified.
        assert_eq!(reduced.status, VehicleStatus::Moving);
    }

    #[test]
    fn frame_without_gps_time_falls_back_to_now() {
        let f = frame(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":5.0,"ignition":true,
                "extendedData":{"vehicleBattery":12.4}}"#,
        );
        let reduced = reduce(&vehicle("inactive"), &f, now());
        assert_eq!(reduced.fix.unwrap().timestamp, now());
    }
}
