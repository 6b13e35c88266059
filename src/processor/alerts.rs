use serde_json::json;

use crate::models::alert::{AlertIntent, AlertRule, AlertType};
use crate::models::frame::TelemetryFrame;
use crate::models::vehicle::Vehicle;
use crate::processor::geofence::GeofenceTransition;
use crate::processor::reducer::ReducedState;

/// Evaluation result: alerts to raise plus the vehicle's next hysteresis
/// flags. `battery_recovered` asks the orchestrator to resolve any open
/// battery alert records.
#[derive(Debug)]
pub struct AlertEvaluation {
    pub intents: Vec<AlertIntent>,
    pub speed_alerted: bool,
    pub battery_alerted: bool,
    pub battery_recovered: bool,
}

pub fn evaluate(
    rules: &[AlertRule],
    vehicle: &Vehicle,
    frame: &TelemetryFrame,
    reduced: &ReducedState,
    transitions: &[GeofenceTransition],
) -> AlertEvaluation {
    let mut intents = Vec::new();
    let mut speed_alerted = vehicle.speed_alerted;
    let mut battery_alerted = vehicle.battery_alerted;
    let mut battery_recovered = false;

    let lat = reduced.fix.as_ref().map(|f| f.lat);
    let lon = reduced.fix.as_ref().map(|f| f.lon);

    if let Some(threshold) = rule_threshold(rules, AlertType::SpeedAlert) {
        let speed = frame.speed();
        if speed > threshold {
            if !speed_alerted {
                speed_alerted = true;
                intents.push(AlertIntent {
                    alert_type: AlertType::SpeedAlert,
                    message: format!(
                        "Vehicle {} exceeded the speed limit: {:.0} km/h (limit {:.0} km/h)",
                        vehicle.name, speed, threshold
                    ),
                    data: json!({ "speed": speed, "threshold": threshold }),
                    geofence_id: None,
                    lat,
                    lon,
                });
            }
        } else {
            // Condition cleared: re-arm without creating anything.
            speed_alerted = false;
        }
    }

    if let Some(threshold) = rule_threshold(rules, AlertType::BatteryAlert) {
        if let Some(battery) = frame.battery() {
            if battery < threshold {
                if !battery_alerted {
                    battery_alerted = true;
                    intents.push(AlertIntent {
                        alert_type: AlertType::BatteryAlert,
                        message: format!(
                            "Vehicle {} battery is low: {:.1} (threshold {:.1})",
                            vehicle.name, battery, threshold
                        ),
                        data: json!({ "battery": battery, "threshold": threshold }),
                        geofence_id: None,
                        lat,
                        lon,
                    });
                }
            } else {
                if battery_alerted {
                    battery_recovered = true;
                }
                battery_alerted = false;
            }
        }
    }

    for transition in transitions {
        let (alert_type, verb) = if transition.entered {
            (AlertType::GeofenceEntry, "entered")
        } else {
            (AlertType::GeofenceExit, "exited")
        };
        if !rule_enabled(rules, alert_type) {
            continue;
        }
        intents.push(AlertIntent {
            alert_type,
            message: format!(
                "Vehicle {} has {} geofence \"{}\"",
                vehicle.name, verb, transition.geofence_name
            ),
            data: json!({
                "geofenceId": transition.geofence_id,
                "geofenceName": transition.geofence_name,
                "location": { "lat": lat, "lon": lon },
            }),
            geofence_id: Some(transition.geofence_id),
            lat,
            lon,
        });
    }

    AlertEvaluation {
        intents,
        speed_alerted,
        battery_alerted,
        battery_recovered,
    }
}

fn rule_threshold(rules: &[AlertRule], alert_type: AlertType) -> Option<f64> {
    rules
        .iter()
        .find(|r| r.enabled && r.alert_type() == Some(alert_type))
        .and_then(|r| r.threshold)
}

fn rule_enabled(rules: &[AlertRule], alert_type: AlertType) -> bool {
    rules
        .iter()
        .any(|r| r.enabled && r.alert_type() == Some(alert_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::types::Json;
    use std::collections::HashMap;
    use uuid::Uuid;

    use crate::processor::reducer;

    fn vehicle(speed_alerted: bool, battery_alerted: bool) -> Vehicle {
        Vehicle {
            vehicle_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            imei: "352094087354021".into(),
            name: "van-7".into(),
            license_plate: None,
            current_status: "moving".into(),
            last_lat: None,
            last_lon: None,
            last_speed: None,
            last_heading: None,
            last_ignition: None,
            last_seen_at: None,
            extended_data: None,
            geofence_states: Json(HashMap::new()),
            speed_alerted,
            battery_alerted,
        }
    }

    fn rule(rule_type: &str, threshold: Option<f64>) -> AlertRule {
        AlertRule {
            rule_id: Uuid::new_v4(),
            rule_type: rule_type.into(),
            threshold,
            enabled: true,
        }
    }

    fn frame(speed: f64, battery: f64) -> TelemetryFrame {
        serde_json::from_str(&format!(
            r#"{{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":{speed},"ignition":true,
                "extendedData":{{"vehicleBattery":{battery}}}}}"#
        ))
        .unwrap()
    }

    fn reduced(v: &Vehicle, f: &TelemetryFrame) -> ReducedState {
        reducer::reduce(v, f, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn speed_alert_hysteresis_sequence() {
        let rules = vec![rule("SPEED_ALERT", Some(80.0))];
        let mut v = vehicle(false, false);

        // 90 km/h: one alert, flag set.
        let f = frame(90.0, 12.4);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert_eq!(eval.intents.len(), 1);
        assert_eq!(eval.intents[0].alert_type, AlertType::SpeedAlert);
        assert!(eval.speed_alerted);
        v.speed_alerted = eval.speed_alerted;

        // 95 km/h while the flag is set: nothing new.
        let f = frame(95.0, 12.4);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert!(eval.intents.is_empty());
        assert!(eval.speed_alerted);
        v.speed_alerted = eval.speed_alerted;

        // 60 km/h: the flag clears, still no alert.
        let f = frame(60.0, 12.4);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert!(eval.intents.is_empty());
        assert!(!eval.speed_alerted);
        v.speed_alerted = eval.speed_alerted;

        // Back to 90: a fresh alert.
        let f = frame(90.0, 12.4);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert_eq!(eval.intents.len(), 1);
    }

    #[test]
    fn speed_at_threshold_clears_without_alerting() {
        let rules = vec![rule("SPEED_ALERT", Some(80.0))];
        let v = vehicle(true, false);
        let f = frame(80.0, 12.4);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert!(eval.intents.is_empty());
        assert!(!eval.speed_alerted);
    }

    #[test]
    fn battery_alert_raises_then_recovers() {
        let rules = vec![rule("BATTERY_ALERT", Some(20.0))];
        let mut v = vehicle(false, false);

        let f = frame(10.0, 10.0);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert_eq!(eval.intents.len(), 1);
        assert_eq!(eval.intents[0].alert_type, AlertType::BatteryAlert);
        assert!(eval.battery_alerted);
        assert!(!eval.battery_recovered);
        v.battery_alerted = eval.battery_alerted;

        // Recovery asks for record resolution and re-arms the flag.
        let f = frame(10.0, 25.0);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert!(eval.intents.is_empty());
        assert!(!eval.battery_alerted);
        assert!(eval.battery_recovered);
    }

    #[test]
    fn recovery_is_only_reported_when_an_alert_was_outstanding() {
        let rules = vec![rule("BATTERY_ALERT", Some(20.0))];
        let v = vehicle(false, false);
        let f = frame(10.0, 25.0);
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert!(!eval.battery_recovered);
    }

    #[test]
    fn missing_battery_reading_leaves_the_flag_alone() {
        let rules = vec![rule("BATTERY_ALERT", Some(20.0))];
        let v = vehicle(false, true);
        let f: TelemetryFrame = serde_json::from_str(
            r#"{"IMEI":"1","lat":20.0,"lon":-100.0,"speedGps":10.0,"ignition":true}"#,
        )
        .unwrap();
        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &[]);
        assert!(eval.intents.is_empty());
        assert!(eval.battery_alerted);
        assert!(!eval.battery_recovered);
    }

    #[test]
    fn no_rules_means_no_alerts_and_untouched_flags() {
        let v = vehicle(true, true);
        let f = frame(200.0, 1.0);
        let eval = evaluate(&[], &v, &f, &reduced(&v, &f), &[]);
        assert!(eval.intents.is_empty());
        assert!(eval.speed_alerted);
        assert!(eval.battery_alerted);
    }

    #[test]
    fn geofence_transitions_become_alerts_when_a_rule_allows() {
        let rules = vec![rule("GEOFENCE_ENTRY", None), rule("GEOFENCE_EXIT", None)];
        let v = vehicle(false, false);
        let f = frame(10.0, 12.4);
        let id = Uuid::new_v4();
        let transitions = vec![GeofenceTransition {
            geofence_id: id,
            geofence_name: "depot".into(),
            entered: true,
        }];

        let eval = evaluate(&rules, &v, &f, &reduced(&v, &f), &transitions);
        assert_eq!(eval.intents.len(), 1);
        let intent = &eval.intents[0];
        assert_eq!(intent.alert_type, AlertType::GeofenceEntry);
        assert_eq!(intent.geofence_id, Some(id));
        assert!(intent.message.contains("entered"));
        assert!(intent.message.contains("depot"));
    }

    #[test]
    fn geofence_transitions_without_a_rule_are_dropped() {
        let v = vehicle(false, false);
        let f = frame(10.0, 12.4);
        let transitions = vec![GeofenceTransition {
            geofence_id: Uuid::new_v4(),
            geofence_name: "depot".into(),
            entered: false,
        }];
        let eval = evaluate(&[], &v, &f, &reduced(&v, &f), &transitions);
        assert!(eval.intents.is_empty());
    }
}
