pub const SELECT_VEHICLE_ID_BY_IMEI: &str = r#"
SELECT vehicle_id FROM vehicles WHERE imei = $1;
"#;

pub const SELECT_VEHICLE_FOR_UPDATE: &str = r#"
SELECT vehicle_id, user_id, imei, name, license_plate, current_status,
       last_lat, last_lon, last_speed, last_heading, last_ignition, last_seen_at,
       extended_data, geofence_states, speed_alerted, battery_alerted
FROM vehicles WHERE vehicle_id = $1 FOR UPDATE;
"#;

pub const UPDATE_VEHICLE_STATE: &str = r#"
UPDATE vehicles
SET current_status = $2,
    last_lat = $3,
    last_lon = $4,
    last_speed = $5,
    last_heading = $6,
    last_ignition = $7,
    last_seen_at = $8,
    extended_data = $9,
    geofence_states = $10,
    speed_alerted = $11,
    battery_alerted = $12
WHERE vehicle_id = $1;
"#;

pub const MARK_VEHICLE_INACTIVE_IF_STALE: &str = r#"
UPDATE vehicles SET current_status = 'inactive'
WHERE vehicle_id = $1
  AND last_seen_at < $2
  AND current_status NOT IN ('inactive', 'immobilized');
"#;

pub const SELECT_STALE_VEHICLE_IDS: &str = r#"
SELECT vehicle_id FROM vehicles
WHERE last_seen_at < $1
  AND current_status NOT IN ('inactive', 'immobilized');
"#;

pub const SELECT_ACTIVE_TRIP: &str = r#"
SELECT trip_id, vehicle_id, user_id, status, start_time, end_time,
       start_lat, start_lon, end_lat, end_lon,
       distance_km, odometer_km, duration_min, avg_speed_kmh, max_speed_kmh,
       position_count, updated_at
FROM trips WHERE vehicle_id = $1 AND status = 'active' LIMIT 1 FOR UPDATE;
"#;

pub const SELECT_STALE_ACTIVE_TRIPS: &str = r#"
SELECT trip_id, vehicle_id, user_id, status, start_time, end_time,
       start_lat, start_lon, end_lat, end_lon,
       distance_km, odometer_km, duration_min, avg_speed_kmh, max_speed_kmh,
       position_count, updated_at
FROM trips WHERE status = 'active' AND updated_at < $1;
"#;

pub const INSERT_TRIP: &str = r#"
INSERT INTO trips (
    trip_id, vehicle_id, user_id, status, start_time, start_lat, start_lon,
    distance_km, odometer_km, duration_min, avg_speed_kmh, max_speed_kmh,
    position_count, updated_at
) VALUES ($1, $2, $3, 'active', $4, $5, $6, 0, 0, 0, 0, $7, $8, $9);
"#;

pub const UPDATE_TRIP_PROGRESS: &str = r#"
UPDATE trips
SET distance_km = $2,
    max_speed_kmh = $3,
    position_count = $4,
    updated_at = $5
WHERE trip_id = $1;
"#;

pub const CLOSE_TRIP: &str = r#"
UPDATE trips
SET status = $2,
    end_time = $3,
    end_lat = $4,
    end_lon = $5,
    distance_km = $6,
    odometer_km = $7,
    duration_min = $8,
    avg_speed_kmh = $9,
    updated_at = $10
WHERE trip_id = $1;
"#;

pub const SELECT_LAST_TRIP_POSITION: &str = r#"
SELECT position_id, vehicle_id, trip_id, lat, lon, speed, ignition, battery, recorded_at
FROM positions WHERE trip_id = $1 ORDER BY recorded_at DESC LIMIT 1;
"#;

pub const INSERT_POSITION: &str = r#"
INSERT INTO positions (vehicle_id, trip_id, lat, lon, speed, ignition, battery, recorded_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
"#;

pub const SELECT_VEHICLE_GEOFENCES: &str = r#"
SELECT g.geofence_id, g.name, g.kind, g.center_lat, g.center_lon, g.radius_m,
       g.vertices, g.active, g.notify_on_entry, g.notify_on_exit
FROM geofences g
JOIN geofence_vehicles gv ON gv.geofence_id = g.geofence_id
WHERE gv.vehicle_id = $1 AND g.active = true;
"#;

pub const SELECT_ENABLED_ALERT_RULES: &str = r#"
SELECT rule_id, rule_type, threshold, enabled
FROM alert_rules WHERE enabled = true;
"#;

pub const SELECT_OPEN_ALERT_ID: &str = r#"
SELECT alert_id FROM alerts
WHERE vehicle_id = $1 AND alert_type = $2 AND resolved = false
LIMIT 1;
"#;

pub const SELECT_OPEN_GEOFENCE_ALERT_ID: &str = r#"
SELECT alert_id FROM alerts
WHERE vehicle_id = $1 AND alert_type = $2 AND resolved = false
  AND data->>'geofenceId' = $3
LIMIT 1;
"#;

pub const INSERT_ALERT: &str = r#"
INSERT INTO alerts (alert_id, vehicle_id, alert_type, message, data, resolved, location, created_at)
VALUES ($1, $2, $3, $4, $5, false, $6, $7);
"#;

pub const RESOLVE_OPEN_ALERTS: &str = r#"
UPDATE alerts
SET resolved = true, resolved_at = $3
WHERE vehicle_id = $1 AND alert_type = $2 AND resolved = false;
"#;

pub const RESOLVE_OPEN_GEOFENCE_ALERTS: &str = r#"
UPDATE alerts
SET resolved = true, resolved_at = $4
WHERE vehicle_id = $1 AND alert_type = $2 AND resolved = false
  AND data->>'geofenceId' = $3;
"#;

pub const INCREMENT_OWNER_ALERT_COUNTER: &str = r#"
UPDATE users SET alert_counter = alert_counter + 1 WHERE user_id = $1;
"#;

pub const INCREMENT_OBSERVER_ALERT_COUNTERS: &str = r#"
UPDATE users SET alert_counter = alert_counter + 1
WHERE role IN ('admin', 'superadmin') AND user_id <> $1;
"#;
