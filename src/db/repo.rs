use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use super::{queries, DbPool};
use crate::models::alert::AlertRule;
use crate::models::geofence::Geofence;
use crate::models::position::{NewPosition, Position};
use crate::models::trip::Trip;
use crate::models::vehicle::{GeofenceStateMap, Vehicle};

pub async fn vehicle_id_by_imei(exec: impl PgExecutor<'_>, imei: &str) -> Result<Option<Uuid>> {
    let row = sqlx::query(queries::SELECT_VEHICLE_ID_BY_IMEI)
        .bind(imei)
        .fetch_optional(exec)
        .await?;
    Ok(row.map(|r| r.get("vehicle_id")))
}

/// Row-locked read; must run inside the per-frame transaction.
pub async fn vehicle_for_update(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
) -> Result<Option<Vehicle>> {
    let vehicle = sqlx::query_as::<_, Vehicle>(queries::SELECT_VEHICLE_FOR_UPDATE)
        .bind(vehicle_id)
        .fetch_optional(exec)
        .await?;
    Ok(vehicle)
}

pub struct VehicleStateUpdate<'a> {
    pub status: &'a str,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub ignition: Option<bool>,
    pub seen_at: Option<DateTime<Utc>>,
    pub extended: Option<&'a Value>,
    pub geofence_states: &'a GeofenceStateMap,
    pub speed_alerted: bool,
    pub battery_alerted: bool,
}

pub async fn update_vehicle_state(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
    update: VehicleStateUpdate<'_>,
) -> Result<()> {
    sqlx::query(queries::UPDATE_VEHICLE_STATE)
        .bind(vehicle_id)
        .bind(update.status)
        .bind(update.lat)
        .bind(update.lon)
        .bind(update.speed)
        .bind(update.heading)
        .bind(update.ignition)
        .bind(update.seen_at)
        .bind(update.extended.map(Json))
        .bind(Json(update.geofence_states))
        .bind(update.speed_alerted)
        .bind(update.battery_alerted)
        .execute(exec)
        .await?;
    Ok(())
}

/// Conditional so a frame that arrived after the stale scan cannot be
/// clobbered. Returns the number of rows actually flipped.
pub async fn mark_vehicle_inactive_if_stale(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(queries::MARK_VEHICLE_INACTIVE_IF_STALE)
        .bind(vehicle_id)
        .bind(cutoff)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub async fn stale_vehicle_ids(
    exec: impl PgExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(queries::SELECT_STALE_VEHICLE_IDS)
        .bind(cutoff)
        .fetch_all(exec)
        .await?;
    Ok(rows.iter().map(|r| r.get("vehicle_id")).collect())
}

pub async fn active_trip(exec: impl PgExecutor<'_>, vehicle_id: Uuid) -> Result<Option<Trip>> {
    let trip = sqlx::query_as::<_, Trip>(queries::SELECT_ACTIVE_TRIP)
        .bind(vehicle_id)
        .fetch_optional(exec)
        .await?;
    Ok(trip)
}

pub async fn stale_active_trips(
    exec: impl PgExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Trip>> {
    let trips = sqlx::query_as::<_, Trip>(queries::SELECT_STALE_ACTIVE_TRIPS)
        .bind(cutoff)
        .fetch_all(exec)
        .await?;
    Ok(trips)
}

pub async fn insert_trip(exec: impl PgExecutor<'_>, trip: &Trip) -> Result<()> {
    sqlx::query(queries::INSERT_TRIP)
        .bind(trip.trip_id)
        .bind(trip.vehicle_id)
        .bind(trip.user_id)
        .bind(trip.start_time)
        .bind(trip.start_lat)
        .bind(trip.start_lon)
        .bind(trip.max_speed_kmh)
        .bind(trip.position_count)
        .bind(trip.updated_at)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn update_trip_progress(exec: impl PgExecutor<'_>, trip: &Trip) -> Result<()> {
    sqlx::query(queries::UPDATE_TRIP_PROGRESS)
        .bind(trip.trip_id)
        .bind(trip.distance_km)
        .bind(trip.max_speed_kmh)
        .bind(trip.position_count)
        .bind(trip.updated_at)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn close_trip(exec: impl PgExecutor<'_>, trip: &Trip) -> Result<()> {
    sqlx::query(queries::CLOSE_TRIP)
        .bind(trip.trip_id)
        .bind(&trip.status)
        .bind(trip.end_time)
        .bind(trip.end_lat)
        .bind(trip.end_lon)
        .bind(trip.distance_km)
        .bind(trip.odometer_km)
        .bind(trip.duration_min)
        .bind(trip.avg_speed_kmh)
        .bind(trip.updated_at)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn last_trip_position(
    exec: impl PgExecutor<'_>,
    trip_id: Uuid,
) -> Result<Option<Position>> {
    let position = sqlx::query_as::<_, Position>(queries::SELECT_LAST_TRIP_POSITION)
        .bind(trip_id)
        .fetch_optional(exec)
        .await?;
    Ok(position)
}

pub async fn insert_position(exec: impl PgExecutor<'_>, position: &NewPosition) -> Result<()> {
    sqlx::query(queries::INSERT_POSITION)
        .bind(position.vehicle_id)
        .bind(position.trip_id)
        .bind(position.lat)
        .bind(position.lon)
        .bind(position.speed)
        .bind(position.ignition)
        .bind(position.battery)
        .bind(position.recorded_at)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn vehicle_geofences(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
) -> Result<Vec<Geofence>> {
    let fences = sqlx::query_as::<_, Geofence>(queries::SELECT_VEHICLE_GEOFENCES)
        .bind(vehicle_id)
        .fetch_all(exec)
        .await?;
    Ok(fences)
}

pub async fn enabled_alert_rules(exec: impl PgExecutor<'_>) -> Result<Vec<AlertRule>> {
    let rules = sqlx::query_as::<_, AlertRule>(queries::SELECT_ENABLED_ALERT_RULES)
        .fetch_all(exec)
        .await?;
    Ok(rules)
}

pub async fn open_alert_exists(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
    alert_type: &str,
    geofence_id: Option<Uuid>,
) -> Result<bool> {
    let row = match geofence_id {
        Some(geofence_id) => {
            sqlx::query(queries::SELECT_OPEN_GEOFENCE_ALERT_ID)
                .bind(vehicle_id)
                .bind(alert_type)
                .bind(geofence_id.to_string())
                .fetch_optional(exec)
                .await?
        }
        None => {
            sqlx::query(queries::SELECT_OPEN_ALERT_ID)
                .bind(vehicle_id)
                .bind(alert_type)
                .fetch_optional(exec)
                .await?
        }
    };
    Ok(row.is_some())
}

pub struct NewAlert<'a> {
    pub alert_id: Uuid,
    pub vehicle_id: Uuid,
    pub alert_type: &'a str,
    pub message: &'a str,
    pub data: &'a Value,
    pub location: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_alert(exec: impl PgExecutor<'_>, alert: &NewAlert<'_>) -> Result<()> {
    sqlx::query(queries::INSERT_ALERT)
        .bind(alert.alert_id)
        .bind(alert.vehicle_id)
        .bind(alert.alert_type)
        .bind(alert.message)
        .bind(Json(alert.data))
        .bind(alert.location)
        .bind(alert.created_at)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn resolve_open_alerts(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
    alert_type: &str,
    resolved_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(queries::RESOLVE_OPEN_ALERTS)
        .bind(vehicle_id)
        .bind(alert_type)
        .bind(resolved_at)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub async fn resolve_open_geofence_alerts(
    exec: impl PgExecutor<'_>,
    vehicle_id: Uuid,
    alert_type: &str,
    geofence_id: Uuid,
    resolved_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(queries::RESOLVE_OPEN_GEOFENCE_ALERTS)
        .bind(vehicle_id)
        .bind(alert_type)
        .bind(geofence_id.to_string())
        .bind(resolved_at)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub async fn increment_alert_counters(pool: &DbPool, owner_id: Uuid) -> Result<()> {
    sqlx::query(queries::INCREMENT_OWNER_ALERT_COUNTER)
        .bind(owner_id)
        .execute(pool)
        .await?;
    sqlx::query(queries::INCREMENT_OBSERVER_ALERT_COUNTERS)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(())
}
