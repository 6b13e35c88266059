use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::repo::{self, NewAlert, VehicleStateUpdate};
use crate::db::DbPool;
use crate::geocoding::ReverseGeocoder;
use crate::models::alert::{AlertIntent, AlertType};
use crate::models::frame::TelemetryFrame;
use crate::models::vehicle::Vehicle;
use crate::processor::geofence::GeofenceTransition;
use crate::processor::trip::TripOutcome;
use crate::processor::{alerts, geofence, reducer, trip, VehicleLocks};
use crate::realtime::{Event, Hub};

/// Per-frame orchestrator. Each frame is one read-modify-write of the
/// vehicle's state: reducer, trip machine, geofence engine and alert
/// evaluator run against a snapshot, and their effects are committed in a
/// single transaction before side channels (alert records, geocoding,
/// fan-out) run.
pub struct Pipeline {
    pool: DbPool,
    hub: Arc<Hub>,
    geocoder: Arc<ReverseGeocoder>,
    locks: Arc<VehicleLocks>,
    position_interval: Duration,
}

impl Pipeline {
    pub fn new(
        pool: DbPool,
        hub: Arc<Hub>,
        geocoder: Arc<ReverseGeocoder>,
        locks: Arc<VehicleLocks>,
        config: &AppConfig,
    ) -> Self {
        let position_interval =
            Duration::from_std(config.position_interval).unwrap_or_else(|_| Duration::seconds(30));
        Self {
            pool,
            hub,
            geocoder,
            locks,
            position_interval,
        }
    }

    pub async fn process_frame(&self, frame: TelemetryFrame) -> Result<()> {
        let Some(imei) = frame.imei.clone().filter(|s| !s.is_empty()) else {
            warn!("Frame missing device identifier, skipping");
            return Ok(());
        };
        let Some(vehicle_id) = repo::vehicle_id_by_imei(&self.pool, &imei).await? else {
            warn!("No vehicle registered for device {}, skipping frame", imei);
            return Ok(());
        };

        let _guard = self.locks.acquire(vehicle_id).await;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let Some(vehicle) = repo::vehicle_for_update(&mut *tx, vehicle_id).await? else {
            warn!("Vehicle {} disappeared mid-frame, skipping", vehicle_id);
            return Ok(());
        };

        let reduced = reducer::reduce(&vehicle, &frame, now);

        let active = repo::active_trip(&mut *tx, vehicle_id).await?;
        let last_sample = match &active {
            Some(t) => repo::last_trip_position(&mut *tx, t.trip_id).await?,
            None => None,
        };
        let outcome = trip::on_frame(
            active,
            last_sample.as_ref(),
            &vehicle,
            &frame,
            reduced.fix.as_ref(),
            self.position_interval,
            now,
        );
        match &outcome {
            TripOutcome::Started { trip, sample } => {
                repo::insert_trip(&mut *tx, trip).await?;
                repo::insert_position(&mut *tx, sample).await?;
                info!("Trip {} started for vehicle {}", trip.trip_id, vehicle.name);
            }
            TripOutcome::Extended { trip, sample } => {
                repo::insert_position(&mut *tx, sample).await?;
                repo::update_trip_progress(&mut *tx, trip).await?;
            }
            TripOutcome::Closed { trip } => {
                repo::close_trip(&mut *tx, trip).await?;
                info!(
                    "Trip {} ended for vehicle {} | {:.2} km in {:.1} min",
                    trip.trip_id, vehicle.name, trip.distance_km, trip.duration_min
                );
            }
            TripOutcome::None => {}
        }

        let mut geofence_states = vehicle.geofence_states.0.clone();
        let transitions = match &reduced.fix {
            Some(fix) => {
                let fences = repo::vehicle_geofences(&mut *tx, vehicle_id).await?;
                geofence::evaluate(&mut geofence_states, &fences, fix.lat, fix.lon)
            }
            None => Vec::new(),
        };

        let rules = repo::enabled_alert_rules(&mut *tx).await?;
        let evaluation = alerts::evaluate(&rules, &vehicle, &frame, &reduced, &transitions);

        // New baseline for the next frame. The previous position survives
        // frames without a usable fix.
        let update = VehicleStateUpdate {
            status: reduced.status.as_str(),
            lat: reduced.fix.as_ref().map(|f| f.lat).or(vehicle.last_lat),
            lon: reduced.fix.as_ref().map(|f| f.lon).or(vehicle.last_lon),
            speed: reduced.fix.as_ref().map(|f| f.speed).or(vehicle.last_speed),
            heading: reduced
                .fix
                .as_ref()
                .and_then(|f| f.heading)
                .or(vehicle.last_heading),
            ignition: reduced
                .fix
                .as_ref()
                .map(|f| f.ignition)
                .or(vehicle.last_ignition),
            seen_at: reduced
                .fix
                .as_ref()
                .map(|f| f.timestamp)
                .or(vehicle.last_seen_at),
            extended: Some(&reduced.extended),
            geofence_states: &geofence_states,
            speed_alerted: evaluation.speed_alerted,
            battery_alerted: evaluation.battery_alerted,
        };
        repo::update_vehicle_state(&mut *tx, vehicle_id, update).await?;
        tx.commit().await?;

        // Side channels after the core commit; their failures are logged
        // and swallowed so they can never cost us the state update.
        if evaluation.battery_recovered {
            match repo::resolve_open_alerts(
                &self.pool,
                vehicle_id,
                AlertType::BatteryAlert.as_str(),
                now,
            )
            .await
            {
                Ok(resolved) if resolved > 0 => {
                    info!("Battery recovered for vehicle {}, resolved {} alert(s)", vehicle.name, resolved)
                }
                Ok(_) => {}
                Err(e) => error!("Failed to resolve battery alerts for {}: {:#}", vehicle.name, e),
            }
        }

        for intent in &evaluation.intents {
            if let Err(e) = self.raise_alert(&vehicle, intent, now).await {
                error!(
                    "Failed to raise {} for vehicle {}: {:#}",
                    intent.alert_type.as_str(),
                    vehicle.name,
                    e
                );
            }
        }

        self.fan_out(&vehicle, &reduced, &transitions, now).await;

        Ok(())
    }

    /// Raise one alert: auto-resolve the opposite geofence direction, skip
    /// silently when a matching alert is still open, then insert with a
    /// best-effort location and bump the user counters.
    async fn raise_alert(
        &self,
        vehicle: &Vehicle,
        intent: &AlertIntent,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let (Some(geofence_id), Some(opposite)) =
            (intent.geofence_id, intent.alert_type.opposite_geofence_event())
        {
            repo::resolve_open_geofence_alerts(
                &self.pool,
                vehicle.vehicle_id,
                opposite.as_str(),
                geofence_id,
                now,
            )
            .await?;
        }

        if repo::open_alert_exists(
            &self.pool,
            vehicle.vehicle_id,
            intent.alert_type.as_str(),
            intent.geofence_id,
        )
        .await?
        {
            debug!(
                "Skipped duplicate {} for vehicle {}",
                intent.alert_type.as_str(),
                vehicle.name
            );
            return Ok(());
        }

        let location = match (intent.lat, intent.lon) {
            (Some(lat), Some(lon)) => self.geocoder.reverse(lat, lon).await,
            _ => None,
        };

        repo::insert_alert(
            &self.pool,
            &NewAlert {
                alert_id: Uuid::new_v4(),
                vehicle_id: vehicle.vehicle_id,
                alert_type: intent.alert_type.as_str(),
                message: &intent.message,
                data: &intent.data,
                location: location.as_deref(),
                created_at: now,
            },
        )
        .await?;
        info!("{} created for vehicle {}", intent.alert_type.as_str(), vehicle.name);

        if let Err(e) = repo::increment_alert_counters(&self.pool, vehicle.user_id).await {
            error!("Failed to increment alert counters: {:#}", e);
        }

        self.hub
            .publish_for_owner(
                vehicle.user_id,
                Event::Alert {
                    vehicle_id: vehicle.vehicle_id,
                    vehicle_name: vehicle.name.clone(),
                    alert_type: intent.alert_type.as_str().to_string(),
                    message: intent.message.clone(),
                    location: location.unwrap_or_else(|| "Unknown location".to_string()),
                    data: intent.data.clone(),
                    timestamp: now,
                },
            )
            .await;

        Ok(())
    }

    async fn fan_out(
        &self,
        vehicle: &Vehicle,
        reduced: &reducer::ReducedState,
        transitions: &[GeofenceTransition],
        now: DateTime<Utc>,
    ) {
        if let Some(fix) = &reduced.fix {
            self.hub
                .publish_for_owner(
                    vehicle.user_id,
                    Event::PositionUpdate {
                        vehicle_id: vehicle.vehicle_id,
                        vehicle_name: vehicle.name.clone(),
                        status: reduced.status.as_str().to_string(),
                        lat: fix.lat,
                        lon: fix.lon,
                        speed: fix.speed,
                        heading: fix.heading,
                        timestamp: fix.timestamp,
                    },
                )
                .await;
        }
        for transition in transitions {
            self.hub
                .publish_for_owner(
                    vehicle.user_id,
                    Event::GeofenceTransition {
                        vehicle_id: vehicle.vehicle_id,
                        geofence_id: transition.geofence_id,
                        geofence_name: transition.geofence_name.clone(),
                        entered: transition.entered,
                        timestamp: now,
                    },
                )
                .await;
        }
    }
}
