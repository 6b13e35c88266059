use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::geo;
use crate::models::frame::TelemetryFrame;
use crate::models::position::{NewPosition, Position};
use crate::models::trip::{Trip, TRIP_ACTIVE, TRIP_COMPLETED, TRIP_INTERRUPTED};
use crate::models::vehicle::Vehicle;
use crate::processor::reducer::PositionFix;

/// What the state machine decided for this frame. The orchestrator turns
/// this into the corresponding inserts/updates.
#[derive(Debug)]
pub enum TripOutcome {
    /// Nothing to record (no active trip and no motion, sampling interval
    /// not reached, or the frame had no usable fix).
    None,
    /// Motion detected with no active trip: insert the trip and its first
    /// sample.
    Started { trip: Trip, sample: NewPosition },
    /// Active trip extended; `sample` is present when the sampling
    /// interval elapsed and a new position row is due.
    Extended { trip: Trip, sample: NewPosition },
    /// Ignition-off close. The trip carries its finalized summary.
    Closed { trip: Trip },
}

pub fn on_frame(
    active: Option<Trip>,
    last_sample: Option<&Position>,
    vehicle: &Vehicle,
    frame: &TelemetryFrame,
    fix: Option<&PositionFix>,
    position_interval: Duration,
    now: DateTime<Utc>,
) -> TripOutcome {
    let timestamp = fix.map(|f| f.timestamp).or(frame.timestamp).unwrap_or(now);

    if frame.ignition_off() {
        return match active {
            Some(trip) => TripOutcome::Closed {
                trip: close(trip, last_sample, frame, fix, timestamp),
            },
            // Ignition-off with nothing open is a no-op.
            None => TripOutcome::None,
        };
    }

    match active {
        None => {
            let moving = frame.ignition_on() && frame.speed() > 0.0;
            let Some(fix) = fix else {
                return TripOutcome::None;
            };
            if !moving {
                return TripOutcome::None;
            }

            let trip = Trip {
                trip_id: Uuid::new_v4(),
                vehicle_id: vehicle.vehicle_id,
                user_id: vehicle.user_id,
                status: TRIP_ACTIVE.into(),
                start_time: timestamp,
                end_time: None,
                start_lat: fix.lat,
                start_lon: fix.lon,
                end_lat: None,
                end_lon: None,
                distance_km: 0.0,
                odometer_km: 0.0,
                duration_min: 0.0,
                avg_speed_kmh: 0.0,
                max_speed_kmh: fix.speed,
                position_count: 1,
                updated_at: timestamp,
            };
            let sample = sample_from(vehicle, &trip, frame, fix);
            TripOutcome::Started { trip, sample }
        }
        Some(mut trip) => {
            let Some(fix) = fix else {
                return TripOutcome::None;
            };

            let due = match last_sample {
                None => true,
                Some(last) => timestamp - last.recorded_at >= position_interval,
            };
            if !due {
                return TripOutcome::None;
            }

            trip.position_count += 1;
            let valid_speed = fix.speed.max(0.0);
            if valid_speed > trip.max_speed_kmh {
                trip.max_speed_kmh = valid_speed;
            }
            if let Some(last) = last_sample {
                trip.distance_km += geo::haversine_km(last.lat, last.lon, fix.lat, fix.lon);
            }
            trip.updated_at = timestamp;

            let sample = sample_from(vehicle, &trip, frame, fix);
            TripOutcome::Extended { trip, sample }
        }
    }
}

/// Finalize a trip on ignition-off. End location prefers the closing
/// frame's fix and falls back to the last recorded sample.
fn close(
    mut trip: Trip,
    last_sample: Option<&Position>,
    frame: &TelemetryFrame,
    fix: Option<&PositionFix>,
    timestamp: DateTime<Utc>,
) -> Trip {
    if let (Some(last), Some(fix)) = (last_sample, fix) {
        trip.distance_km += geo::haversine_km(last.lat, last.lon, fix.lat, fix.lon);
    }

    let end = fix
        .map(|f| (f.lat, f.lon))
        .or_else(|| last_sample.map(|p| (p.lat, p.lon)));
    trip.end_lat = end.map(|(lat, _)| lat);
    trip.end_lon = end.map(|(_, lon)| lon);
    trip.end_time = Some(timestamp);

    // Device trip odometer reports meters.
    trip.odometer_km = frame.extended.trip_odometer.unwrap_or(0.0) / 1000.0;

    finalize_summary(&mut trip, timestamp);
    trip.status = TRIP_COMPLETED.into();
    trip.updated_at = timestamp;
    trip
}

/// Close a trip that stopped reporting: the last recorded sample becomes
/// the end of the trip and the status is `interrupted`.
pub fn close_for_idle(mut trip: Trip, last_sample: Option<&Position>) -> Trip {
    let end_time = last_sample.map(|p| p.recorded_at).unwrap_or(trip.updated_at);
    trip.end_lat = Some(last_sample.map(|p| p.lat).unwrap_or(trip.start_lat));
    trip.end_lon = Some(last_sample.map(|p| p.lon).unwrap_or(trip.start_lon));
    trip.end_time = Some(end_time);

    finalize_summary(&mut trip, end_time);
    trip.status = TRIP_INTERRUPTED.into();
    trip.updated_at = end_time;
    trip
}

/// Duration, then average speed from the authoritative distance: the
/// device odometer wins when it reported anything, otherwise the
/// accumulated Haversine sum.
fn finalize_summary(trip: &mut Trip, end_time: DateTime<Utc>) {
    let duration_min = (end_time - trip.start_time).num_seconds() as f64 / 60.0;
    trip.duration_min = duration_min;

    let distance = if trip.odometer_km != 0.0 {
        trip.odometer_km
    } else {
        trip.distance_km
    };
    trip.avg_speed_kmh = if duration_min > 0.0 {
        distance / (duration_min / 60.0)
    } else {
        0.0
    };
}

fn sample_from(vehicle: &Vehicle, trip: &Trip, frame: &TelemetryFrame, fix: &PositionFix) -> NewPosition {
    NewPosition {
        vehicle_id: vehicle.vehicle_id,
        trip_id: trip.trip_id,
        lat: fix.lat,
        lon: fix.lon,
        speed: fix.speed,
        ignition: fix.ignition,
        battery: frame.battery(),
        recorded_at: fix.timestamp,
    }
}
