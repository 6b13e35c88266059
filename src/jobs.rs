use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::db::repo;
use crate::db::DbPool;
use crate::models::trip::Trip;
use crate::processor::{trip, VehicleLocks};

/// Close trips that stopped receiving updates. Runs on a timer and takes
/// the same per-vehicle lock as the live pipeline, so it cannot race a
/// frame that is still extending the trip.
pub async fn run_trip_sweep(pool: DbPool, locks: Arc<VehicleLocks>, config: AppConfig) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - Duration::minutes(config.trip_idle_timeout_min);

        let stale = match repo::stale_active_trips(&pool, cutoff).await {
            Ok(trips) => trips,
            Err(e) => {
                error!("Idle-trip sweep query failed: {:#}", e);
                continue;
            }
        };

        for candidate in stale {
            if let Err(e) = close_idle_trip(&pool, &locks, &candidate, cutoff).await {
                error!("Failed to close idle trip {}: {:#}", candidate.trip_id, e);
            }
        }
    }
}

async fn close_idle_trip(
    pool: &DbPool,
    locks: &VehicleLocks,
    candidate: &Trip,
    cutoff: DateTime<Utc>,
) -> Result<()> {
    let _guard = locks.acquire(candidate.vehicle_id).await;

    let mut tx = pool.begin().await?;
    let Some(current) = repo::active_trip(&mut *tx, candidate.vehicle_id).await? else {
        return Ok(());
    };
    // A frame may have closed this trip and opened a new one, or extended
    // it past the cutoff, between the scan and taking the lock.
    if current.trip_id != candidate.trip_id || current.updated_at >= cutoff {
        return Ok(());
    }

    let last_sample = repo::last_trip_position(&mut *tx, current.trip_id).await?;
    let trip_id = current.trip_id;
    let vehicle_id = current.vehicle_id;
    let closed = trip::close_for_idle(current, last_sample.as_ref());
    repo::close_trip(&mut *tx, &closed).await?;
    tx.commit().await?;

    info!(
        "Closed idle trip {} for vehicle {} | {:.2} km in {:.1} min",
        trip_id, vehicle_id, closed.distance_km, closed.duration_min
    );
    Ok(())
}

/// Mark vehicles inactive once their last position update is older than
/// the configured window. Immobilized vehicles are left alone.
pub async fn run_stale_vehicle_sweep(pool: DbPool, locks: Arc<VehicleLocks>, config: AppConfig) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - Duration::minutes(config.vehicle_stale_timeout_min);

        let stale = match repo::stale_vehicle_ids(&pool, cutoff).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Stale-vehicle sweep query failed: {:#}", e);
                continue;
            }
        };

        for vehicle_id in stale {
            let _guard = locks.acquire(vehicle_id).await;
            match repo::mark_vehicle_inactive_if_stale(&pool, vehicle_id, cutoff).await {
                Ok(flipped) if flipped > 0 => info!("Marked vehicle {} inactive", vehicle_id),
                Ok(_) => {}
                Err(e) => error!("Failed to mark vehicle {} inactive: {:#}", vehicle_id, e),
            }
        }
    }
}
