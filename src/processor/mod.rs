use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub mod alerts;
pub mod geofence;
pub mod pipeline;
pub mod reducer;
pub mod trip;

/// Per-vehicle serialization. Every read-modify-write of a vehicle's state
/// (live frames and the sweeps alike) holds this lock for the duration, so
/// a sweep can never race a frame that reopens a trip.
#[derive(Default)]
pub struct VehicleLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl VehicleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, vehicle_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(vehicle_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
