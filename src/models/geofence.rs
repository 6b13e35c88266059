use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::geo;

pub const KIND_CIRCLE: &str = "circle";
pub const KIND_POLYGON: &str = "polygon";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub lat: f64,
    pub lon: f64,
}

/// A named region assigned to vehicles. Owned by the management layer;
/// the pipeline only reads these.
#[derive(Debug, Clone, FromRow)]
pub struct Geofence {
    pub geofence_id: Uuid,
    pub name: String,
    pub kind: String,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub radius_m: Option<f64>,
    pub vertices: Option<Json<Vec<Vertex>>>,
    pub active: bool,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

impl Geofence {
    /// Containment test for the current position. Misconfigured rows
    /// (circle without center/radius, polygon with < 3 vertices) contain
    /// nothing.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match self.kind.as_str() {
            KIND_CIRCLE => match (self.center_lat, self.center_lon, self.radius_m) {
                (Some(clat), Some(clon), Some(radius)) => {
                    geo::haversine_m(lat, lon, clat, clon) <= radius
                }
                _ => false,
            },
            KIND_POLYGON => match &self.vertices {
                Some(Json(ring)) if ring.len() >= 3 => {
                    let ring: Vec<(f64, f64)> = ring.iter().map(|v| (v.lat, v.lon)).collect();
                    geo::point_in_polygon((lat, lon), &ring)
                }
                _ => false,
            },
            _ => false,
        }
    }
}
