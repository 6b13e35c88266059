pub mod alert;
pub mod frame;
pub mod geofence;
pub mod position;
pub mod trip;
pub mod vehicle;
