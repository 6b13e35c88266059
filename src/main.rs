mod config;
mod db;
mod geo;
mod geocoding;
mod jobs;
mod models;
mod processor;
mod realtime;
mod tcp;

use std::sync::Arc;

use config::AppConfig;
use geocoding::ReverseGeocoder;
use processor::pipeline::Pipeline;
use processor::VehicleLocks;
use realtime::Hub;
use tcp::TcpReceiver;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting FleetTrace ingestion service...");

    // Init DB
    let pool = db::init_pool(&config.database_url).await?;
    info!("Connected to database");

    let hub = Arc::new(Hub::new());
    let geocoder = Arc::new(ReverseGeocoder::new(
        &config.geocoding_url,
        &config.geocoding_api_key,
    )?);
    let locks = Arc::new(VehicleLocks::new());
    let pipeline = Arc::new(Pipeline::new(
        pool.clone(),
        hub.clone(),
        geocoder,
        locks.clone(),
        &config,
    ));

    // Background sweeps share the per-vehicle locks with the pipeline.
    tokio::spawn(jobs::run_trip_sweep(pool.clone(), locks.clone(), config.clone()));
    tokio::spawn(jobs::run_stale_vehicle_sweep(pool, locks, config.clone()));

    // Run the feed receiver until it gives up reconnecting.
    let receiver = TcpReceiver::new(config, pipeline);
    receiver.run().await
}
