//! Slice Controller - Main Entry Point
//!
//! Runs the controller against in-memory switches for every switch in the
//! configured topology. Wire sessions plug in through the same
//! `ControllerHandle`.

use slice_common::ControllerConfig;
use slice_controller::{MemoryDatapath, SliceController};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Slice Controller v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| "/etc/slice-controller/config.json".into());

    let config = ControllerConfig::load_optional(&config_path)?.unwrap_or_else(|| {
        tracing::warn!("Config {} not found, using defaults", config_path);
        ControllerConfig::default()
    });

    let dpids: Vec<_> = config.topology.switches.keys().copied().collect();
    let (controller, task) = SliceController::spawn(config)?;

    for dpid in dpids {
        controller.connect(Arc::new(MemoryDatapath::new(dpid))).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    let status = controller.status().await?;
    tracing::info!(
        "Final state {}: {} transitions, {} flow mods, {} stats replies",
        status.slice_state,
        status.transitions,
        status.flow_mods_sent,
        status.stats_replies
    );

    controller.shutdown();
    task.await?;

    Ok(())
}
