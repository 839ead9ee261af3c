//! Sensor Coordinator - star-topology sensor network hub
//!
//! Receives sensor node reports through a radio link, acknowledges them and
//! keeps the latest value per node in a seven-slot registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sensor_coordinator::environment::AmbientReadings;
use sensor_coordinator::ingest::IngestSummary;
use sensor_coordinator::radio::{BridgeRadio, LoopbackRadio, NodeSimulator, RadioLink};
use sensor_coordinator::registry::RegistrySnapshot;
use sensor_coordinator::{Config, Coordinator, CoordinatorError};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   Sensor Coordinator");
    info!("   star network hub, 7-node registry");
    info!("===========================================");

    let config = Config::from_env();

    info!("Configuration:");
    info!("  Modulation: {}", config.modulation);
    match &config.radio_bridge_cmd {
        Some(cmd) => info!("  Radio bridge: {}", cmd),
        None => {
            info!("  Radio: loopback with simulated nodes");
            info!("  Simulated nodes: {}", config.sim_nodes);
            info!("  Simulation interval: {} ms", config.sim_interval.as_millis());
        }
    }
    info!(
        "  Registry summary every {} s",
        config.registry_summary_interval.as_secs()
    );

    // Pick the radio link
    let mut simulator = None;
    let mut bridge = None;
    let radio: Arc<dyn RadioLink> = match &config.radio_bridge_cmd {
        Some(cmd) => match BridgeRadio::spawn(cmd) {
            Ok(spawned) => {
                let spawned = Arc::new(spawned);
                bridge = Some(spawned.clone());
                spawned
            }
            Err(e) => {
                error!("Failed to start radio bridge: {}", e);
                return Err(e).context("radio bridge");
            }
        },
        None => {
            let loopback = Arc::new(LoopbackRadio::new());
            simulator = Some(NodeSimulator::new(
                loopback.clone(),
                config.sim_nodes,
                config.sim_interval,
            ));
            loopback
        }
    };

    let mut coordinator = Coordinator::new(
        radio,
        config.modulation,
        config.registry_summary_interval,
    );

    if let Err(e) = coordinator.start() {
        error!("Failed to start coordinator: {}", e);
        return Err(e.into());
    }

    let ambient = coordinator.ambient();
    let snapshots = coordinator.subscribe();
    let (ingest, registry) = coordinator.into_parts();

    let registry_handle = tokio::spawn(registry.run());
    let display_handle = tokio::spawn(display_nodes(snapshots, ambient));

    // Radio ingestion blocks on its event channel, so it gets its own thread
    let running = Arc::new(AtomicBool::new(true));
    let (done_tx, mut done_rx) = oneshot::channel::<Result<IngestSummary, CoordinatorError>>();
    let flag = running.clone();
    thread::Builder::new()
        .name("radio-ingest".to_string())
        .spawn(move || {
            let _ = done_tx.send(ingest.run(flag));
        })
        .context("Failed to spawn radio ingestion thread")?;

    if let Some(sim) = &simulator {
        sim.start()?;
    }

    info!("===========================================");
    info!("  Listening for sensor nodes...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            None
        }
        result = &mut done_rx => Some(result),
    };

    // Cleanup
    running.store(false, Ordering::SeqCst);
    if let Some(sim) = &simulator {
        sim.stop();
    }

    let outcome = match outcome {
        Some(result) => result,
        None => done_rx.await,
    };
    let ingest_result = outcome
        .map_err(|_| CoordinatorError::IngestThread("exited without reporting".to_string()))
        .and_then(|r| r);

    // Ingestion owned the last registry handle, so the registry task ends too
    let registry = registry_handle.await.context("registry task panicked")?;
    display_handle.abort();

    info!("Final registry:");
    for (index, slot) in registry.slots().iter().enumerate() {
        if slot.is_occupied() {
            info!(
                "  [{}] node {:#04x} adc={} button={} rssi={} dBm reports={}",
                index,
                slot.node.address,
                slot.node.latest_adc_value,
                slot.node.button,
                slot.node.latest_rssi,
                slot.reports
            );
        }
    }
    info!("{}", registry.stats_summary());

    if let Some(bridge) = &bridge {
        info!(
            "Bridge '{}': {} frames, {} dropped while idle, {} filtered",
            bridge.command(),
            bridge.frames_received(),
            bridge.dropped_idle(),
            bridge.dropped_filtered()
        );
    }

    match ingest_result {
        Ok(summary) => {
            info!("Shutdown complete. {}", summary);
            Ok(())
        }
        Err(e) => {
            error!("Radio ingestion failed: {}", e);
            Err(e.into())
        }
    }
}

/// Log the occupied slots whenever the registry changes
async fn display_nodes(
    mut snapshots: tokio::sync::watch::Receiver<RegistrySnapshot>,
    ambient: Arc<AmbientReadings>,
) {
    let mut last_line = String::new();
    while snapshots.changed().await.is_ok() {
        let line = {
            let slots = snapshots.borrow_and_update();
            slots
                .iter()
                .filter(|s| s.is_occupied())
                .map(|s| format!("{:02X}:{}/{}", s.node.address, s.node.latest_adc_value, s.node.button))
                .collect::<Vec<_>>()
                .join(" ")
        };

        if line != last_line {
            let latest = ambient.latest();
            info!(
                "[Nodes] {} | ambient {}F {}%",
                line,
                latest.temperature.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                latest.humidity.map(|h| h.to_string()).unwrap_or_else(|| "-".into())
            );
            last_line = line;
        }
    }
    debug!("Registry display stopped");
}
