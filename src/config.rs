//! Configuration loaded from environment variables

use std::time::Duration;

use tracing::warn;

use crate::radio::Modulation;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Command line of an external radio bridge; the built-in node
    /// simulator is used when unset
    pub radio_bridge_cmd: Option<String>,

    /// Modulation scheme the radio is initialized with
    pub modulation: Modulation,

    /// Number of simulated nodes
    pub sim_nodes: u8,

    /// Interval between simulated transmissions
    pub sim_interval: Duration,

    /// How often the registry logs its summary
    pub registry_summary_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            radio_bridge_cmd: std::env::var("RADIO_BRIDGE_CMD")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            modulation: std::env::var("RADIO_MODULATION")
                .ok()
                .and_then(|s| match s.parse() {
                    Ok(m) => Some(m),
                    Err(e) => {
                        warn!("Ignoring RADIO_MODULATION: {}", e);
                        None
                    }
                })
                .unwrap_or_default(),

            sim_nodes: std::env::var("SIM_NODES")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .map(|n| n.clamp(1, 254) as u8)
                .unwrap_or(3),

            sim_interval: std::env::var("SIM_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(1000)),

            registry_summary_interval: std::env::var("REGISTRY_SUMMARY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
        }
    }
}
