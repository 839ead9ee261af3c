//! Registry unit: owns the [`NodeRegistry`] on a tokio task
//!
//! Classified packets arrive through a [`RegistryHandle`] as owned
//! [`SensorNode`] values. The unit is the only writer of the table and
//! publishes a snapshot after each change.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::protocol::CoordinatorPacket;

use super::{NodeRegistry, Observation, RegistrySnapshot, SensorNode};

/// Reports buffered between classification and the registry loop
pub const NODE_QUEUE_DEPTH: usize = 64;

/// Sending side, handed to the ingestion unit as its notification callback
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<SensorNode>,
}

impl RegistryHandle {
    /// Extract the node fields from a classified packet and queue them.
    ///
    /// Only sensor packets have an effect; legacy ADC frames report button 0.
    pub fn on_packet_classified(&self, packet: CoordinatorPacket, rssi: i8) {
        let node = match packet {
            CoordinatorPacket::AdcSensor(p) => SensorNode {
                address: p.header.source_address,
                latest_adc_value: p.adc_value,
                button: 0,
                latest_rssi: rssi,
            },
            CoordinatorPacket::DualModeSensor(p) => SensorNode {
                address: p.header.source_address,
                latest_adc_value: p.adc_value,
                button: p.button,
                latest_rssi: rssi,
            },
            CoordinatorPacket::Ack(_) => return,
        };

        // Never wait here: this runs on the radio ingestion thread
        if let Err(e) = self.tx.try_send(node) {
            warn!("Registry queue unavailable, dropping node {:#04x}: {}", node.address, e);
        }
    }

    /// Closure form accepted by `RadioIngestion::register_notification_callback`
    pub fn into_callback(self) -> impl FnMut(CoordinatorPacket, i8) + Send + 'static {
        move |packet, rssi| self.on_packet_classified(packet, rssi)
    }
}

pub struct RegistryUnit {
    registry: NodeRegistry,
    rx: mpsc::Receiver<SensorNode>,
    snapshot_tx: watch::Sender<RegistrySnapshot>,
    summary_interval: Duration,
}

impl RegistryUnit {
    pub fn new(summary_interval: Duration) -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::channel(NODE_QUEUE_DEPTH);
        let registry = NodeRegistry::new();
        let (snapshot_tx, _) = watch::channel(registry.snapshot());

        let unit = Self {
            registry,
            rx,
            snapshot_tx,
            summary_interval,
        };
        (unit, RegistryHandle { tx })
    }

    /// Receiver that sees the table after every change
    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run until every handle is dropped, then return the final table
    pub async fn run(mut self) -> NodeRegistry {
        info!("Registry unit started");

        let mut summary = tokio::time::interval(self.summary_interval);
        // First tick completes immediately
        summary.tick().await;

        loop {
            tokio::select! {
                report = self.rx.recv() => match report {
                    Some(node) => self.apply(node),
                    None => break,
                },
                _ = summary.tick() => {
                    info!("[Registry] {}", self.registry.stats_summary());
                }
            }
        }

        info!("Registry unit stopped. {}", self.registry.stats_summary());
        self.registry
    }

    fn apply(&mut self, node: SensorNode) {
        match self.registry.observe(node) {
            Observation::Updated { slot } => {
                debug!(
                    "Node {:#04x} updated in slot {}: adc={} button={} rssi={}",
                    node.address, slot, node.latest_adc_value, node.button, node.latest_rssi
                );
            }
            Observation::Inserted { slot, evicted } => {
                info!(
                    "Node {:#04x} registered in slot {}{}",
                    node.address,
                    slot,
                    evicted
                        .map(|old| format!(" (replaced {:#04x})", old.address))
                        .unwrap_or_default()
                );
            }
        }

        self.snapshot_tx.send_replace(self.registry.snapshot());
    }
}
