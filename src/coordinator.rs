//! Wiring of the ingestion and registry units

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::environment::AmbientReadings;
use crate::error::Result;
use crate::ingest::RadioIngestion;
use crate::radio::{Modulation, RadioLink};
use crate::registry::{RegistrySnapshot, RegistryUnit};

/// Coordinator node: radio ingestion feeding the node registry
pub struct Coordinator {
    ingest: RadioIngestion,
    registry: RegistryUnit,
    ambient: Arc<AmbientReadings>,
}

impl Coordinator {
    pub fn new(
        radio: Arc<dyn RadioLink>,
        modulation: Modulation,
        registry_summary_interval: Duration,
    ) -> Self {
        let ambient = Arc::new(AmbientReadings::new());
        let (registry, handle) = RegistryUnit::new(registry_summary_interval);

        let mut ingest = RadioIngestion::new(radio, ambient.clone(), modulation);
        ingest.register_notification_callback(handle.into_callback());

        Self {
            ingest,
            registry,
            ambient,
        }
    }

    /// Bring up the radio and arm the first receive
    pub fn start(&mut self) -> Result<()> {
        self.ingest.start()?;
        info!("Coordinator started");
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.registry.subscribe()
    }

    pub fn ambient(&self) -> Arc<AmbientReadings> {
        self.ambient.clone()
    }

    /// Split into the blocking ingestion loop and the async registry task.
    ///
    /// The registry task ends once the ingestion unit is dropped.
    pub fn into_parts(self) -> (RadioIngestion, RegistryUnit) {
        (self.ingest, self.registry)
    }
}
