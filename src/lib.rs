//! Sensor network coordinator
//!
//! Listens for sensor node frames, acknowledges each valid one and keeps the
//! latest report of up to seven nodes in a ring-evicting registry.

pub mod config;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod radio;
pub mod registry;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
