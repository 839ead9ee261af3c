//! Fatal coordinator errors

use crate::radio::RadioError;

/// Unrecoverable failures of the radio ingestion path.
///
/// The runner logs these and shuts down; there is no retry.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("radio initialization failed: {0}")]
    RadioInit(#[source] RadioError),

    #[error("address filter setup failed: {0}")]
    AddressFilter(#[source] RadioError),

    #[error("failed to arm radio reception: {0}")]
    ArmReceive(#[source] RadioError),

    #[error("radio ingestion thread failed: {0}")]
    IngestThread(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
