use privfs_bus::BusError;
use privfs_config::ConfigError;
use privfs_telemetry::TelemetryError;
use thiserror::Error;

/// Failures that stop the worker from starting or running.
///
/// Per-message failures never surface here; they become replies, events or
/// queue dispositions.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The broker rejected a subscription or stream setup.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type for worker startup and shutdown.
pub type WorkerResult<T> = Result<T, WorkerError>;
