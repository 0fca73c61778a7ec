//! Startup error types.

use ledger::LedgerError;
use thiserror::Error;

/// Errors that stop the service from starting.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to prepare schema: {0}")]
    Schema(#[from] LedgerError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
