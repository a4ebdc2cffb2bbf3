//! Error types for the network simulation service

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Failed to write simulator config {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Simulator at {target} not reachable before deadline ({attempts} attempts)")]
    ReadinessTimeout { target: String, attempts: u32 },

    #[error("Readiness wait for {target} cancelled after {attempts} attempts")]
    ReadinessCancelled { target: String, attempts: u32 },

    #[error("Log source {path} unavailable: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
