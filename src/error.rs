//! Error types for gravsim.

use thiserror::Error;

/// Rejected at load time; the simulation never starts with a bad scenario.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("scenario has no bodies")]
    NoBodies,

    #[error("worker count {workers} is invalid for {bodies} bodies (need 1..={bodies})")]
    InvalidWorkerCount { workers: usize, bodies: usize },

    #[error("body '{name}': {reason}")]
    InvalidBody { name: String, reason: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("thrust references unknown body '{0}'")]
    UnknownThrustBody(String),

    #[error("thrust phase {index}: {reason}")]
    InvalidPhase { index: usize, reason: String },

    #[error("thrust phases overlap: phase starting at {first}s ends after phase starting at {second}s begins")]
    OverlappingPhases { first: f64, second: f64 },
}

/// Failure of the global reduction. Fatal for every worker in the set.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollectiveError {
    #[error("worker {rank} aborted the collective")]
    Aborted { rank: usize },

    #[error("a worker left the collective")]
    Disbanded,

    #[error("worker {rank} contributed {got} entries, expected {expected}")]
    SizeMismatch { rank: usize, got: usize, expected: usize },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("collective reduction failed: {0}")]
    Collective(#[from] CollectiveError),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, SimError>;
