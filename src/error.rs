use std::time::Duration;
use thiserror::Error;

/// Failures reported by a radio handle.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Timeout after {0:?} waiting for transmission to complete")]
    Timeout(Duration),

    #[error("Radio hardware failure: {0}")]
    Hardware(String),

    #[error("Radio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Only a transmission timeout is recovered by the relay; everything else ends the run.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Caster rejected the request: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Every way the relay loop can end.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Correction source exhausted")]
    SourceExhausted,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting `{0}`")]
    Missing(&'static str),
}

pub type LinkResult<T> = Result<T, LinkError>;
pub type SourceResult<T> = Result<T, SourceError>;
