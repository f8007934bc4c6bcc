//! Unified error type, grounded on `src/heimdall_error.rs`'s `thiserror`-derived enum pattern —
//! pruned to the kinds SPEC_FULL §7 actually calls for. DNSSEC/zone/dynamic-update/TLS-client-cert
//! variants from the teacher's enum are dropped as non-goals.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForwarderError>;

#[derive(Debug, Error, Clone)]
pub enum ForwarderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout waiting for upstream response")]
    Timeout,

    #[error("malformed DNS message: {0}")]
    Format(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cache operation failed: {0}")]
    Cache(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ForwarderError {
    fn from(e: std::io::Error) -> Self {
        ForwarderError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ForwarderError {
    fn from(e: serde_json::Error) -> Self {
        ForwarderError::Config(e.to_string())
    }
}

impl From<crate::dns::WireError> for ForwarderError {
    fn from(e: crate::dns::WireError) -> Self {
        ForwarderError::Format(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ForwarderError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ForwarderError::Timeout
    }
}
