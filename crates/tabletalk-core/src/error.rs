//! Error types for Tabletalk Core

use thiserror::Error;

/// Result type alias using Tabletalk Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Turn-level errors surfaced by the session controller.
///
/// Capability-level failures never appear here: the registry converts them
/// into `CapabilityOutcome { success: false, .. }` data so the decision model
/// can see and react to them in the next round.
#[derive(Error, Debug)]
pub enum Error {
    #[error("decision model unavailable: {0}")]
    Adapter(String),

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("capability round limit ({0}) reached; please simplify the request")]
    TooManyRounds(usize),

    #[error("a request is already in progress")]
    Busy,

    #[error("session error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Capability-specific errors
///
/// These are raised by capability handlers and the registry's argument
/// validation, then wrapped into failed outcomes at the registry boundary.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("unknown capability: {0}")]
    Unknown(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}
