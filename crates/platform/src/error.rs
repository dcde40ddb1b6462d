//! Error types for halyard

use std::fmt;

/// Unified error type for all halyard operations
#[derive(Debug)]
pub enum HalyardError {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Protocol error
    Protocol(String),

    /// Security error (key exchange, integrity, etc.)
    Security(String),

    /// Not implemented
    NotImplemented(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for HalyardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalyardError::Io(e) => write!(f, "IO error: {}", e),
            HalyardError::Config(msg) => write!(f, "Configuration error: {}", msg),
            HalyardError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            HalyardError::Security(msg) => write!(f, "Security error: {}", msg),
            HalyardError::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            HalyardError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for HalyardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HalyardError::Io(e) => Some(e),
            HalyardError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HalyardError {
    fn from(err: std::io::Error) -> Self {
        HalyardError::Io(err)
    }
}

/// Result type for halyard operations
pub type HalyardResult<T> = Result<T, HalyardError>;
