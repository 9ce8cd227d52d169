//! Transport Error Types
//!
//! Failures of the capture and transmit layers. Per-packet decode failures
//! never appear here; they are counted as invalid bytes and the datagram is
//! discarded. What does appear is terminal for the owning loop and is
//! reported once.

use codec::CodecError;
use stream_ring::RingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket failures
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Rejected at open or start, before any datagram moves
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// A header could not be built or encoded on the transmit path
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The ring refused a span for a reason other than being closed
    #[error("Ring error on {ring}: {message}")]
    Ring { ring: String, message: String },

    /// Local filesystem I/O (statistics export)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Translate a ring failure into this layer's terms
    pub fn ring(ring: impl Into<String>, error: &RingError) -> Self {
        Self::Ring {
            ring: ring.into(),
            message: error.to_string(),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Codec(_) => "codec",
            TransportError::Ring { .. } => "ring",
            TransportError::Io { .. } => "io",
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, TransportError::Configuration { .. })
    }
}

impl From<config::ConfigError> for TransportError {
    fn from(error: config::ConfigError) -> Self {
        let field = match &error {
            config::ConfigError::Invalid { field, .. } => Some(field.clone()),
            _ => None,
        };
        Self::Configuration {
            message: error.to_string(),
            field,
        }
    }
}
