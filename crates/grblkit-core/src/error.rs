//! Error handling for GrblKit
//!
//! Provides error types for each layer of the engine:
//! - Connection errors (transport and lifecycle)
//! - Protocol errors (desynchronization, malformed reports)
//! - Configuration errors (loading and validation)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents faults of the transport or of the connection lifecycle.
/// Transport faults are fatal to the connection and are never retried here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// A read or write on the transport failed
    #[error("Transport failed: {reason}")]
    TransportFailed {
        /// The reason reported by the transport.
        reason: String,
    },

    /// Another engine already holds the transport identifier
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The reserved transport identifier.
        port: String,
    },

    /// The transport is not open
    #[error("Transport not available: {port}")]
    MissingResource {
        /// The transport identifier.
        port: String,
    },

    /// Operation requires an active connection
    #[error("Not connected")]
    NotConnected,

    /// Invalid lifecycle transition
    #[error("Invalid connection transition from {from} to {to}")]
    InvalidTransition {
        /// The current state name.
        from: String,
        /// The requested state name.
        to: String,
    },
}

/// Protocol error type
///
/// Desynchronization errors mean the host model of the device has diverged
/// and are fatal. Report-shape errors are logged and dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// An acknowledgment arrived with nothing pending
    #[error("Protocol violation: {reason}")]
    ProtocolViolation {
        /// What was observed.
        reason: String,
    },

    /// Gcode streaming and jogging were asserted at the same time
    #[error("Mode conflict: gcode streaming and jogging both active")]
    ModeConflict,

    /// The device switched unit systems under an active session
    #[error("Units changed from {from} to {to}")]
    UnitsChanged {
        /// Previously active units word.
        from: String,
        /// Newly reported units word.
        to: String,
    },

    /// A `[TYPE:...]` feedback message of unknown type
    #[error("Unrecognized feedback type: {kind}")]
    UnrecognizedFeedback {
        /// The feedback type.
        kind: String,
    },

    /// A report that looked like a known shape but could not be parsed
    #[error("Malformed report '{line}': {reason}")]
    MalformedReport {
        /// The offending line.
        line: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A line matching no known shape
    #[error("Unparsed input: {line}")]
    Unparsed {
        /// The offending line.
        line: String,
    },

    /// An `ok`/`error:` line reached the status parser
    #[error("Acknowledgment routed to status parser: {line}")]
    MisroutedAcknowledgment {
        /// The acknowledgment line.
        line: String,
    },
}

/// Configuration error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config {path}: {reason}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The configuration text is not valid TOML for `EngineConfig`
    #[error("Failed to parse config: {reason}")]
    Parse {
        /// Parser message.
        reason: String,
    },

    /// A value is out of range
    #[error("Invalid config: {reason}")]
    Invalid {
        /// Which value and why.
        reason: String,
    },
}

/// Main error type for GrblKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error must end the connection
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Io(_) => true,
            Error::Protocol(p) => matches!(
                p,
                ProtocolError::ProtocolViolation { .. }
                    | ProtocolError::ModeConflict
                    | ProtocolError::UnitsChanged { .. }
                    | ProtocolError::MisroutedAcknowledgment { .. }
            ),
            Error::Config(_) | Error::Other(_) => false,
        }
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
