//! Error types for the FlexRelay discovery relay.
//!
//! All errors implement `std::error::Error` and are serializable so they
//! can appear verbatim in diagnostics output and structured logs.

use flexrelay_proto::{DecodeError, FrameError};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias using RelayError as the error type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Top-level error type for all relay operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum RelayError {
    /// Socket-level failures on any of the three transports (capture,
    /// stream, rebroadcast).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed discovery packets or stream frames.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Shared-file transport errors
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors related to network transports.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum TransportError {
    /// Failed to establish a connection
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    /// Connection was unexpectedly closed
    #[error("Connection closed unexpectedly: {reason}")]
    ConnectionClosed { reason: String },

    /// Connection was reset by peer
    #[error("Connection reset by peer")]
    ConnectionReset,

    /// Connection timeout
    #[error("Connection timeout after {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },

    /// Read operation timed out
    #[error("Read timeout after {timeout_secs}s")]
    ReadTimeout { timeout_secs: u64 },

    /// Write operation timed out
    #[error("Write timeout after {timeout_secs}s")]
    WriteTimeout { timeout_secs: u64 },

    /// Failed to bind a local socket
    #[error("Failed to bind {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Accepting a new consumer would exceed the configured limit
    #[error("Client limit reached ({max_clients})")]
    ClientLimitReached { max_clients: usize },

    /// Connection is not established
    #[error("Not connected")]
    NotConnected,
}

impl TransportError {
    /// Creates a connection failed error.
    pub fn failed(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Creates a connection closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Creates a bind failed error.
    pub fn bind_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error is transient and the operation can be
    /// retried on the next reconnect cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed { .. }
                | TransportError::ConnectionClosed { .. }
                | TransportError::ConnectionReset
                | TransportError::ConnectTimeout { .. }
                | TransportError::ReadTimeout { .. }
                | TransportError::WriteTimeout { .. }
        )
    }
}

/// Errors related to wire data.
///
/// A protocol error condemns the offending packet or frame, never the
/// connection that carried it.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ProtocolError {
    /// Datagram failed the discovery header check
    #[error("Invalid discovery packet: {reason}")]
    InvalidPacket { reason: String },

    /// Stream frame could not be parsed
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },
}

impl From<DecodeError> for ProtocolError {
    fn from(err: DecodeError) -> Self {
        Self::InvalidPacket {
            reason: err.to_string(),
        }
    }
}

impl From<FrameError> for ProtocolError {
    fn from(err: FrameError) -> Self {
        Self::MalformedFrame {
            reason: err.to_string(),
        }
    }
}

impl From<DecodeError> for RelayError {
    fn from(err: DecodeError) -> Self {
        RelayError::Protocol(err.into())
    }
}

impl From<FrameError> for RelayError {
    fn from(err: FrameError) -> Self {
        RelayError::Protocol(err.into())
    }
}

/// Errors related to configuration.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation failed error.
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }
}

/// Errors in the shared-file transport.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ResourceError {
    /// Shared file does not exist yet
    #[error("Shared file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to read the shared file
    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    /// Failed to write the shared file
    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    /// Shared file has not been updated recently enough
    #[error("Shared file {path} is stale ({age_secs}s old)")]
    Stale { path: String, age_secs: u64 },
}

impl ResourceError {
    /// Creates a read failed error.
    pub fn read_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Wrapper for I/O errors to make them serializable.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("I/O error: {kind:?}: {message}")]
pub struct IoError {
    pub kind: IoErrorKind,
    pub message: String,
}

impl From<io::Error> for IoError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: err.kind().into(),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        RelayError::Io(err.into())
    }
}

/// Serializable version of std::io::ErrorKind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    NotConnected,
    AddrInUse,
    AddrNotAvailable,
    BrokenPipe,
    WouldBlock,
    InvalidInput,
    InvalidData,
    TimedOut,
    Interrupted,
    UnexpectedEof,
    Other,
}

impl From<io::ErrorKind> for IoErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => IoErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => IoErrorKind::PermissionDenied,
            io::ErrorKind::ConnectionRefused => IoErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset => IoErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted => IoErrorKind::ConnectionAborted,
            io::ErrorKind::NotConnected => IoErrorKind::NotConnected,
            io::ErrorKind::AddrInUse => IoErrorKind::AddrInUse,
            io::ErrorKind::AddrNotAvailable => IoErrorKind::AddrNotAvailable,
            io::ErrorKind::BrokenPipe => IoErrorKind::BrokenPipe,
            io::ErrorKind::WouldBlock => IoErrorKind::WouldBlock,
            io::ErrorKind::InvalidInput => IoErrorKind::InvalidInput,
            io::ErrorKind::InvalidData => IoErrorKind::InvalidData,
            io::ErrorKind::TimedOut => IoErrorKind::TimedOut,
            io::ErrorKind::Interrupted => IoErrorKind::Interrupted,
            io::ErrorKind::UnexpectedEof => IoErrorKind::UnexpectedEof,
            _ => IoErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_transient() {
        let err = TransportError::ConnectTimeout { timeout_secs: 10 };
        assert!(err.is_transient());

        let err = TransportError::ClientLimitReached { max_clients: 10 };
        assert!(!err.is_transient());
    }

    #[test]
    fn error_serialization() {
        let err = RelayError::Transport(TransportError::failed(
            "192.168.1.100",
            4993,
            "connection refused",
        ));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Transport"));
        assert!(json.contains("192.168.1.100"));
    }

    #[test]
    fn decode_error_maps_to_protocol() {
        let err: RelayError = DecodeError::InvalidHeader("too short".to_string()).into();
        assert!(matches!(
            err,
            RelayError::Protocol(ProtocolError::InvalidPacket { .. })
        ));
    }

    #[test]
    fn config_error_helpers() {
        let err = ConfigError::file_not_found("/etc/flexrelay/config.yaml");
        assert!(matches!(err, ConfigError::FileNotFound { .. }));

        let err = ConfigError::invalid_value("server.stream_port", "port cannot be 0");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
