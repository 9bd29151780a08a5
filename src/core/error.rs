// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compute Node Error Types
//!
//! Error handling for the event transport substrate. Recoverable errors
//! (`MalformedEvent`, `ConnectionLost`) are logged and absorbed by the transports;
//! fatal errors (`BindFailure`, `ForwardingFailure`) are returned up to the
//! supervisor that owns the process.

use thiserror::Error;

/// Result type for compute node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Compute node error types
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Malformed event '{line}': {message}")]
    MalformedEvent { line: String, message: String },

    #[error("Timestamp {timestamp} is outside of a single day (0..86400000000 us)")]
    TimestampOutOfRange { timestamp: i64 },

    #[error("Connection to {peer} lost: {message}")]
    ConnectionLost {
        peer: String,
        message: String,
        source: Option<std::io::Error>,
    },

    #[error("Failed to bind listening socket on {address}: {source}")]
    BindFailure {
        address: String,
        source: std::io::Error,
    },

    #[error("Forwarding to {destination} failed: {message}")]
    ForwardingFailure {
        destination: String,
        message: String,
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NodeError {
    /// Create a malformed event error for the given raw line
    pub fn malformed(line: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedEvent {
            line: line.into(),
            message: message.into(),
        }
    }

    /// Create a connection lost error
    pub fn connection_lost(peer: impl ToString, message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            peer: peer.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection lost error caused by an IO failure
    pub fn connection_lost_with_source(peer: impl ToString, source: std::io::Error) -> Self {
        Self::ConnectionLost {
            peer: peer.to_string(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a bind failure
    pub fn bind_failure(address: impl ToString, source: std::io::Error) -> Self {
        Self::BindFailure {
            address: address.to_string(),
            source,
        }
    }

    /// Create a forwarding failure caused by an IO failure
    pub fn forwarding_failure(destination: impl ToString, source: std::io::Error) -> Self {
        Self::ForwardingFailure {
            destination: destination.to_string(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a forwarding failure without an underlying IO error
    pub fn forwarding_failure_msg(destination: impl ToString, message: impl Into<String>) -> Self {
        Self::ForwardingFailure {
            destination: destination.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error with a specific key
    pub fn configuration_with_key(message: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the process can keep running after this error.
    ///
    /// Bind and forwarding failures mean the node can no longer guarantee
    /// correct output, so they terminate the pipeline link.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::BindFailure { .. }
                | NodeError::ForwardingFailure { .. }
                | NodeError::Configuration { .. }
                | NodeError::Runtime { .. }
        )
    }
}
