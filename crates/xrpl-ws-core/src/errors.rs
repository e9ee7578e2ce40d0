//! Error types for the XRPL WebSocket client
//!
//! `ClientError` is the single error type surfaced by the client facade.
//! Transport failures and state machine violations are wrapped into it so
//! callers only have to match on one enum.

use serde_json::Value;

use crate::state::StateTransitionError;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures reported by a transport implementation
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },
    #[error("Transport closed")]
    Closed,
    #[error("Close failed: {reason}")]
    CloseFailed { reason: String },
}

// ----------------------------------------------------------------------------
// Client Errors
// ----------------------------------------------------------------------------

/// Errors returned by client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A request was attempted while no connection is open
    #[error("Not connected")]
    NotConnected,

    /// No response arrived within the response timeout
    #[error("Timed out after {duration_ms}ms waiting for response to request {id}")]
    Timeout { id: String, duration_ms: u64 },

    /// A response arrived without a usable identifier
    #[error("Malformed response: {reason}")]
    ResponseFormat { reason: String, data: Value },

    /// The connection was torn down while the operation was pending
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// The request payload cannot be sent as given
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ClientError {
    /// Create a timeout error for a request id
    pub fn timeout<T: Into<String>>(id: T, duration_ms: u64) -> Self {
        ClientError::Timeout {
            id: id.into(),
            duration_ms,
        }
    }

    /// Create a response format error carrying the offending message
    pub fn response_format<T: Into<String>>(reason: T, data: Value) -> Self {
        ClientError::ResponseFormat {
            reason: reason.into(),
            data,
        }
    }

    /// Create a disconnected error with a reason
    pub fn disconnected<T: Into<String>>(reason: T) -> Self {
        ClientError::Disconnected {
            reason: reason.into(),
        }
    }

    /// Create an invalid request error with a reason
    pub fn invalid_request<T: Into<String>>(reason: T) -> Self {
        ClientError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ClientError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the connection error family
    ///
    /// These are the failures a caller can expect from an unreliable link
    /// and usually retry.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::Timeout { .. }
                | ClientError::ResponseFormat { .. }
                | ClientError::Disconnected { .. }
                | ClientError::Transport(_)
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type ClientResult<T> = core::result::Result<T, ClientError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
