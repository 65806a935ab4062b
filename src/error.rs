//! Error types for the CDP connection.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_wire::{Connection, Result, RawCommand};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     let version = connection.send(RawCommand::new("Browser.getVersion")).await?;
//!     println!("{version}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ChannelClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Decode`] |
//! | Lifecycle | [`Error::AlreadyResolved`], [`Error::IdAlreadyAssigned`] |
//! | Execution | [`Error::RequestTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::TransactionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ProtocolError
// ============================================================================

/// Error reported by the remote end for a command.
///
/// Carries the remote-supplied `code` and `message`. Once the error leaves
/// [`Connection::send`](crate::Connection::send) it is augmented with the
/// method and params of the command that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    /// Remote error code.
    pub code: i64,
    /// Remote error message.
    pub message: String,
    /// Optional remote error details.
    pub data: Option<Value>,
    /// Method of the failed command (set after augmentation).
    pub method: Option<String>,
    /// Params of the failed command (set after augmentation).
    pub params: Option<Value>,
}

impl ProtocolError {
    /// Creates a protocol error from a remote code and message.
    #[inline]
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            method: None,
            params: None,
        }
    }

    /// Attaches the command that produced this error.
    #[must_use]
    pub fn with_command(mut self, method: impl Into<String>, params: Value) -> Self {
        self.method = Some(method.into());
        self.params = Some(params);
        self
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [code: {}]", self.message, self.code)?;

        if let Some(ref method) = self.method {
            write!(f, "\ncommand: {method}")?;
        }
        if let Some(ref params) = self.params {
            write!(f, "\nparams: {params}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options are inconsistent.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an API call.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the socket cannot be established or written.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timeout while establishing the connection.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The transport is closed.
    ///
    /// Returned when no socket is open to write to.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Remote end reported an error for a command.
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// Result payload did not have the expected shape.
    #[error("Decode error for {method}: {message}")]
    Decode {
        /// Method whose result failed to decode.
        method: String,
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// A transaction was resolved twice.
    #[error("Transaction {id} already resolved")]
    AlreadyResolved {
        /// The transaction's ID.
        id: TransactionId,
    },

    /// A transaction was assigned an ID twice.
    #[error("Transaction already has id {id}")]
    IdAlreadyAssigned {
        /// The ID assigned first.
        id: TransactionId,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Command request timeout.
    ///
    /// The transaction stays registered; a late response is dropped.
    #[error("Request {method} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Method of the request that timed out.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// A transaction was dropped before it was resolved.
    ///
    /// Happens when the connection owning the pending table is dropped
    /// while a caller still awaits the reply.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error from a remote code and message.
    #[inline]
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::new(code, message))
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates an already-resolved error.
    #[inline]
    pub fn already_resolved(id: TransactionId) -> Self {
        Self::AlreadyResolved { id }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Attaches the failed command to a protocol error.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_command(self, method: &str, params: &Value) -> Self {
        match self {
            Self::Protocol(err) => Self::Protocol(err.with_command(method, params.clone())),
            other => other,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ChannelClosed(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the remote end rejected the command or its
    /// result could not be decoded.
    ///
    /// Callers treat both the same way.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Decode { .. })
    }

    /// Returns the remote protocol error, if this is one.
    #[inline]
    #[must_use]
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::protocol(5, "boom");
        assert_eq!(err.to_string(), "Protocol error: boom [code: 5]");
    }

    #[test]
    fn test_protocol_error_with_command() {
        let err = Error::protocol(-32601, "'Foo.bar' wasn't found")
            .with_command("Foo.bar", &json!({"x": 1}));

        let protocol = err.as_protocol().expect("protocol error");
        assert_eq!(protocol.code, -32601);
        assert_eq!(protocol.method.as_deref(), Some("Foo.bar"));
        assert_eq!(protocol.params, Some(json!({"x": 1})));

        let text = err.to_string();
        assert!(text.contains("command: Foo.bar"));
        assert!(text.contains(r#"params: {"x":1}"#));
    }

    #[test]
    fn test_with_command_ignores_other_variants() {
        let err = Error::ConnectionClosed.with_command("Foo.bar", &json!({}));
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout("Page.navigate", 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::protocol(1, "x").is_protocol_error());
        assert!(Error::decode("Foo.bar", "missing field").is_protocol_error());
        assert!(!Error::ConnectionClosed.is_protocol_error());
    }

    #[tokio::test]
    async fn test_from_recv_error() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        drop(tx);
        let err: Error = rx.await.unwrap_err().into();
        assert!(matches!(err, Error::ChannelClosed(_)));
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
