//! Request and Response message types.
//!
//! Defines the JSON frames exchanged for commands, and the structural
//! check that splits incoming frames into responses and events.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ProtocolError, Result};
use crate::identifiers::TransactionId;

use super::Event;

// ============================================================================
// Request
// ============================================================================

/// A command request from local end to remote end.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Domain.action",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    /// Correlation id.
    pub id: TransactionId,

    /// Method in `Domain.action` format.
    pub method: &'a str,

    /// Command parameters.
    pub params: &'a Value,
}

impl<'a> Request<'a> {
    /// Creates a request.
    #[inline]
    #[must_use]
    pub fn new(id: TransactionId, method: &'a str, params: &'a Value) -> Self {
        Self { id, method, params }
    }

    /// Serializes the request into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if params cannot be serialized.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Response
// ============================================================================

/// A command response from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: TransactionId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error details (if error).
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

impl Response {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(id: TransactionId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn failure(id: TransactionId, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorPayload {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// A missing `result` on a success frame yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::Protocol(error.into())),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// ErrorPayload
// ============================================================================

/// Error object of a failed command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorPayload {
    /// Remote error code.
    #[serde(default)]
    pub code: i64,

    /// Remote error message.
    #[serde(default)]
    pub message: String,

    /// Optional details.
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<ErrorPayload> for ProtocolError {
    fn from(payload: ErrorPayload) -> Self {
        let mut error = ProtocolError::new(payload.code, payload.message);
        error.data = payload.data;
        error
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// A classified incoming frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Frame carrying an `id`: answer to a command.
    Response(Response),
    /// Frame without an `id`: unsolicited event.
    Event(Event),
}

impl Incoming {
    /// Parses a text frame and classifies it by the presence of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the frame is not valid JSON or does not
    /// match the shape its classification requires.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("id").is_some() {
            Ok(Self::Response(serde_json::from_value(value)?))
        } else {
            Ok(Self::Event(serde_json::from_value(value)?))
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
    fn test_request_serialization() {
        let params = json!({"x": 1});
        let request = Request::new(TransactionId::new(3), "Foo.bar", &params);
        let frame = request.to_frame().expect("serialize");

        let value: Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(value, json!({"id": 3, "method": "Foo.bar", "params": {"x": 1}}));
    }

    #[test]
    fn test_success_response() {
        let incoming = Incoming::parse(r#"{"id": 3, "result": {"y": 2}}"#).expect("parse");
        let Incoming::Response(response) = incoming else {
            panic!("expected response");
        };

        assert_eq!(response.id, TransactionId::new(3));
        assert!(!response.is_error());
        assert_eq!(response.into_result().expect("success"), json!({"y": 2}));
    }

    #[test]
    fn test_error_response() {
        let incoming = Incoming::parse(r#"{"id": 4, "error": {"code": 5, "message": "boom"}}"#)
            .expect("parse");
        let Incoming::Response(response) = incoming else {
            panic!("expected response");
        };

        assert!(response.is_error());
        let err = response.into_result().unwrap_err();
        let protocol = err.as_protocol().expect("protocol error");
        assert_eq!(protocol.code, 5);
        assert_eq!(protocol.message, "boom");
    }

    #[test]
    fn test_response_without_result() {
        let response = Response {
            id: TransactionId::new(1),
            result: None,
            error: None,
        };
        assert_eq!(response.into_result().expect("success"), Value::Null);
    }

    #[test]
    fn test_event_classification() {
        let incoming = Incoming::parse(r#"{"method": "Page.loadEventFired", "params": {}}"#)
            .expect("parse");
        assert!(matches!(incoming, Incoming::Event(ref e) if e.method == "Page.loadEventFired"));
    }

    #[test]
    fn test_invalid_frame() {
        assert!(Incoming::parse("not json").is_err());
        assert!(Incoming::parse(r#"{"params": {}}"#).is_err());
        assert!(Incoming::parse(r#"{"id": "abc"}"#).is_err());
    }
}
