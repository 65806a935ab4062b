//! Command descriptors.
//!
//! A [`Command`] is an inert description of one remote operation. It
//! produces its wire request through [`Command::encode`] and later turns
//! the raw result into a typed value through [`Command::decode`].
//!
//! # Built-in Commands
//!
//! | Type | Method | Output |
//! |------|--------|--------|
//! | [`RawCommand`] | any | `serde_json::Value` |
//! | [`Returning`] | any | any `DeserializeOwned` |
//! | [`EnableDomain`] | `<Domain>.enable` | `()` |
//! | [`GetTargetInfo`] | `Target.getTargetInfo` | [`TargetInfo`] |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

use super::domain::Domain;

// ============================================================================
// Command Trait
// ============================================================================

/// Method and params of an encoded command.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// Method in `Domain.action` format.
    pub method: Cow<'static, str>,
    /// Command parameters.
    pub params: Value,
}

impl Encoded {
    /// Creates an encoded command.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A serializable description of a single remote operation.
///
/// `encode` is called once when the command is sent. `decode` receives the
/// raw `result` of a success response; error responses never reach it.
pub trait Command: Send + 'static {
    /// Typed result of the command.
    type Output: Send + 'static;

    /// Produces the method and params of the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if params cannot be serialized.
    fn encode(&self) -> Result<Encoded>;

    /// Decodes the raw result payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the payload has an unexpected shape.
    fn decode(&mut self, raw: Value) -> Result<Self::Output>;
}

// ============================================================================
// RawCommand
// ============================================================================

/// Untyped command: any method, any params, result returned as JSON.
///
/// # Example
///
/// ```ignore
/// let command = RawCommand::new("Page.navigate").param("url", "https://example.com");
/// let result = connection.send(command).await?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    method: Cow<'static, str>,
    params: Map<String, Value>,
}

impl RawCommand {
    /// Creates a command with empty params.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>) -> Self {
        Self {
            method: method.into(),
            params: Map::new(),
        }
    }

    /// Creates a command from serializable params.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if params cannot be serialized
    /// - [`Error::InvalidArgument`] if params are not a JSON object
    pub fn with_params(
        method: impl Into<Cow<'static, str>>,
        params: impl Serialize,
    ) -> Result<Self> {
        match serde_json::to_value(params)? {
            Value::Object(params) => Ok(Self {
                method: method.into(),
                params,
            }),
            Value::Null => Ok(Self::new(method)),
            other => Err(Error::invalid_argument(format!(
                "command params must be an object, got {other}"
            ))),
        }
    }

    /// Adds one parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns the method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Decodes the result into `R` instead of returning raw JSON.
    #[inline]
    #[must_use]
    pub fn returning<R: DeserializeOwned + Send + 'static>(self) -> Returning<R> {
        Returning {
            inner: self,
            _output: PhantomData,
        }
    }
}

impl Command for RawCommand {
    type Output = Value;

    fn encode(&self) -> Result<Encoded> {
        Ok(Encoded::new(
            self.method.clone(),
            Value::Object(self.params.clone()),
        ))
    }

    fn decode(&mut self, raw: Value) -> Result<Value> {
        Ok(raw)
    }
}

// ============================================================================
// Returning
// ============================================================================

/// A [`RawCommand`] whose result is deserialized into `R`.
#[derive(Debug, Clone)]
pub struct Returning<R> {
    inner: RawCommand,
    _output: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Send + 'static> Command for Returning<R> {
    type Output = R;

    fn encode(&self) -> Result<Encoded> {
        self.inner.encode()
    }

    fn decode(&mut self, raw: Value) -> Result<R> {
        serde_json::from_value(raw).map_err(|e| Error::decode(self.inner.method(), e.to_string()))
    }
}

// ============================================================================
// EnableDomain
// ============================================================================

/// `<Domain>.enable`, sent during domain reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableDomain {
    domain: Domain,
}

impl EnableDomain {
    /// Creates an enable command for a domain.
    #[inline]
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    /// Returns the domain being enabled.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl Command for EnableDomain {
    type Output = ();

    fn encode(&self) -> Result<Encoded> {
        Ok(Encoded::new(self.domain.enable_method(), json!({})))
    }

    fn decode(&mut self, _raw: Value) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// GetTargetInfo
// ============================================================================

/// Information about a debugging target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target identifier.
    pub target_id: String,

    /// Target type (`page`, `iframe`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,

    /// Target title.
    #[serde(default)]
    pub title: String,

    /// Target URL.
    #[serde(default)]
    pub url: String,

    /// Whether a client is attached.
    #[serde(default)]
    pub attached: bool,

    /// Opener target, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_id: Option<String>,

    /// Whether the target can access its opener.
    #[serde(default)]
    pub can_access_opener: bool,

    /// Frame of the opener, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_frame_id: Option<String>,

    /// Browser context the target lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<String>,

    /// Target subtype (e.g. `prerender`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

/// `Target.getTargetInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetTargetInfo {
    target_id: Option<String>,
}

impl GetTargetInfo {
    /// Queries the target the connection is attached to.
    #[inline]
    #[must_use]
    pub fn current() -> Self {
        Self::default()
    }

    /// Queries a specific target.
    #[inline]
    #[must_use]
    pub fn of(target_id: impl Into<String>) -> Self {
        Self {
            target_id: Some(target_id.into()),
        }
    }
}

impl Command for GetTargetInfo {
    type Output = TargetInfo;

    fn encode(&self) -> Result<Encoded> {
        let params = match self.target_id {
            Some(ref id) => json!({ "targetId": id }),
            None => json!({}),
        };
        Ok(Encoded::new("Target.getTargetInfo", params))
    }

    fn decode(&mut self, mut raw: Value) -> Result<TargetInfo> {
        let info = raw
            .get_mut("targetInfo")
            .map(Value::take)
            .ok_or_else(|| Error::decode("Target.getTargetInfo", "missing targetInfo"))?;

        serde_json::from_value(info).map_err(|e| Error::decode("Target.getTargetInfo", e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_command_encode() {
        let command = RawCommand::new("Foo.bar").param("x", 1);
        let encoded = command.encode().expect("encode");
        assert_eq!(encoded.method, "Foo.bar");
        assert_eq!(encoded.params, json!({"x": 1}));
    }

    #[test]
    fn test_raw_command_with_params() {
        #[derive(Serialize)]
        struct Navigate<'a> {
            url: &'a str,
        }

        let command = RawCommand::with_params(
            "Page.navigate",
            Navigate {
                url: "https://example.com",
            },
        )
        .expect("object params");
        assert_eq!(
            command.encode().expect("encode").params,
            json!({"url": "https://example.com"})
        );
    }

    #[test]
    fn test_raw_command_rejects_non_object_params() {
        let err = RawCommand::with_params("Foo.bar", [1, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_returning_decode() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Answer {
            y: i32,
        }

        let mut command = RawCommand::new("Foo.bar").returning::<Answer>();
        assert_eq!(command.decode(json!({"y": 2})).expect("decode"), Answer { y: 2 });

        let err = command.decode(json!({"z": 2})).unwrap_err();
        assert!(matches!(err, Error::Decode { ref method, .. } if method == "Foo.bar"));
    }

    #[test]
    fn test_enable_domain_encode() {
        let encoded = EnableDomain::new(Domain::NETWORK).encode().expect("encode");
        assert_eq!(encoded.method, "Network.enable");
        assert_eq!(encoded.params, json!({}));
    }

    #[test]
    fn test_get_target_info_roundtrip_shape() {
        let encoded = GetTargetInfo::of("T1").encode().expect("encode");
        assert_eq!(encoded.params, json!({"targetId": "T1"}));

        let mut command = GetTargetInfo::current();
        let info = command
            .decode(json!({
                "targetInfo": {
                    "targetId": "T1",
                    "type": "page",
                    "title": "Example",
                    "url": "https://example.com/",
                    "attached": true,
                    "canAccessOpener": false,
                    "browserContextId": "B1"
                }
            }))
            .expect("decode");

        assert_eq!(info.target_id, "T1");
        assert_eq!(info.target_type, "page");
        assert!(info.attached);
        assert_eq!(info.browser_context_id.as_deref(), Some("B1"));
    }

    #[test]
    fn test_get_target_info_missing_field() {
        let err = GetTargetInfo::current().decode(json!({})).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
