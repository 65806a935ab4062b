//! Event message types.
//!
//! Events are unsolicited frames sent by the remote end. They carry no `id`
//! and are routed to handlers by their [`EventCategory`] (the method name).
//!
//! Payload shapes are declared by callers through [`EventSchema`]; this
//! module only knows the envelope.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

use super::domain::Domain;

// ============================================================================
// EventCategory
// ============================================================================

/// Event type tag in `Domain.eventName` format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventCategory(Cow<'static, str>);

impl EventCategory {
    /// Creates a category from its method name.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<Cow<'static, str>>) -> Self {
        Self(method.into())
    }

    /// Returns the full method name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the owning domain.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let category = EventCategory::new("Network.requestWillBeSent");
    /// assert_eq!(category.domain(), Domain::NETWORK);
    /// ```
    #[must_use]
    pub fn domain(&self) -> Domain {
        let name = self.0.split('.').next().unwrap_or_default();
        Domain::new(name.to_string())
    }

    /// Returns the event name without its domain.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.0.split_once('.').map(|(_, name)| name).unwrap_or_default()
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EventCategory {
    fn from(method: &'static str) -> Self {
        Self(Cow::Borrowed(method))
    }
}

impl From<String> for EventCategory {
    fn from(method: String) -> Self {
        Self(Cow::Owned(method))
    }
}

// ============================================================================
// EventSchema
// ============================================================================

/// A typed event payload.
///
/// Implemented by callers for the events they care about.
///
/// ```ignore
/// #[derive(Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct LoadEventFired {
///     timestamp: f64,
/// }
///
/// impl EventSchema for LoadEventFired {
///     const METHOD: &'static str = "Page.loadEventFired";
/// }
/// ```
pub trait EventSchema: DeserializeOwned + Send + Sync + 'static {
    /// Method name in `Domain.eventName` format.
    const METHOD: &'static str;

    /// Returns the category this schema decodes.
    #[inline]
    #[must_use]
    fn category() -> EventCategory {
        EventCategory::from(Self::METHOD)
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event notification from the remote end.
///
/// # Format
///
/// ```json
/// {
///   "method": "Network.requestWillBeSent",
///   "params": { ... },
///   "sessionId": "optional-flat-session"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Flat-mode session the event belongs to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

impl Event {
    /// Creates an event from its method and params.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }

    /// Returns the category used for handler lookup.
    #[inline]
    #[must_use]
    pub fn category(&self) -> EventCategory {
        EventCategory::new(self.method.clone())
    }

    /// Returns the domain name from the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method
            .split_once('.')
            .map(|(_, name)| name)
            .unwrap_or_default()
    }

    /// Decodes the params into a typed payload.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the event is not of type `E`
    /// - [`Error::Decode`] if the params do not match `E`
    pub fn decode<E: EventSchema>(&self) -> Result<E> {
        if self.method != E::METHOD {
            return Err(Error::invalid_argument(format!(
                "event {} is not {}",
                self.method,
                E::METHOD
            )));
        }

        E::deserialize(&self.params).map_err(|e| Error::decode(&self.method, e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
