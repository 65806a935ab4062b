//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing correlation ids with handler ids.
//!
//! | Type | Wraps | Source |
//! |------|-------|--------|
//! | [`TransactionId`] | `i64` | Connection counter, or the [`TransactionId::SETUP`] sentinel |
//! | [`HandlerId`] | `u64` | Process-wide counter |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// TransactionId
// ============================================================================

/// Correlation id of a command or event record.
///
/// Assigned by the connection's counter in increasing order. Serialized as a
/// bare integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Reserved id for bootstrap commands sent outside the counter.
    ///
    /// Responses to it are not guaranteed to be correlatable.
    pub const SETUP: Self = Self(-2);

    /// Creates an id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns `true` for the setup sentinel.
    #[inline]
    #[must_use]
    pub const fn is_setup(self) -> bool {
        self.0 == Self::SETUP.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// HandlerId
// ============================================================================

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered event handler.
///
/// Returned by `add_handler` and accepted by `remove_handlers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Generates a new unique handler id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_serializes_as_integer() {
        let json = serde_json::to_string(&TransactionId::new(42)).expect("serialize");
        assert_eq!(json, "42");

        let id: TransactionId = serde_json::from_str("-2").expect("parse");
        assert!(id.is_setup());
    }

    #[test]
    fn test_transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert_eq!(TransactionId::new(7).to_string(), "7");
    }

    #[test]
    fn test_handler_ids_are_unique() {
        let a = HandlerId::generate();
        let b = HandlerId::generate();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }
}
