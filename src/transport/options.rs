//! Connection tuning options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cdp_wire::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_idle_threshold(Duration::from_millis(750))
//!     .with_event_retention(20_000, 16_000);
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_ALWAYS_ON, Domain};

// ============================================================================
// Defaults
// ============================================================================

/// No frames for this long means the connection is idle.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_millis(100);

/// Largest accepted WebSocket message (256 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 28;

/// Capacity of the event record id queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Tracked event records that trigger eviction.
pub const DEFAULT_EVENT_CLEANUP_THRESHOLD: usize = 8_000;

/// Bound on each `<Domain>.enable` round trip.
pub const DEFAULT_ENABLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on bootstrap commands sent with the setup sentinel id.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Tuning knobs of a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Read timeout after which the idle signal is raised.
    pub idle_threshold: Duration,

    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,

    /// Capacity of the event record id queue.
    pub event_capacity: usize,

    /// Number of tracked event records that triggers eviction of the
    /// oldest half.
    pub event_cleanup_threshold: usize,

    /// Bound on each domain enable during reconciliation.
    pub enable_timeout: Duration,

    /// Bound on bootstrap commands.
    pub setup_timeout: Duration,

    /// Bound on establishing the socket.
    pub connect_timeout: Duration,

    /// Domains that never receive an `enable` command.
    pub always_on: Vec<Domain>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            event_cleanup_threshold: DEFAULT_EVENT_CLEANUP_THRESHOLD,
            enable_timeout: DEFAULT_ENABLE_TIMEOUT,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            always_on: DEFAULT_ALWAYS_ON.to_vec(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the idle threshold.
    #[inline]
    #[must_use]
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Sets the maximum WebSocket message size.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets event record retention: queue capacity and cleanup threshold.
    #[inline]
    #[must_use]
    pub fn with_event_retention(mut self, capacity: usize, cleanup_threshold: usize) -> Self {
        self.event_capacity = capacity;
        self.event_cleanup_threshold = cleanup_threshold;
        self
    }

    /// Sets the domain enable timeout.
    #[inline]
    #[must_use]
    pub fn with_enable_timeout(mut self, timeout: Duration) -> Self {
        self.enable_timeout = timeout;
        self
    }

    /// Sets the bootstrap command timeout.
    #[inline]
    #[must_use]
    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replaces the always-on domain list.
    #[inline]
    #[must_use]
    pub fn with_always_on(mut self, domains: impl IntoIterator<Item = Domain>) -> Self {
        self.always_on = domains.into_iter().collect();
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Checks that the options are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a duration or size is zero, or if the
    /// cleanup threshold is not below the event capacity.
    pub fn validate(&self) -> Result<()> {
        if self.idle_threshold.is_zero() {
            return Err(Error::config("idle threshold must be non-zero"));
        }

        if self.max_message_size == 0 {
            return Err(Error::config("max message size must be non-zero"));
        }

        if self.event_cleanup_threshold == 0 {
            return Err(Error::config("event cleanup threshold must be non-zero"));
        }

        if self.event_cleanup_threshold >= self.event_capacity {
            return Err(Error::config(format!(
                "event cleanup threshold ({}) must be below event capacity ({})",
                self.event_cleanup_threshold, self.event_capacity
            )));
        }

        Ok(())
    }

    /// Returns `true` if the domain never needs an `enable` command.
    #[inline]
    #[must_use]
    pub fn is_always_on(&self, domain: &Domain) -> bool {
        self.always_on.contains(domain)
    }
}

// ============================================================================
// Tests
// ============================================================================
