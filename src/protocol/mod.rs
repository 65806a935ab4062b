//! WebSocket protocol message types.
//!
//! This module defines the JSON frames exchanged with the remote end and the
//! command descriptors that produce them.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Command request with integer `id` |
//! | `Response` | Remote → Local | `result` or `error` for that `id` |
//! | `Event` | Remote → Local | Unsolicited notification, no `id` |
//!
//! # Method Naming
//!
//! Commands and events follow `Domain.name` format:
//!
//! - `Page.navigate`
//! - `Network.enable`
//! - `Network.requestWillBeSent`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command descriptors |
//! | `domain` | Domains and their event categories |
//! | `event` | Event envelope and typed schemas |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Command descriptors.
pub mod command;

/// Domains and the static domain → event table.
pub mod domain;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, EnableDomain, Encoded, GetTargetInfo, RawCommand, Returning, TargetInfo};
pub use domain::{DEFAULT_ALWAYS_ON, DOMAIN_EVENTS, Domain, domain_events};
pub use event::{Event, EventCategory, EventSchema};
pub use request::{ErrorPayload, Incoming, Request, Response};
