//! CDP Wire - Multiplexed DevTools protocol connection.
//!
//! This library drives one WebSocket to a Chrome DevTools Protocol endpoint,
//! correlating every command with its response and fanning unsolicited
//! events out to registered handlers.
//!
//! # Architecture
//!
//! The connection follows a single-reader, many-writer model:
//!
//! - **Senders**: any number of tasks call [`Connection::send`]; each gets a
//!   fresh correlation id and waits on its own completion channel
//! - **Reader loop**: one task per socket reads frames in order, resolves
//!   transactions and records events
//! - **Handlers**: run on their own tasks, never on the reader loop
//!
//! Key design principles:
//!
//! - Ids are assigned under one lock and restart at zero when nothing is in flight
//! - Events are bookkept like transactions and evicted in bulk, so memory stays bounded
//! - Domains are enabled lazily from the registered handlers
//! - Pending commands are not failed when the socket drops; callers bound their waits
//!
//! # Quick Start
//!
//! ```no_run
//! use cdp_wire::{Connection, Handler, RawCommand, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::connect("ws://127.0.0.1:9222/devtools/page/ABC").await?;
//!
//!     connection.add_handler(
//!         "Page.loadEventFired",
//!         Handler::blocking(|event, _| {
//!             println!("loaded at {}", event.params["timestamp"]);
//!             Ok(())
//!         }),
//!     );
//!
//!     connection
//!         .send(RawCommand::new("Page.navigate").param("url", "https://example.com"))
//!         .await?;
//!
//!     // Returns once the page stops talking.
//!     connection.wait(None).await?;
//!     connection.close().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Transaction and handler ids |
//! | [`protocol`] | Commands, events, domains and wire frames |
//! | [`transport`] | Connection, reader loop and pending table |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Protocol message types.
///
/// Command descriptors, event envelopes, domains and the JSON frames.
pub mod protocol;

/// WebSocket transport layer.
///
/// The connection façade and the machinery behind it.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, ProtocolError, Result};

// Identifier types
pub use identifiers::{HandlerId, TransactionId};

// Protocol types
pub use protocol::{
    Command, Domain, EnableDomain, Encoded, Event, EventCategory, EventSchema, GetTargetInfo,
    RawCommand, Returning, TargetInfo,
};

// Transport types
pub use transport::{Connection, ConnectionOptions, Handler, PendingReply};
