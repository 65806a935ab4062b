//! WebSocket transport layer.
//!
//! This module owns the socket to the DevTools endpoint and everything that
//! correlates traffic on it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌─────────────────┐
//! │  Connection          │  {"id","method",..}    │  DevTools       │
//! │   send() ───────────►├───────────────────────►│  endpoint       │
//! │   PendingTable       │                        │                 │
//! │   HandlerRegistry    │  {"id","result"} /     │                 │
//! │   Listener ◄─────────┤◄───────────────────────┤                 │
//! │    (reader loop)     │  {"method","params"}   │                 │
//! └──────────────────────┘                        └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::new` - Validate URL and options
//! 2. `Connection::open` - Handshake, spawn reader loop, enable domains
//! 3. `Connection::send` - Correlate commands with responses
//! 4. `Connection::close` - Cancel reader loop and close the socket
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection façade |
//! | `handlers` | Event handler registry |
//! | `listener` | Reader loop and idle signal |
//! | `options` | Connection options |
//! | `transaction` | Transactions, event records and the pending table |

// ============================================================================
// Submodules
// ============================================================================

/// Connection façade.
pub mod connection;

/// Event handlers and their registry.
pub mod handlers;

/// Reader loop.
pub mod listener;

/// Connection options.
pub mod options;

/// Pending operations and their table.
pub mod transaction;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use handlers::{AsyncCallback, BlockingCallback, Handler, HandlerRegistry};
pub use listener::IdleSignal;
pub use options::ConnectionOptions;
pub use transaction::{
    EventRecord, Pending, PendingReply, PendingTable, Transaction, TransactionState,
};
