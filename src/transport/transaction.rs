//! Pending operations and the table that correlates them.
//!
//! Every command in flight is a [`Transaction`] stored in the connection's
//! [`PendingTable`] under its [`TransactionId`]. Unsolicited events are
//! stored too, as pre-resolved [`EventRecord`]s, so both share one id
//! counter and one cleanup path.
//!
//! # Lifecycle
//!
//! ```text
//! Transaction::new ─► PendingTable::register (id assigned)
//!                          │
//!        Reader Loop: PendingTable::take(id) ─► Pending::resolve ─► PendingReply
//! ```
//!
//! Event records never have a waiter. They leave the table when the eviction
//! policy drops the oldest half of them.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::TransactionId;
use crate::protocol::{Command, Encoded, Event, Response};

// ============================================================================
// TransactionState
// ============================================================================

/// Resolution state of a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Waiting for its response frame.
    Pending,
    /// Resolved with a value.
    Resolved,
    /// Resolved with an error.
    Failed,
}

// ============================================================================
// Pending Trait
// ============================================================================

/// Type-erased entry of the pending table.
pub trait Pending: Send {
    /// Returns the assigned id, if any.
    fn id(&self) -> Option<TransactionId>;

    /// Assigns the correlation id. Called once by the owning table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdAlreadyAssigned`] on a second call.
    fn assign_id(&mut self, id: TransactionId) -> Result<()>;

    /// Returns the command method, `None` for event records.
    fn method(&self) -> Option<&str>;

    /// Returns the resolution state.
    fn state(&self) -> TransactionState;

    /// Completes the operation with its response frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyResolved`] if called more than once.
    fn resolve(&mut self, response: Response) -> Result<()>;

    /// Returns the wrapped event for event records.
    fn event(&self) -> Option<&Arc<Event>> {
        None
    }
}

impl fmt::Debug for dyn Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("id", &self.id())
            .field("method", &self.method())
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// A command bound to a correlation id and a completion channel.
pub struct Transaction<C: Command> {
    /// Assigned by the pending table.
    id: Option<TransactionId>,
    /// Encoded method.
    method: Cow<'static, str>,
    /// Encoded params.
    params: Value,
    /// Descriptor used to decode the result.
    command: C,
    /// Resolution state.
    state: TransactionState,
    /// Completion channel to the waiter.
    reply_tx: Option<oneshot::Sender<Result<C::Output>>>,
}

impl<C: Command> Transaction<C> {
    /// Encodes the command and creates a pending transaction without id.
    ///
    /// # Errors
    ///
    /// Propagates the command's encode error.
    pub fn new(command: C) -> Result<(Self, PendingReply<C::Output>)> {
        let Encoded { method, params } = command.encode()?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let transaction = Self {
            id: None,
            method,
            params,
            command,
            state: TransactionState::Pending,
            reply_tx: Some(reply_tx),
        };

        Ok((transaction, PendingReply { rx: reply_rx }))
    }

    /// Returns the encoded params.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.params
    }
}

impl<C: Command> Pending for Transaction<C> {
    fn id(&self) -> Option<TransactionId> {
        self.id
    }

    fn assign_id(&mut self, id: TransactionId) -> Result<()> {
        if let Some(existing) = self.id {
            return Err(Error::IdAlreadyAssigned { id: existing });
        }
        self.id = Some(id);
        Ok(())
    }

    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    fn resolve(&mut self, response: Response) -> Result<()> {
        if self.state != TransactionState::Pending {
            return Err(Error::already_resolved(self.id.unwrap_or(response.id)));
        }

        let outcome = match response.error {
            Some(error) => Err(Error::Protocol(error.into())),
            None => self.command.decode(response.result.unwrap_or(Value::Null)),
        };

        self.state = if outcome.is_ok() {
            TransactionState::Resolved
        } else {
            TransactionState::Failed
        };

        if let Some(tx) = self.reply_tx.take()
            && tx.send(outcome).is_err()
        {
            trace!(id = ?self.id, method = %self.method, "Waiter gone before resolution");
        }

        Ok(())
    }
}

impl<C: Command> fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("state", &self.state)
            .finish()
    }
}

// ============================================================================
// EventRecord
// ============================================================================

/// A received event, stored as an already-resolved transaction.
#[derive(Debug)]
pub struct EventRecord {
    id: Option<TransactionId>,
    event: Arc<Event>,
}

impl EventRecord {
    /// Wraps a received event.
    #[inline]
    #[must_use]
    pub fn new(event: Arc<Event>) -> Self {
        Self { id: None, event }
    }
}

impl Pending for EventRecord {
    fn id(&self) -> Option<TransactionId> {
        self.id
    }

    fn assign_id(&mut self, id: TransactionId) -> Result<()> {
        if let Some(existing) = self.id {
            return Err(Error::IdAlreadyAssigned { id: existing });
        }
        self.id = Some(id);
        Ok(())
    }

    fn method(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> TransactionState {
        TransactionState::Resolved
    }

    fn resolve(&mut self, response: Response) -> Result<()> {
        Err(Error::already_resolved(self.id.unwrap_or(response.id)))
    }

    fn event(&self) -> Option<&Arc<Event>> {
        Some(&self.event)
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// Future resolving to a transaction's outcome.
///
/// Dropping it only releases the waiter; the transaction stays registered
/// until its response frame arrives.
#[derive(Debug)]
#[must_use = "a reply does nothing unless awaited"]
pub struct PendingReply<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for PendingReply<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|e| Err(Error::from(e))))
    }
}

// ============================================================================
// PendingTable
// ============================================================================

/// Id counter, in-flight transactions and event records of one connection.
///
/// Guarded by the connection's id lock; every id is assigned under it.
pub struct PendingTable {
    /// Next id to hand out.
    next_id: i64,
    /// Live entries by id.
    entries: FxHashMap<TransactionId, Box<dyn Pending>>,
    /// Event record ids, oldest first.
    event_ids: VecDeque<TransactionId>,
    /// Hard bound of `event_ids`.
    event_capacity: usize,
    /// Size of `event_ids` that triggers eviction.
    cleanup_threshold: usize,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(event_capacity: usize, cleanup_threshold: usize) -> Self {
        Self {
            next_id: 0,
            entries: FxHashMap::default(),
            event_ids: VecDeque::with_capacity(cleanup_threshold.min(event_capacity)),
            event_capacity,
            cleanup_threshold,
        }
    }

    /// Returns the next id.
    ///
    /// The counter restarts at zero whenever the table is empty; no live
    /// entry can then collide with a reused id.
    fn next_id(&mut self) -> TransactionId {
        if self.entries.is_empty() {
            self.next_id = 0;
            self.event_ids.clear();
        }

        let id = TransactionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Assigns the next id to an entry and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdAlreadyAssigned`] if the entry already has an id.
    pub fn register(&mut self, mut entry: Box<dyn Pending>) -> Result<TransactionId> {
        let id = self.next_id();
        entry.assign_id(id)?;
        self.entries.insert(id, entry);
        Ok(id)
    }

    /// Stores a bootstrap entry under [`TransactionId::SETUP`].
    ///
    /// Returns `true` if an earlier bootstrap entry was displaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdAlreadyAssigned`] if the entry already has an id.
    pub fn register_setup(&mut self, mut entry: Box<dyn Pending>) -> Result<bool> {
        entry.assign_id(TransactionId::SETUP)?;
        Ok(self.entries.insert(TransactionId::SETUP, entry).is_some())
    }

    /// Records a received event and applies the eviction policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdAlreadyAssigned`] only on internal misuse.
    pub fn record_event(&mut self, event: Arc<Event>) -> Result<TransactionId> {
        let id = self.register(Box::new(EventRecord::new(event)))?;

        if self.event_ids.len() >= self.event_capacity
            && let Some(oldest) = self.event_ids.pop_front()
        {
            self.remove_event_record(oldest);
        }
        self.event_ids.push_back(id);

        self.evict_events();
        Ok(id)
    }

    /// Drops the oldest event records once the cleanup threshold is reached,
    /// keeping the newest half of the threshold.
    fn evict_events(&mut self) -> usize {
        if self.event_ids.len() < self.cleanup_threshold {
            return 0;
        }

        let to_remove = self.event_ids.len() - self.cleanup_threshold / 2;
        let mut removed = 0;

        for _ in 0..to_remove {
            let Some(oldest) = self.event_ids.pop_front() else {
                break;
            };
            if self.remove_event_record(oldest) {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(
                removed,
                size = self.entries.len(),
                "Evicted old event records"
            );
        }

        removed
    }

    /// Removes an id only if it still holds an event record.
    fn remove_event_record(&mut self, id: TransactionId) -> bool {
        let is_event = self
            .entries
            .get(&id)
            .is_some_and(|entry| entry.event().is_some());

        if is_event {
            self.entries.remove(&id);
        }
        is_event
    }

    /// Removes and returns an entry.
    #[inline]
    pub fn take(&mut self, id: TransactionId) -> Option<Box<dyn Pending>> {
        self.entries.remove(&id)
    }

    /// Returns `true` if an entry with this id is stored.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: TransactionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the number of stored entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of tracked event record ids.
    #[inline]
    #[must_use]
    pub fn tracked_events(&self) -> usize {
        self.event_ids.len()
    }
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("next_id", &self.next_id)
            .field("entries", &self.entries.len())
            .field("tracked_events", &self.event_ids.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
