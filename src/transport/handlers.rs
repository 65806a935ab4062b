//! Event handler registry.
//!
//! Maps each [`EventCategory`] to an ordered list of handlers. Handlers run
//! off the reader loop: async handlers on their own task, blocking handlers
//! on tokio's blocking pool. A failing handler is logged and affects nothing
//! else.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::HandlerId;
use crate::protocol::{Domain, Event, EventCategory};

use super::Connection;

// ============================================================================
// Types
// ============================================================================

/// Callback returning a future, run with `tokio::spawn`.
pub type AsyncCallback =
    Arc<dyn Fn(Arc<Event>, Connection) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Callback run on the blocking pool.
pub type BlockingCallback = Arc<dyn Fn(Arc<Event>, Connection) -> Result<()> + Send + Sync>;

// ============================================================================
// Handler
// ============================================================================

/// An event observer.
///
/// Both kinds receive the event and a handle to the connection it arrived
/// on, so they can issue follow-up commands.
///
/// # Example
///
/// ```ignore
/// let handler = Handler::from_async(|event, connection| async move {
///     let request_id = event.params["requestId"].clone();
///     connection.feed(RawCommand::new("Fetch.continueRequest").param("requestId", request_id));
///     Ok(())
/// });
/// connection.add_handler("Fetch.requestPaused", handler);
/// ```
#[derive(Clone)]
pub enum Handler {
    /// Long-running handler, spawned as an independent task.
    Async(AsyncCallback),
    /// Synchronous handler, moved to the blocking pool.
    Blocking(BlockingCallback),
}

impl Handler {
    /// Wraps an async closure.
    pub fn from_async<F, Fut>(callback: F) -> Self
    where
        F: Fn(Arc<Event>, Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Async(Arc::new(
            move |event: Arc<Event>, connection: Connection| -> BoxFuture<'static, Result<()>> {
                Box::pin(callback(event, connection))
            },
        ))
    }

    /// Wraps a synchronous closure.
    pub fn blocking<F>(callback: F) -> Self
    where
        F: Fn(Arc<Event>, Connection) -> Result<()> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(callback))
    }

    /// Returns `true` for handlers run on the blocking pool.
    #[inline]
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }

    /// Starts the handler for one event without waiting for it.
    pub(crate) fn dispatch(&self, event: Arc<Event>, connection: Connection) {
        match self {
            Self::Async(callback) => {
                let callback = Arc::clone(callback);
                tokio::spawn(async move {
                    let method = event.method.clone();
                    if let Err(e) = callback(event, connection).await {
                        warn!(%method, error = %e, "Event handler failed");
                    }
                });
            }

            Self::Blocking(callback) => {
                let callback = Arc::clone(callback);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = callback(Arc::clone(&event), connection) {
                        warn!(method = %event.method, error = %e, "Blocking event handler failed");
                    }
                });
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async(_) => f.write_str("Handler::Async"),
            Self::Blocking(_) => f.write_str("Handler::Blocking"),
        }
    }
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Category → handlers map, shared by the connection and its reader loop.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<FxHashMap<EventCategory, Vec<(HandlerId, Handler)>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for a category.
    pub fn add(&self, category: EventCategory, handler: Handler) -> HandlerId {
        let id = HandlerId::generate();
        trace!(%category, %id, "Handler added");
        self.handlers
            .write()
            .entry(category)
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes handlers.
    ///
    /// | `category` | `handler` | Effect |
    /// |------------|-----------|--------|
    /// | `None` | `None` | all handlers removed |
    /// | `Some` | `None` | all handlers of the category removed |
    /// | `Some` | `Some` | that handler removed from the category |
    ///
    /// Returns the number of handlers removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a handler is given without its
    /// category.
    pub fn remove(
        &self,
        category: Option<&EventCategory>,
        handler: Option<HandlerId>,
    ) -> Result<usize> {
        let mut handlers = self.handlers.write();

        let removed = match (category, handler) {
            (None, Some(_)) => {
                return Err(Error::invalid_argument(
                    "a handler can only be removed together with its event category",
                ));
            }

            (None, None) => {
                let count = handlers.values().map(Vec::len).sum();
                handlers.clear();
                count
            }

            (Some(category), None) => handlers.remove(category).map_or(0, |list| list.len()),

            (Some(category), Some(id)) => {
                let Some(list) = handlers.get_mut(category) else {
                    return Ok(0);
                };
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                let count = before - list.len();
                if list.is_empty() {
                    handlers.remove(category);
                }
                count
            }
        };

        Ok(removed)
    }

    /// Copies the handlers of a category.
    ///
    /// Dispatch iterates the copy, so registration can change concurrently.
    #[must_use]
    pub fn snapshot(&self, category: &EventCategory) -> Vec<Handler> {
        self.handlers
            .read()
            .get(category)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Starts every handler of the event's category.
    ///
    /// Returns the number of handlers started.
    pub(crate) fn dispatch(&self, event: &Arc<Event>, connection: &Connection) -> usize {
        let handlers = self.snapshot(&event.category());

        for handler in &handlers {
            handler.dispatch(Arc::clone(event), connection.clone());
        }

        handlers.len()
    }

    /// Returns the domains that have at least one handler.
    #[must_use]
    pub fn active_domains(&self) -> FxHashSet<Domain> {
        self.handlers
            .read()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(category, _)| category.domain())
            .collect()
    }

    /// Returns the total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("categories", &self.handlers.read().len())
            .field("handlers", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
