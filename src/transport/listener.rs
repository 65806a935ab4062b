//! Reader loop.
//!
//! One task per open socket owns the read half. It reads frames in arrival
//! order and for each one either resolves the matching transaction or
//! records the event and starts its handlers.
//!
//! # States
//!
//! ```text
//!             ┌──── read timed out: raise idle ────┐
//!             ▼                                    │
//!   ──► Reading ── frame ──► clear idle, dispatch ─┘
//!          │
//!          ├── socket closed / read error ──► invalidate socket, stop
//!          └── cancelled ──► hand read half back, stop
//! ```
//!
//! Pending transactions are not touched when the loop stops; callers bound
//! their own waits.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::protocol::{Event, Incoming, Response};

use super::connection::{WeakConnection, WsSource};
use super::handlers::HandlerRegistry;
use super::transaction::PendingTable;

// ============================================================================
// Constants
// ============================================================================

/// Longest frame excerpt included in parse failure logs.
const LOGGED_FRAME_LIMIT: usize = 256;

// ============================================================================
// IdleSignal
// ============================================================================

/// Raised when no frame arrived for the idle threshold.
#[derive(Debug)]
pub struct IdleSignal {
    state: watch::Sender<bool>,
    threshold_us: AtomicU64,
}

impl IdleSignal {
    /// Creates a lowered signal.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            threshold_us: AtomicU64::new(duration_to_micros(threshold)),
        }
    }

    /// Raises the signal.
    pub fn set_idle(&self) {
        self.set(true);
    }

    /// Lowers the signal.
    pub fn set_busy(&self) {
        self.set(false);
    }

    fn set(&self, idle: bool) {
        self.state.send_if_modified(|current| {
            let changed = *current != idle;
            *current = idle;
            changed
        });
    }

    /// Returns `true` while raised.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self.state.borrow()
    }

    /// Waits until the signal is raised.
    pub async fn wait_idle(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|idle| *idle).await;
    }

    /// Returns the idle threshold.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        Duration::from_micros(self.threshold_us.load(Ordering::Relaxed))
    }

    /// Changes the idle threshold; takes effect on the next read.
    pub fn set_threshold(&self, threshold: Duration) {
        self.threshold_us
            .store(duration_to_micros(threshold), Ordering::Relaxed);
    }
}

fn duration_to_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX).max(1)
}

// ============================================================================
// ListenerContext
// ============================================================================

/// State the reader loop shares with its connection.
pub(crate) struct ListenerContext {
    /// Pending transactions and event records.
    pub table: Arc<Mutex<PendingTable>>,
    /// Event handlers.
    pub handlers: Arc<HandlerRegistry>,
    /// Idle signal.
    pub idle: Arc<IdleSignal>,
    /// Owning connection, handed to handlers.
    pub connection: WeakConnection,
    /// Socket generation this loop reads from.
    pub generation: u64,
}

impl ListenerContext {
    /// Demultiplexes one text frame.
    fn handle_frame(&self, text: &str) {
        match Incoming::parse(text) {
            Ok(Incoming::Response(response)) => self.handle_response(response),
            Ok(Incoming::Event(event)) => self.handle_event(event),
            Err(e) => {
                let excerpt: String = text.chars().take(LOGGED_FRAME_LIMIT).collect();
                warn!(error = %e, frame = %excerpt, "Failed to parse incoming frame");
            }
        }
    }

    /// Resolves the transaction a response belongs to.
    ///
    /// The entry leaves the table before it is resolved, so a duplicate
    /// frame for the same id finds nothing.
    fn handle_response(&self, response: Response) {
        let id = response.id;
        let entry = self.table.lock().take(id);

        let Some(mut entry) = entry else {
            debug!(%id, "Response for unknown transaction dropped");
            return;
        };

        trace!(%id, method = ?entry.method(), "Response received");

        if let Err(e) = entry.resolve(response) {
            warn!(%id, error = %e, "Response dropped");
        }
    }

    /// Records an event, then starts its handlers.
    fn handle_event(&self, event: Event) {
        let event = Arc::new(event);

        match self.table.lock().record_event(Arc::clone(&event)) {
            Ok(id) => trace!(%id, method = %event.method, "Event recorded"),
            Err(e) => warn!(method = %event.method, error = %e, "Failed to record event"),
        }

        let Some(connection) = self.connection.upgrade() else {
            return;
        };

        let started = self.handlers.dispatch(&event, &connection);
        if started > 0 {
            trace!(method = %event.method, handlers = started, "Event dispatched");
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Handle to a running reader loop.
pub(crate) struct Listener {
    task: JoinHandle<Option<WsSource>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Listener {
    /// Spawns the reader loop over a socket's read half.
    pub fn spawn(source: WsSource, context: ListenerContext) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        context.idle.set_busy();

        let task = tokio::spawn(run(source, context, shutdown_rx));

        Self {
            task,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Returns `true` while the loop is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Asks the loop to stop before its next read.
    pub fn cancel(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Stops the loop and returns the read half, if the socket is still
    /// readable.
    pub async fn into_source(mut self) -> Option<WsSource> {
        self.cancel();
        self.task.await.ok().flatten()
    }
}

/// The reader loop.
async fn run(
    mut source: WsSource,
    context: ListenerContext,
    mut shutdown: oneshot::Receiver<()>,
) -> Option<WsSource> {
    debug!(generation = context.generation, "Listener started");

    loop {
        let threshold = context.idle.threshold();

        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!(generation = context.generation, "Listener cancelled");
                return Some(source);
            }

            read = timeout(threshold, source.next()) => match read {
                Err(_) => context.idle.set_idle(),

                Ok(Some(Ok(Message::Text(text)))) => {
                    context.idle.set_busy();
                    context.handle_frame(&text);
                }

                Ok(Some(Ok(Message::Binary(bytes)))) => {
                    context.idle.set_busy();
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => context.handle_frame(text),
                        Err(e) => warn!(error = %e, "Binary frame is not UTF-8"),
                    }
                }

                Ok(Some(Ok(Message::Close(frame)))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    break;
                }

                // Ping, Pong and raw frames carry no protocol data.
                Ok(Some(Ok(_))) => {}

                Ok(Some(Err(e))) => {
                    warn!(error = %e, "WebSocket read failed");
                    break;
                }

                Ok(None) => {
                    debug!("WebSocket stream ended");
                    break;
                }
            }
        }
    }

    // Nothing more will arrive on this socket.
    context.idle.set_idle();

    if let Some(connection) = context.connection.upgrade() {
        connection.invalidate(context.generation);
    }

    debug!(generation = context.generation, "Listener terminated");
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_signal_transitions() {
        let idle = IdleSignal::new(Duration::from_millis(100));
        assert!(!idle.is_idle());

        idle.set_idle();
        assert!(idle.is_idle());

        idle.set_busy();
        assert!(!idle.is_idle());
    }

    #[test]
    fn test_threshold_update() {
        let idle = IdleSignal::new(Duration::from_millis(100));
        assert_eq!(idle.threshold(), Duration::from_millis(100));

        idle.set_threshold(Duration::from_millis(750));
        assert_eq!(idle.threshold(), Duration::from_millis(750));

        idle.set_threshold(Duration::ZERO);
        assert_eq!(idle.threshold(), Duration::from_micros(1));
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_raised() {
        let idle = Arc::new(IdleSignal::new(Duration::from_millis(100)));

        let waiter = {
            let idle = Arc::clone(&idle);
            tokio::spawn(async move { idle.wait_idle().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        idle.set_idle();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke up")
            .expect("waiter did not panic");
    }

    #[tokio::test]
    async fn test_wait_idle_when_already_idle() {
        let idle = IdleSignal::new(Duration::from_millis(100));
        idle.set_idle();
        timeout(Duration::from_millis(100), idle.wait_idle())
            .await
            .expect("returns immediately");
    }
}
