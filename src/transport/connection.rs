//! Connection façade.
//!
//! A [`Connection`] owns one WebSocket to a DevTools endpoint, the id
//! counter and pending table, the handler registry and the reader loop.
//!
//! # Lifecycle
//!
//! ```text
//!   Closed ── open() / send() ──► Open (socket + reader loop)
//!     ▲                              │
//!     └──── close() / remote close ──┘
//! ```
//!
//! Opening re-runs domain reconciliation, so handlers registered before a
//! reconnect keep receiving events.
//!
//! # Send Path
//!
//! 1. Open the socket if needed
//! 2. Assign the next id and register the transaction under the id lock
//! 3. Reconcile domains with the handler set
//! 4. Write the request frame
//! 5. Await resolution by the reader loop
//!
//! Transactions still pending when the socket closes are left in the table.
//! Wrap `send` in a timeout, or use [`Connection::send_with_timeout`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, TransactionId};
use crate::protocol::{
    Command, Domain, EnableDomain, Event, EventCategory, EventSchema, GetTargetInfo, Request,
    TargetInfo,
};

use super::handlers::{Handler, HandlerRegistry};
use super::listener::{IdleSignal, Listener, ListenerContext};
use super::options::ConnectionOptions;
use super::transaction::{Pending, PendingReply, PendingTable, Transaction};

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
pub(crate) type WsSink = SplitSink<WsStream, Message>;

/// Read half of the socket, owned by the reader loop.
pub(crate) type WsSource = SplitStream<WsStream>;

/// Socket state. Writer and listener are set and cleared together.
struct Link {
    /// Incremented for every new socket.
    generation: u64,
    /// Write half, shared by concurrent senders.
    writer: Option<Arc<AsyncMutex<WsSink>>>,
    /// Reader loop over the read half.
    listener: Option<Listener>,
}

/// Domains sent an `enable`, each tagged with the claim that sent it.
///
/// Claims are unique for the life of the connection, so a failed enable
/// only forgets the entry it created, never one re-created after a reopen.
#[derive(Debug, Default)]
struct EnabledDomains {
    entries: FxHashMap<Domain, u64>,
    next_claim: u64,
}

impl EnabledDomains {
    /// Marks `domain` enabled. Returns `None` if it already is.
    fn claim(&mut self, domain: &Domain) -> Option<u64> {
        if self.entries.contains_key(domain) {
            return None;
        }
        let claim = self.next_claim;
        self.next_claim += 1;
        self.entries.insert(domain.clone(), claim);
        Some(claim)
    }

    /// Forgets `domain` if it is still held by `claim`.
    fn release(&mut self, domain: &Domain, claim: u64) -> bool {
        if self.entries.get(domain) != Some(&claim) {
            return false;
        }
        self.entries.remove(domain);
        true
    }

    fn retain(&mut self, wanted: &FxHashSet<Domain>) {
        self.entries.retain(|domain, _| {
            let keep = wanted.contains(domain);
            if !keep {
                debug!(%domain, "Domain no longer needed");
            }
            keep
        });
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn sorted(&self) -> Vec<Domain> {
        let mut domains: Vec<_> = self.entries.keys().cloned().collect();
        domains.sort();
        domains
    }
}

/// A command registered in the table, ready to be written.
struct Staged<T> {
    id: TransactionId,
    frame: String,
    method: String,
    params: Value,
    reply: PendingReply<T>,
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    /// DevTools WebSocket endpoint.
    url: Url,
    /// Tuning options.
    options: ConnectionOptions,
    /// Socket state.
    link: Mutex<Link>,
    /// Serializes open and close.
    open_lock: AsyncMutex<()>,
    /// Id lock: id counter, transactions and event records.
    table: Arc<Mutex<PendingTable>>,
    /// Event handlers.
    handlers: Arc<HandlerRegistry>,
    /// Domains sent an `enable` on the current socket.
    domains: Mutex<EnabledDomains>,
    /// Raised by the reader loop when traffic stops.
    idle: Arc<IdleSignal>,
    /// Target this connection is attached to.
    target: RwLock<Option<TargetInfo>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(mut listener) = self.link.get_mut().listener.take() {
            listener.cancel();
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Multiplexed DevTools protocol connection.
///
/// Cheap to clone; all clones share one socket, one pending table and one
/// handler registry.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::connect("ws://127.0.0.1:9222/devtools/page/ABC").await?;
///
/// connection.add_handler(
///     "Network.requestWillBeSent",
///     Handler::blocking(|event, _| {
///         println!("{}", event.params["request"]["url"]);
///         Ok(())
///     }),
/// );
///
/// let result = connection
///     .send(RawCommand::new("Page.navigate").param("url", "https://example.com"))
///     .await?;
/// connection.wait(None).await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Non-owning handle held by the reader loop.
#[derive(Clone)]
pub(crate) struct WeakConnection(Weak<Inner>);

impl WeakConnection {
    /// Returns the connection if it is still alive.
    pub fn upgrade(&self) -> Option<Connection> {
        self.0.upgrade().map(|inner| Connection { inner })
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Connection {
    /// Creates a closed connection with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not a `ws` or `wss` URL.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_options(url, ConnectionOptions::default())
    }

    /// Creates a closed connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not a `ws` or `wss` URL or
    /// the options are inconsistent.
    pub fn with_options(url: &str, options: ConnectionOptions) -> Result<Self> {
        options.validate()?;

        let url = Url::parse(url).map_err(|e| Error::config(format!("invalid url {url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported scheme {}, expected ws or wss",
                url.scheme()
            )));
        }

        let table = PendingTable::new(options.event_capacity, options.event_cleanup_threshold);
        let idle = IdleSignal::new(options.idle_threshold);

        let inner = Inner {
            url,
            link: Mutex::new(Link {
                generation: 0,
                writer: None,
                listener: None,
            }),
            open_lock: AsyncMutex::new(()),
            table: Arc::new(Mutex::new(table)),
            handlers: Arc::new(HandlerRegistry::new()),
            domains: Mutex::new(EnabledDomains::default()),
            idle: Arc::new(idle),
            target: RwLock::new(None),
            options,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Creates a connection and opens it.
    ///
    /// # Errors
    ///
    /// See [`Connection::new`] and [`Connection::open`].
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Self::new(url)?;
        connection.open().await?;
        Ok(connection)
    }

    /// Creates a connection with options and opens it.
    ///
    /// # Errors
    ///
    /// See [`Connection::with_options`] and [`Connection::open`].
    pub async fn connect_with_options(url: &str, options: ConnectionOptions) -> Result<Self> {
        let connection = Self::with_options(url, options)?;
        connection.open().await?;
        Ok(connection)
    }

    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.inner))
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl Connection {
    /// Opens the socket and starts the reader loop, then reconciles domains.
    ///
    /// No-op on the socket if it is already open with a running loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the connect timeout
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn open(&self) -> Result<()> {
        self.ensure_listening().await?;
        self.reconcile_domains().await;
        Ok(())
    }

    /// Cancels the reader loop, forgets enabled domains and closes the
    /// socket. Closing a closed connection does nothing.
    ///
    /// Pending transactions stay in the table unresolved.
    pub async fn close(&self) {
        let _guard = self.inner.open_lock.lock().await;

        let (writer, listener) = {
            let mut link = self.inner.link.lock();
            (link.writer.take(), link.listener.take())
        };

        if let Some(mut listener) = listener {
            listener.cancel();
        }

        self.inner.domains.lock().clear();

        let Some(writer) = writer else {
            return;
        };

        if let Err(e) = writer.lock().await.close().await {
            debug!(error = %e, "WebSocket close failed");
        }

        info!(url = %self.inner.url, "Connection closed");
    }

    /// Returns `true` if no socket is open.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.link.lock().writer.is_none()
    }

    /// Returns `true` while the reader loop is running.
    #[inline]
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner
            .link
            .lock()
            .listener
            .as_ref()
            .is_some_and(Listener::is_running)
    }

    /// Makes sure a socket is open and read by a running loop.
    async fn ensure_listening(&self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        let _guard = self.inner.open_lock.lock().await;

        let stale = {
            let mut link = self.inner.link.lock();
            if link.writer.is_some() && link.listener.as_ref().is_some_and(Listener::is_running) {
                return Ok(());
            }
            link.listener.take()
        };

        // The socket may outlive its loop; restart the loop over it.
        if let Some(listener) = stale
            && let Some(source) = listener.into_source().await
        {
            let mut link = self.inner.link.lock();
            if link.writer.is_some() {
                let context = self.listener_context(link.generation);
                link.listener = Some(Listener::spawn(source, context));
                debug!(generation = link.generation, "Reader loop restarted");
                return Ok(());
            }
        }

        let stream = self.connect_socket().await?;
        let (sink, source) = stream.split();

        let mut link = self.inner.link.lock();
        link.generation += 1;
        let context = self.listener_context(link.generation);
        link.listener = Some(Listener::spawn(source, context));
        link.writer = Some(Arc::new(AsyncMutex::new(sink)));

        info!(url = %self.inner.url, generation = link.generation, "Connection opened");
        Ok(())
    }

    /// Performs the WebSocket handshake.
    async fn connect_socket(&self) -> Result<WsStream> {
        let options = &self.inner.options;
        let config = WebSocketConfig::default()
            .max_message_size(Some(options.max_message_size))
            .max_frame_size(Some(options.max_message_size));

        let handshake = connect_async_with_config(self.inner.url.as_str(), Some(config), false);

        let (stream, _response) = timeout(options.connect_timeout, handshake)
            .await
            .map_err(|_| Error::connection_timeout(millis(options.connect_timeout)))??;

        Ok(stream)
    }

    fn listener_context(&self, generation: u64) -> ListenerContext {
        ListenerContext {
            table: Arc::clone(&self.inner.table),
            handlers: Arc::clone(&self.inner.handlers),
            idle: Arc::clone(&self.inner.idle),
            connection: self.downgrade(),
            generation,
        }
    }

    /// Drops the socket after its reader loop ended.
    ///
    /// Ignored if a newer socket replaced it meanwhile.
    pub(crate) fn invalidate(&self, generation: u64) {
        {
            let mut link = self.inner.link.lock();
            if link.generation != generation || link.writer.is_none() {
                return;
            }
            link.writer = None;
            link.listener = None;
        }

        self.inner.domains.lock().clear();
        info!(url = %self.inner.url, generation, "Connection lost");
    }
}

// ============================================================================
// Sending
// ============================================================================

impl Connection {
    /// Sends a command and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the remote reported an error, with the
    ///   command's method and params attached
    /// - [`Error::Decode`] if the result has an unexpected shape
    /// - [`Error::ConnectionClosed`] if the socket is gone before writing,
    ///   or the connection is dropped while waiting
    /// - [`Error::Connection`] if the write fails
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Output> {
        self.ensure_listening().await?;
        let staged = self.stage(command)?;
        self.complete(staged).await
    }

    /// Sends a command, giving up waiting after `limit`.
    ///
    /// The transaction stays registered; a late response is dropped.
    ///
    /// # Errors
    ///
    /// [`Error::RequestTimeout`] on timeout, otherwise as [`Connection::send`].
    pub async fn send_with_timeout<C: Command>(
        &self,
        command: C,
        limit: Duration,
    ) -> Result<C::Output> {
        self.ensure_listening().await?;
        let staged = self.stage(command)?;
        let method = staged.method.clone();

        timeout(limit, self.complete(staged))
            .await
            .map_err(|_| Error::request_timeout(method, millis(limit)))?
    }

    /// Sends a command from a background task without waiting.
    ///
    /// Failures are logged.
    pub fn feed<C: Command>(&self, command: C) {
        let connection = self.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.send(command).await {
                warn!(error = %e, "Fed command failed");
            }
        });
    }

    /// Sends a bootstrap command under the reserved setup id.
    ///
    /// Skips the id counter and domain reconciliation. Returns `None` if the
    /// remote answered with an error, no correlatable answer arrived within
    /// the setup timeout, or a later bootstrap command displaced this one.
    ///
    /// # Errors
    ///
    /// Only fails if the socket cannot be opened or written.
    pub async fn send_oneshot<C: Command>(&self, command: C) -> Result<Option<C::Output>> {
        self.ensure_listening().await?;

        let (transaction, reply) = Transaction::new(command)?;
        let method = transaction.method().map(str::to_owned).unwrap_or_default();
        let frame = Request::new(TransactionId::SETUP, &method, transaction.params()).to_frame()?;

        let displaced = self.inner.table.lock().register_setup(Box::new(transaction))?;
        if displaced {
            debug!(%method, "Earlier bootstrap command displaced");
        }

        self.write_frame(TransactionId::SETUP, frame).await?;

        match timeout(self.inner.options.setup_timeout, reply).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(e)) => {
                debug!(%method, error = %e, "Bootstrap command answered without result");
                Ok(None)
            }
            Err(_) => {
                debug!(%method, "Bootstrap command timed out");
                Ok(None)
            }
        }
    }

    /// Assigns an id and registers the transaction.
    fn stage<C: Command>(&self, command: C) -> Result<Staged<C::Output>> {
        let (transaction, reply) = Transaction::new(command)?;
        let method = transaction.method().map(str::to_owned).unwrap_or_default();
        let params = transaction.params().clone();

        let id = self.inner.table.lock().register(Box::new(transaction))?;

        let frame = match Request::new(id, &method, &params).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.inner.table.lock().take(id);
                return Err(e);
            }
        };

        trace!(%id, %method, "Transaction registered");

        Ok(Staged {
            id,
            frame,
            method,
            params,
            reply,
        })
    }

    /// Reconciles domains, writes the frame and awaits the reply.
    async fn complete<T>(&self, staged: Staged<T>) -> Result<T> {
        let Staged {
            id,
            frame,
            method,
            params,
            reply,
        } = staged;

        self.reconcile_domains().await;

        self.write_frame(id, frame).await?;

        reply.await.map_err(|e| e.with_command(&method, &params))
    }

    /// Writes a request frame, unregistering it if the write fails.
    async fn write_frame(&self, id: TransactionId, frame: String) -> Result<()> {
        let writer = self.inner.link.lock().writer.clone();

        let Some(writer) = writer else {
            self.inner.table.lock().take(id);
            return Err(Error::ConnectionClosed);
        };

        let sent = writer.lock().await.send(Message::Text(frame.into())).await;

        if let Err(e) = sent {
            self.inner.table.lock().take(id);
            return Err(Error::connection(format!("failed to write frame {id}: {e}")));
        }

        trace!(%id, "Frame written");
        Ok(())
    }
}

// ============================================================================
// Domains
// ============================================================================

impl Connection {
    /// Enables every domain that has handlers and forgets domains that lost
    /// them.
    ///
    /// Always-on domains are never enabled. A failed enable is forgotten so
    /// a later reconciliation retries it.
    pub async fn reconcile_domains(&self) {
        let claimed: Vec<(Domain, u64)> = {
            let mut enabled = self.inner.domains.lock();
            let wanted = self.inner.handlers.active_domains();
            enabled.retain(&wanted);

            wanted
                .into_iter()
                .filter(|domain| !self.inner.options.is_always_on(domain))
                .filter_map(|domain| enabled.claim(&domain).map(|claim| (domain, claim)))
                .collect()
        };

        for (domain, claim) in claimed {
            match self.enable_domain(&domain).await {
                Ok(()) => debug!(%domain, "Domain enabled"),
                Err(e) => {
                    let forgotten = self.inner.domains.lock().release(&domain, claim);
                    debug!(%domain, error = %e, forgotten, "Domain enable failed");
                }
            }
        }
    }

    async fn enable_domain(&self, domain: &Domain) -> Result<()> {
        let staged = self.stage(EnableDomain::new(domain.clone()))?;
        self.write_frame(staged.id, staged.frame).await?;

        let limit = self.inner.options.enable_timeout;
        timeout(limit, staged.reply)
            .await
            .map_err(|_| Error::request_timeout(staged.method, millis(limit)))?
    }

    /// Forgets enabled domains that no longer have handlers.
    fn sweep_domains(&self) {
        let wanted = self.inner.handlers.active_domains();
        self.inner.domains.lock().retain(&wanted);
    }

    /// Runs a reconciliation in the background if the loop is running.
    fn schedule_reconcile(&self) {
        if !self.is_listening() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let connection = self.clone();
        runtime.spawn(async move { connection.reconcile_domains().await });
    }

    /// Returns the domains enabled on the current socket, sorted.
    #[must_use]
    pub fn enabled_domains(&self) -> Vec<Domain> {
        self.inner.domains.lock().sorted()
    }
}

// ============================================================================
// Handlers
// ============================================================================

impl Connection {
    /// Registers a handler for an event category.
    ///
    /// The category's domain is enabled by the next reconciliation, which
    /// starts right away if the connection is open.
    pub fn add_handler(&self, category: impl Into<EventCategory>, handler: Handler) -> HandlerId {
        let id = self.inner.handlers.add(category.into(), handler);
        self.schedule_reconcile();
        id
    }

    /// Registers one handler for every known event of a domain.
    ///
    /// Returns one id per category, in table order. Empty for domains
    /// without known events.
    pub fn add_domain_handler(&self, domain: &Domain, handler: Handler) -> Vec<HandlerId> {
        let ids: Vec<_> = domain
            .event_categories()
            .into_iter()
            .map(|category| self.inner.handlers.add(category, handler.clone()))
            .collect();

        if !ids.is_empty() {
            self.schedule_reconcile();
        }
        ids
    }

    /// Registers an async handler that receives the decoded payload of `E`.
    ///
    /// Payloads that fail to decode are reported as handler failures.
    pub fn add_typed_handler<E, F, Fut>(&self, callback: F) -> HandlerId
    where
        E: EventSchema,
        F: Fn(E, Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Handler::from_async(move |event: Arc<Event>, connection: Connection| {
            let pending = event
                .decode::<E>()
                .map(|payload| callback(payload, connection));
            async move {
                match pending {
                    Ok(future) => future.await,
                    Err(e) => Err(e),
                }
            }
        });

        self.add_handler(E::category(), handler)
    }

    /// Removes handlers and forgets domains left without any.
    ///
    /// See [`HandlerRegistry::remove`] for the argument combinations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a handler is given without its
    /// category.
    pub fn remove_handlers(
        &self,
        category: Option<&EventCategory>,
        handler: Option<HandlerId>,
    ) -> Result<usize> {
        let removed = self.inner.handlers.remove(category, handler)?;
        if removed > 0 {
            self.sweep_domains();
        }
        Ok(removed)
    }

    /// Returns the number of registered handlers.
    #[inline]
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }
}

// ============================================================================
// Waiting
// ============================================================================

impl Connection {
    /// Waits for quiescence.
    ///
    /// With `None`, returns once no frame arrived for the idle threshold.
    /// With `Some(duration)`, waits the full duration regardless of traffic.
    ///
    /// A recorded target is refreshed first; a failed refresh keeps the
    /// previous record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if no reader loop is running.
    pub async fn wait(&self, duration: Option<Duration>) -> Result<()> {
        if !self.is_listening() {
            return Err(Error::ConnectionClosed);
        }

        if self.target_id().is_some()
            && let Err(e) = self.update_target().await
        {
            debug!(error = %e, "Target refresh before wait failed");
        }

        match duration {
            Some(duration) => sleep(duration).await,
            None => self.inner.idle.wait_idle().await,
        }

        Ok(())
    }

    /// Returns `true` while the idle signal is raised.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.idle.is_idle()
    }

    /// Returns the idle threshold.
    #[inline]
    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        self.inner.idle.threshold()
    }

    /// Changes the idle threshold of the running and future reader loops.
    pub fn set_idle_threshold(&self, threshold: Duration) {
        self.inner.idle.set_threshold(threshold);
    }
}

// ============================================================================
// Introspection
// ============================================================================

impl Connection {
    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Returns the number of table entries, transactions and event records.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.table.lock().len()
    }

    /// Returns the number of event records awaiting eviction.
    #[inline]
    #[must_use]
    pub fn tracked_event_count(&self) -> usize {
        self.inner.table.lock().tracked_events()
    }
}

// ============================================================================
// Target
// ============================================================================

impl Connection {
    /// Returns the target this connection is attached to, if known.
    #[must_use]
    pub fn target(&self) -> Option<TargetInfo> {
        self.inner.target.read().clone()
    }

    /// Returns the attached target's id, if known.
    #[must_use]
    pub fn target_id(&self) -> Option<String> {
        self.inner
            .target
            .read()
            .as_ref()
            .map(|target| target.target_id.clone())
    }

    /// Records the attached target.
    pub fn set_target(&self, target: TargetInfo) {
        *self.inner.target.write() = Some(target);
    }

    /// Fetches fresh target info and records it.
    ///
    /// Queries the recorded target by id, or the connection's own target if
    /// none is recorded.
    ///
    /// # Errors
    ///
    /// As [`Connection::send`].
    pub async fn update_target(&self) -> Result<TargetInfo> {
        let command = match self.target_id() {
            Some(id) => GetTargetInfo::of(id),
            None => GetTargetInfo::current(),
        };

        let info = self.send(command).await?;
        trace!(target_id = %info.target_id, url = %info.url, "Target updated");

        *self.inner.target.write() = Some(info.clone());
        Ok(info)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url.as_str())
            .field("open", &!self.is_closed())
            .field("listening", &self.is_listening())
            .field("idle", &self.inner.idle.is_idle())
            .field("table", &*self.inner.table.lock())
            .field("handlers", &*self.inner.handlers)
            .field("domains", &self.enabled_domains())
            .finish()
    }
}

/// Duration in whole milliseconds, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::RawCommand;

    fn target_info(id: &str) -> TargetInfo {
        serde_json::from_value(serde_json::json!({
            "targetId": id,
            "type": "page",
            "title": "",
            "url": "about:blank",
            "attached": true,
            "canAccessOpener": false
        }))
        .expect("target info")
    }

    #[test]
    fn test_new_is_closed() {
        let connection = Connection::new("ws://127.0.0.1:9222/devtools/page/A").expect("valid");
        assert!(connection.is_closed());
        assert!(!connection.is_listening());
        assert_eq!(connection.pending_count(), 0);
        assert!(connection.enabled_domains().is_empty());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let err = Connection::new("http://127.0.0.1:9222/json").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = Connection::new("not a url").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_rejects_invalid_options() {
        let options = ConnectionOptions::new().with_event_retention(10, 10);
        let err = Connection::with_options("ws://127.0.0.1:1/", options).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_wait_requires_listener() {
        let connection = Connection::new("ws://127.0.0.1:9222/").expect("valid");
        let err = connection.wait(None).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_when_closed_is_noop() {
        let connection = Connection::new("ws://127.0.0.1:9222/").expect("valid");
        connection.close().await;
        connection.close().await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_send_fails_when_unreachable() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind");
            listener.local_addr().expect("addr").port()
        };

        let options = ConnectionOptions::new().with_connect_timeout(Duration::from_secs(2));
        let connection =
            Connection::with_options(&format!("ws://127.0.0.1:{port}/"), options).expect("valid");

        let result = connection.send(RawCommand::new("Foo.bar")).await;
        assert!(result.is_err());
        assert!(connection.is_closed());
        assert_eq!(connection.pending_count(), 0);
    }

    #[test]
    fn test_handlers_on_closed_connection() {
        let connection = Connection::new("ws://127.0.0.1:9222/").expect("valid");
        let category = EventCategory::from("Network.requestWillBeSent");

        let id = connection.add_handler(category.clone(), Handler::blocking(|_, _| Ok(())));
        assert_eq!(connection.handler_count(), 1);
        assert!(connection.enabled_domains().is_empty());

        let err = connection.remove_handlers(None, Some(id)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        assert_eq!(connection.remove_handlers(Some(&category), Some(id)).expect("remove"), 1);
        assert_eq!(connection.handler_count(), 0);
    }

    #[test]
    fn test_domain_handler_covers_domain_events() {
        let connection = Connection::new("ws://127.0.0.1:9222/").expect("valid");
        let ids = connection.add_domain_handler(&Domain::PAGE, Handler::blocking(|_, _| Ok(())));

        assert!(!ids.is_empty());
        assert_eq!(ids.len(), Domain::PAGE.event_categories().len());
        assert_eq!(connection.handler_count(), ids.len());

        let unknown = connection
            .add_domain_handler(&Domain::new("Nope"), Handler::blocking(|_, _| Ok(())));
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_enabled_domains_release_only_own_claim() {
        let mut enabled = EnabledDomains::default();

        let stale = enabled.claim(&Domain::NETWORK).expect("first claim");
        assert!(enabled.claim(&Domain::NETWORK).is_none());

        // Closing forgets the domain and a reopen claims it again.
        enabled.clear();
        let current = enabled.claim(&Domain::NETWORK).expect("second claim");
        assert_ne!(stale, current);

        assert!(!enabled.release(&Domain::NETWORK, stale));
        assert_eq!(enabled.sorted(), vec![Domain::NETWORK]);

        assert!(enabled.release(&Domain::NETWORK, current));
        assert!(enabled.sorted().is_empty());
    }

    #[test]
    fn test_enabled_domains_retain_wanted() {
        let mut enabled = EnabledDomains::default();
        enabled.claim(&Domain::NETWORK);
        enabled.claim(&Domain::PAGE);

        let wanted: FxHashSet<Domain> = [Domain::PAGE].into_iter().collect();
        enabled.retain(&wanted);
        assert_eq!(enabled.sorted(), vec![Domain::PAGE]);
    }

    #[test]
    fn test_target_tracking() {
        let connection = Connection::new("ws://127.0.0.1:9222/").expect("valid");
        assert!(connection.target().is_none());

        connection.set_target(target_info("T1"));
        assert_eq!(connection.target_id().as_deref(), Some("T1"));
    }

    #[test]
    fn test_idle_threshold_adjustable() {
        let options = ConnectionOptions::new().with_idle_threshold(Duration::from_millis(250));
        let connection = Connection::with_options("ws://127.0.0.1:9222/", options).expect("valid");
        assert_eq!(connection.idle_threshold(), Duration::from_millis(250));

        connection.set_idle_threshold(Duration::from_secs(1));
        assert_eq!(connection.idle_threshold(), Duration::from_secs(1));
    }

    #[test]
    fn test_debug_output() {
        let connection = Connection::new("ws://127.0.0.1:9222/").expect("valid");
        let debug = format!("{connection:?}");
        assert!(debug.contains("ws://127.0.0.1:9222/"));
        assert!(debug.contains("listening: false"));
    }
}
