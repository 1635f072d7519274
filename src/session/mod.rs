//! The session object: per-client replicated record anchoring sequencing, response caching, and
//! event delivery (§3).

mod events;
mod listeners;
mod responses;
mod sequence;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::sync::watch;

use crate::context::Address;
use crate::context::Connection;
use crate::context::Context;
use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use crate::metrics::Wait;
use crate::pool::ListPool;
use crate::wire::Event;
use crate::CommandResult;
use crate::EventPayload;

pub use events::EventHolder;

/// A globally unique session identifier; also the log index of the session's registration entry
/// (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// A completion signal: the session's callers observe it, the session itself only ever drops or
/// fulfills it per the rules in §4.3/§4.4/§4.6.
pub type Completion = oneshot::Sender<()>;

pub(crate) type DeferredCommand = Box<dyn FnOnce() + Send>;
pub(crate) type DeferredQuery = Box<dyn FnOnce() + Send>;

/// Per-client session state, replicated identically on every server (§3).
///
/// Generic over the application's event payload type `P`, its cached command result type `R`,
/// and the state-machine execution [`Context`] it is driven by — the same generic shape
/// `async-raft::core::RaftCore<D, R, N, S>` uses for its application/network/storage type
/// parameters.
pub struct Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    id: SessionId,
    timeout: std::time::Duration,
    send_timeout: std::time::Duration,
    timestamp: u64,
    connect_index: u64,
    keep_alive_index: u64,

    request_sequence: u64,
    command_sequence: u64,
    last_applied: u64,
    command_low_water_mark: u64,

    event_index: u64,
    complete_index: u64,

    closed: bool,
    suspect: bool,
    unregistering: bool,
    expired: bool,

    pub(crate) commands: HashMap<u64, DeferredCommand>,
    pub(crate) sequence_queries: HashMap<u64, Vec<DeferredQuery>>,
    pub(crate) index_queries: HashMap<u64, Vec<DeferredQuery>>,
    pub(crate) query_pool: ListPool<DeferredQuery>,

    pub(crate) responses: HashMap<u64, R>,
    pub(crate) futures: HashMap<u64, Completion>,

    pub(crate) open_batch: Option<EventHolder<P>>,
    pub(crate) open_batch_rx: Option<oneshot::Receiver<()>>,
    pub(crate) events: std::collections::VecDeque<EventHolder<P>>,

    listeners: listeners::Listeners<P>,

    connection: Option<Arc<C::Connection>>,
    address: Option<Address>,
    ctx: Arc<C>,

    tx_metrics: watch::Sender<SessionMetrics>,
    rx_metrics: watch::Receiver<SessionMetrics>,
}

impl<P, R, C> Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    /// Create a new, closed session for the given id and context.
    ///
    /// `timeout` is the session's inactivity budget (§3); `send_timeout` bounds a single
    /// event-batch send attempt before it is treated as a [`crate::error::PublishError::TransportError`]
    /// (§7). Per §3: `last_applied` is initialized to `id - 1`, and the session starts closed
    /// until [`Session::open`] is called.
    ///
    /// Most callers should go through [`crate::SessionRegistry::register_session`], which fills
    /// in both timeouts from a shared [`crate::Config`] when the caller doesn't supply one.
    #[tracing::instrument(level = "trace", skip(ctx))]
    pub fn new(id: SessionId, timeout: std::time::Duration, send_timeout: std::time::Duration, ctx: Arc<C>) -> Self {
        let (tx_metrics, rx_metrics) = watch::channel(SessionMetrics::new_initial(id));
        Self {
            id,
            timeout,
            send_timeout,
            timestamp: 0,
            connect_index: 0,
            keep_alive_index: 0,
            request_sequence: 0,
            command_sequence: 0,
            last_applied: id.0.saturating_sub(1),
            command_low_water_mark: 0,
            event_index: 0,
            complete_index: 0,
            closed: true,
            suspect: false,
            unregistering: false,
            expired: false,
            commands: HashMap::new(),
            sequence_queries: HashMap::new(),
            index_queries: HashMap::new(),
            query_pool: ListPool::new(),
            responses: HashMap::new(),
            futures: HashMap::new(),
            open_batch: None,
            open_batch_rx: None,
            events: std::collections::VecDeque::new(),
            listeners: listeners::Listeners::new(),
            connection: None,
            address: None,
            ctx,
            tx_metrics,
            rx_metrics,
        }
    }

    /// The session's identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session's inactivity budget.
    pub fn timeout(&self) -> std::time::Duration {
        self.timeout
    }

    /// How long a single event-batch send attempt may take before it is treated as a transport
    /// error (§7).
    pub fn send_timeout(&self) -> std::time::Duration {
        self.send_timeout
    }

    /// The monotonic high-water-mark of the latest log timestamp observed for this session.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Advance the session's observed timestamp high-water-mark. Only ever increases.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn observe_timestamp(&mut self, timestamp: u64) {
        if timestamp > self.timestamp {
            self.timestamp = timestamp;
        }
    }

    /// Record the log index of the most recent connect entry applied for this session.
    pub fn set_connect_index(&mut self, index: u64) {
        self.connect_index = index;
    }

    /// Record the log index of the most recent keep-alive entry applied for this session.
    pub fn set_keep_alive_index(&mut self, index: u64) {
        self.keep_alive_index = index;
    }

    pub fn connect_index(&self) -> u64 {
        self.connect_index
    }

    pub fn keep_alive_index(&self) -> u64 {
        self.keep_alive_index
    }

    pub fn request_sequence(&self) -> u64 {
        self.request_sequence
    }

    pub fn command_sequence(&self) -> u64 {
        self.command_sequence
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn command_low_water_mark(&self) -> u64 {
        self.command_low_water_mark
    }

    pub fn complete_index(&self) -> u64 {
        self.complete_index
    }

    pub(crate) fn context(&self) -> &Arc<C> {
        &self.ctx
    }

    /// Install the transport channel for this session and register the inbound publish handler
    /// on it (§4.5).
    #[tracing::instrument(level = "trace", skip(self, conn))]
    pub fn set_connection(&mut self, conn: Arc<C::Connection>) {
        let listeners = self.listeners.event_listeners_handle();
        conn.set_publish_handler(Arc::new(move |req| {
            for event in &req.events {
                listeners.dispatch(&event.name, &event.payload);
            }
            crate::wire::PublishResponse::ok(req.event_index)
        }));
        self.connection = Some(conn);
    }

    /// Record the last-known peer address, used as a fallback for linearizable sends when no
    /// connection is attached (§4.5).
    pub fn set_address(&mut self, addr: Address) {
        self.address = Some(addr);
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn connection(&self) -> Option<&Arc<C::Connection>> {
        self.connection.as_ref()
    }

    // ---- Lifecycle (§4.6) ----------------------------------------------------------------

    /// True once [`Session::open`] has been called and the session has not since been closed.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn is_suspect(&self) -> bool {
        self.suspect
    }

    pub fn is_unregistering(&self) -> bool {
        self.unregistering
    }

    /// Reject new deferred work on a terminal session (§7: `Closed`/`Expired`).
    ///
    /// Used by the registration entry points ([`Session::register_request`],
    /// [`Session::register_sequence_query`], [`Session::register_index_query`]) so a session that
    /// has already closed or expired doesn't accumulate callbacks nothing will ever drain.
    pub(crate) fn ensure_accepting_work(&self) -> Result<(), SessionError> {
        if self.expired {
            Err(SessionError::Expired(self.id))
        } else if self.closed {
            Err(SessionError::Closed(self.id))
        } else {
            Ok(())
        }
    }

    /// Transition `Initial -> Open`. Does not fire open listeners: the registrar receives them by
    /// registering after open is visible (§4.6).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn open(&mut self) {
        self.closed = false;
        self.report_metrics();
    }

    /// Transition to `Closed`, notifying close listeners.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn close(&mut self) {
        self.closed = true;
        self.listeners.notify_close(self.id);
        self.report_metrics();
    }

    /// Transition to `Expired`: sets `closed` and `expired`, resolves every queued event batch's
    /// completion with success, and notifies close listeners (§4.6).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn expire(&mut self) {
        self.closed = true;
        self.expired = true;
        if let Some(batch) = self.open_batch.take() {
            self.events.push_back(batch);
        }
        self.open_batch_rx = None;
        for batch in self.events.drain(..) {
            batch.complete();
        }
        self.listeners.notify_close(self.id);
        self.report_metrics();
    }

    /// Advisory flag toggled by the failure-detector collaborator.
    pub fn suspect(&mut self) {
        self.suspect = true;
    }

    /// Clear the advisory suspect flag.
    pub fn trust(&mut self) {
        self.suspect = false;
    }

    /// Latch the "unregistering" flag so the replicator can distinguish graceful close from
    /// expiration.
    pub fn unregister(&mut self) {
        self.unregistering = true;
    }

    // ---- Listeners (§4.6) ------------------------------------------------------------------

    /// Register a listener for a named event, invoked whenever this server receives that event
    /// from another server acting as a client of it (§4.4's inbound-publish path).
    pub fn on_event(&mut self, name: impl Into<String>, listener: impl Fn(&P) + Send + Sync + 'static) {
        self.listeners.on_event(name.into(), listener);
    }

    /// Register an observer invoked when the session closes. If the session is already closed,
    /// the listener is invoked immediately (§4.6).
    pub fn on_close(&mut self, listener: impl FnOnce(SessionId) + Send + 'static) {
        if self.closed {
            listener(self.id);
        } else {
            self.listeners.on_close(listener);
        }
    }

    /// Register an observer invoked when the session opens.
    ///
    /// Not fired by [`Session::open`] itself (§4.6) — call [`Session::notify_open`] once the
    /// registrar has made the now-open session visible to callers.
    pub fn on_open(&mut self, listener: impl FnOnce(SessionId) + Send + 'static) {
        self.listeners.on_open(listener);
    }

    /// Run and clear every registered open listener.
    pub fn notify_open(&mut self) {
        self.listeners.notify_open(self.id);
    }

    // ---- Metrics --------------------------------------------------------------------------

    /// A handle to the metrics channel.
    pub fn metrics(&self) -> watch::Receiver<SessionMetrics> {
        self.rx_metrics.clone()
    }

    /// A handle to wait for the metrics to satisfy some condition.
    pub fn wait(&self, timeout: Option<std::time::Duration>) -> Wait {
        Wait {
            timeout: timeout.unwrap_or(std::time::Duration::from_millis(500)),
            rx: self.rx_metrics.clone(),
        }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub(crate) fn report_metrics(&mut self) {
        let snapshot = SessionMetrics {
            id: self.id.0,
            request_sequence: self.request_sequence,
            command_sequence: self.command_sequence,
            last_applied: self.last_applied,
            command_low_water_mark: self.command_low_water_mark,
            complete_index: self.complete_index,
            pending_commands: self.commands.len(),
            pending_sequence_queries: self.sequence_queries.values().map(Vec::len).sum(),
            pending_index_queries: self.index_queries.values().map(Vec::len).sum(),
            cached_responses: self.responses.len(),
            queued_event_batches: self.events.len() + self.open_batch.is_some() as usize,
            closed: self.closed,
            suspect: self.suspect,
            unregistering: self.unregistering,
            expired: self.expired,
        };
        let _ = self.tx_metrics.send(snapshot);
    }
}

impl<P, R, C> PartialEq for Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P, R, C> Eq for Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
}

impl<P, R, C> std::hash::Hash for Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests;
