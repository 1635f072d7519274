//! The event batch and the accumulate/commit/send pipeline (§4.4).

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::consistency::Consistency;
use crate::error::PublishError;
use crate::session::Session;
use crate::wire::Event;
use crate::wire::PublishRequest;
use crate::wire::PublishResponse;
use crate::CommandResult;
use crate::Context;
use crate::EventPayload;

/// Which send path a batch was committed under. Decided once, at commit time, from the
/// `context` in effect for the log entry the batch was produced at — not re-derived later, since
/// by the time a batch is resent the context may have moved on to a different entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SendPolicy {
    /// `context.synchronous() && consistency == LINEARIZABLE`: must reach the client, falling
    /// back to the connections registry if no connection is attached.
    Linearizable,
    /// Everything else: best-effort on the currently attached connection only.
    Sequential,
}

/// An accumulating or queued batch of events produced for a single log index (§3).
pub struct EventHolder<P> {
    pub(crate) event_index: u64,
    pub(crate) previous_index: u64,
    pub(crate) events: Vec<Event<P>>,
    pub(crate) policy: SendPolicy,
    completion: Option<oneshot::Sender<()>>,
}

impl<P> EventHolder<P> {
    fn new(event_index: u64, previous_index: u64) -> Self {
        Self {
            event_index,
            previous_index,
            events: Vec::new(),
            policy: SendPolicy::Sequential,
            completion: None,
        }
    }

    /// Resolve this batch's completion successfully. Called on ack, expiry, or session close.
    pub(crate) fn complete(self) {
        if let Some(tx) = self.completion {
            let _ = tx.send(());
        }
    }
}

impl<P, R, C> Session<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    /// Accept an event produced during the application of the log entry at `context.index()`
    /// (§4.4 "Collection").
    ///
    /// Only valid while a command is being applied on an open session: `context.consistency()`
    /// is `None` outside of that window.
    #[tracing::instrument(level = "trace", skip(self, name, payload))]
    pub fn publish(&mut self, name: impl Into<String>, payload: P) -> Result<(), PublishError> {
        if self.ctx.consistency().is_none() {
            return Err(PublishError::InvalidState);
        }
        if let Err(error) = self.ensure_accepting_work() {
            tracing::debug!(session = %self.id, %error, "publish rejected on a closed or expired session");
            return Err(PublishError::InvalidState);
        }
        let index = self.ctx.index();
        if self.complete_index > index {
            // Already acked past this index via another replica's delivery; drop.
            return Ok(());
        }

        let needs_new_batch = match &self.open_batch {
            Some(batch) => batch.event_index != index,
            None => true,
        };
        if needs_new_batch {
            let previous = self.event_index;
            let (tx, rx) = oneshot::channel();
            let mut batch = EventHolder::new(index, previous);
            batch.completion = Some(tx);
            self.open_batch = Some(batch);
            self.open_batch_rx = Some(rx);
            self.event_index = index;
        }

        if let Some(batch) = self.open_batch.as_mut() {
            batch.events.push(Event::new(name, payload));
        }
        Ok(())
    }

    /// Finalize the open batch for `index`, enqueue it for send, and initiate that send (§4.4
    /// "Commit"). Returns the batch's completion receiver so the caller can await delivery when
    /// the command demands it; `None` if no batch was open for this index.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn commit(&mut self, index: u64) -> Option<oneshot::Receiver<()>> {
        let matches = matches!(&self.open_batch, Some(batch) if batch.event_index == index);
        if !matches {
            return None;
        }
        let mut batch = self.open_batch.take().expect("checked above");
        batch.policy = self.decide_send_policy();
        let rx = self.open_batch_rx.take();
        self.events.push_back(batch);
        self.report_metrics();
        self.try_send_front().await;
        rx
    }

    fn decide_send_policy(&self) -> SendPolicy {
        if self.ctx.synchronous() && self.ctx.consistency() == Some(Consistency::Linearizable) {
            SendPolicy::Linearizable
        } else {
            SendPolicy::Sequential
        }
    }

    /// Attempt to send the batch at the front of the outbound queue, per the policy decided for
    /// it at commit time (§4.4 "Send policy"). A failed or skipped attempt leaves the batch
    /// queued; nothing here retries automatically — resend is a deliberate, caller-driven action
    /// via [`Session::resend_events`], matching the crate's executor-drives-the-loop design.
    async fn try_send_front(&mut self) {
        let (policy, event_index) = match self.events.front() {
            Some(batch) => (batch.policy, batch.event_index),
            None => return,
        };

        let conn = match policy {
            SendPolicy::Linearizable => match self.resolve_send_connection(event_index).await {
                Ok(conn) => conn,
                Err(error) => {
                    tracing::debug!(session = %self.id, %error, "no route for linearizable send; leaving queued");
                    return;
                }
            },
            SendPolicy::Sequential => match self.connection.clone() {
                Some(conn) => conn,
                None => return,
            },
        };

        if let Err(error) = self.send_front(conn).await {
            tracing::debug!(session = %self.id, %error, "send attempt failed; leaving queued for next attempt");
        }
    }

    /// The currently attached connection if present, else a connection obtained from the
    /// `connections` registry for the session's last-known address (§4.4, linearizable fallback).
    async fn resolve_send_connection(&self, event_index: u64) -> Result<Arc<C::Connection>, PublishError> {
        if let Some(conn) = &self.connection {
            return Ok(conn.clone());
        }
        let addr = self.address.as_ref().ok_or(PublishError::NoRoute { event_index })?;
        match self.ctx.connect(addr).await {
            Ok(conn) => Ok(conn),
            Err(error) => {
                tracing::warn!(session = %self.id, %error, "failed to resolve connection for linearizable send");
                Err(PublishError::NoRoute { event_index })
            }
        }
    }

    /// Send the batch currently at the front of the queue on `conn` and fold a clean ack into
    /// session state directly (§4.4 "Ack and resend").
    ///
    /// Deliberately does not route a not-OK response back through
    /// [`Session::handle_publish_response`]: that method's not-OK branch calls
    /// [`Session::resend_events`], which itself calls back into this method for every batch it
    /// re-sends — routing through it here would make `send_front` and `handle_publish_response`
    /// mutually recursive `async fn`s, which Rust cannot size. A not-OK response observed here is
    /// logged and left for the next explicit [`Session::resend_events`]/[`Session::handle_publish_response`]
    /// call to pick up.
    async fn send_front(&mut self, conn: Arc<C::Connection>) -> Result<(), PublishError> {
        let request = {
            let batch = match self.events.front() {
                Some(batch) => batch,
                None => return Ok(()),
            };
            PublishRequest {
                session: self.id.0,
                event_index: batch.event_index,
                previous_index: batch.previous_index.max(self.complete_index),
                events: batch.events.clone(),
            }
        };
        let event_index = request.event_index;
        match tokio::time::timeout(self.send_timeout, conn.send_publish(request)).await {
            Ok(Ok(response)) if response.is_ok() => {
                self.clear_events(response.index);
                Ok(())
            }
            Ok(Ok(response)) => {
                tracing::debug!(session = %self.id, index = response.index, event_index, "not-OK publish response; leaving queued");
                Err(PublishError::NackWithIndex { last_seen: response.index })
            }
            Ok(Err(error)) => {
                tracing::warn!(session = %self.id, %error, event_index, "transport error sending event batch");
                Err(PublishError::TransportError { event_index })
            }
            Err(_elapsed) => {
                tracing::warn!(session = %self.id, event_index, timeout = ?self.send_timeout, "send timed out; leaving queued");
                Err(PublishError::TransportError { event_index })
            }
        }
    }

    /// Fold a publish-response into session state (§4.4 "Ack and resend", §7).
    ///
    /// This is the entry point for a response that arrives other than through this session's own
    /// active send loop — most directly, a response a caller received out of band and is now
    /// reporting in. An index at or below `complete_index` is stale and rejected without touching
    /// state. Status OK advances `complete_index` via [`Session::clear_events`]. A not-OK response
    /// (with no transport error — the response was received at all) calls
    /// [`Session::resend_events`], which itself advances `complete_index` via `clear_events`
    /// before re-sending whatever remains queued, and the call reports
    /// [`PublishError::NackWithIndex`]. A transport error (no response at all) never reaches this
    /// method; reconnection elsewhere is what eventually triggers a resend.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn handle_publish_response(&mut self, response: PublishResponse) -> Result<(), PublishError> {
        if self.closed {
            return Ok(());
        }
        if response.index <= self.complete_index {
            return Err(PublishError::StaleAck {
                acked: response.index,
                complete_index: self.complete_index,
            });
        }
        if response.is_ok() {
            self.clear_events(response.index);
            Ok(())
        } else {
            self.resend_events(response.index).await;
            Err(PublishError::NackWithIndex { last_seen: response.index })
        }
    }

    /// Pop and complete every queued batch with `event_index <= k`, advancing `complete_index` to
    /// `max(complete_index, k)` (§4.4, §8).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn clear_events(&mut self, k: u64) {
        while let Some(batch) = self.events.front() {
            if batch.event_index > k {
                break;
            }
            let batch = self.events.pop_front().expect("checked by front()");
            batch.complete();
        }
        if k > self.complete_index {
            self.complete_index = k;
        }
        self.report_metrics();
    }

    /// Re-send every batch still queued after advancing past `k`, sequentially and in order
    /// (§4.4 "Ack and resend" — triggered by a nack-with-index or a fresh connection after a
    /// disconnect). Stops early if no connection is available; remaining batches stay queued for
    /// the next attempt.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn resend_events(&mut self, k: u64) {
        self.clear_events(k);
        for batch in self.events.iter_mut() {
            batch.policy = SendPolicy::Sequential;
        }

        let attempts = self.events.len();
        for _ in 0..attempts {
            if self.events.is_empty() {
                break;
            }
            let conn = match self.connection.clone() {
                Some(conn) => conn,
                None => break,
            };
            if let Err(error) = self.send_front(conn).await {
                tracing::debug!(session = %self.id, %error, "resend attempt failed; leaving queued");
            }
        }
    }
}
