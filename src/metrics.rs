//! Observability for session state.
//!
//! A [`SessionMetrics`] snapshot is published on a `tokio::sync::watch` channel every time the
//! session's counters move, the same shape `async-raft::RaftMetrics` uses for its own state.
//! [`Wait`] polls that channel for a predicate, mirroring `async-raft::Raft::wait`.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::session::SessionId;

/// A point-in-time snapshot of a session's counters and queue depths.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SessionMetrics {
    pub id: u64,
    pub request_sequence: u64,
    pub command_sequence: u64,
    pub last_applied: u64,
    pub command_low_water_mark: u64,
    pub complete_index: u64,
    pub pending_commands: usize,
    pub pending_sequence_queries: usize,
    pub pending_index_queries: usize,
    pub cached_responses: usize,
    pub queued_event_batches: usize,
    pub closed: bool,
    pub suspect: bool,
    pub unregistering: bool,
    pub expired: bool,
}

impl SessionMetrics {
    /// A metrics value for a session which has not yet been opened.
    pub fn new_initial(id: SessionId) -> Self {
        Self {
            id: id.0,
            closed: true,
            ..Default::default()
        }
    }
}

/// A handle used to wait for a session's metrics to satisfy some predicate.
///
/// ```ignore
/// # use std::time::Duration;
/// let timeout = Duration::from_millis(200);
/// session.wait(Some(timeout)).satisfying(|m| m.command_sequence >= 3).await?;
/// ```
pub struct Wait {
    pub timeout: Duration,
    pub rx: watch::Receiver<SessionMetrics>,
}

/// The error returned when a [`Wait`] times out or the metrics channel closes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for session metrics condition")]
    Timeout(Duration),
    #[error("session metrics channel closed")]
    Closed,
}

impl Wait {
    /// Wait until the current metrics value satisfies `predicate`, or until the timeout elapses.
    pub async fn satisfying(mut self, predicate: impl Fn(&SessionMetrics) -> bool) -> Result<SessionMetrics, WaitError> {
        if predicate(&self.rx.borrow()) {
            return Ok(self.rx.borrow().clone());
        }

        let fut = async {
            loop {
                if self.rx.changed().await.is_err() {
                    return Err(WaitError::Closed);
                }
                let snapshot = self.rx.borrow().clone();
                if predicate(&snapshot) {
                    return Ok(snapshot);
                }
            }
        };

        timeout(self.timeout, fut).await.map_err(|_| WaitError::Timeout(self.timeout))?
    }
}
