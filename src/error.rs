//! The session's error taxonomy.
//!
//! Split by concern rather than flattened into one enum, the same way `async-raft::error` keeps
//! `RaftError`, `ClientWriteError` and `ClientReadError` distinct: callers of `register_query` see
//! a different failure shape than callers of `publish`.

use thiserror::Error;

use crate::session::SessionId;

/// Errors raised by session bookkeeping operations: registering requests, gating queries on a
/// sequence or index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A query was registered against a sequence which has already been passed.
    ///
    /// Per §4.2/§8: a query registered at sequence `k` with `k <= command_sequence` at
    /// registration time has missed its trigger and must be rejected by the caller.
    #[error("sequence query for {requested} registered too late: command_sequence is already {current}")]
    SequenceAlreadyPassed { requested: u64, current: u64 },

    /// A query was registered against a log index which has already been applied.
    #[error("index query for {requested} registered too late: last_applied is already {current}")]
    IndexAlreadyPassed { requested: u64, current: u64 },

    /// The session is closed and cannot accept new work.
    #[error("session {0:?} is closed")]
    Closed(SessionId),

    /// The session has expired and cannot accept new work.
    #[error("session {0:?} has expired")]
    Expired(SessionId),
}

/// Errors raised by the event pipeline (§4.4, §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// `publish` was called outside of a command's application, or on a closed session.
    #[error("invalid state: publish is only valid during command application on an open session")]
    InvalidState,

    /// An acknowledgement referenced an index at or below `complete_index`; ignored.
    #[error("stale ack for index {acked}, complete_index is already {complete_index}")]
    StaleAck { acked: u64, complete_index: u64 },

    /// The connection was lost while sending; the batch remains queued for resend.
    #[error("transport error while sending event batch at index {event_index}")]
    TransportError { event_index: u64 },

    /// The peer rejected the batch with a known last-seen index.
    #[error("peer nacked with last-seen index {last_seen}")]
    NackWithIndex { last_seen: u64 },

    /// No connection is attached and no address is known, so a linearizable send cannot be
    /// attempted.
    #[error("no connection or known address to send event batch at index {event_index}")]
    NoRoute { event_index: u64 },
}
