//! Wire types for the publish RPC (§6).
//!
//! Bit-level compatibility is an external protocol concern; these are the logical shapes that
//! cross the transport, the same treatment `async-raft::raft` gives `AppendEntriesRequest` /
//! `AppendEntriesResponse`.

use serde::Deserialize;
use serde::Serialize;

/// A single named event with an opaque payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event<P> {
    pub name: String,
    pub payload: P,
}

impl<P> Event<P> {
    pub fn new(name: impl Into<String>, payload: P) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// A batch of events sent from a session's owning server to the client (or to a server acting as
/// that client's proxy).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest<P> {
    pub session: u64,
    pub event_index: u64,
    pub previous_index: u64,
    #[serde(bound = "P: Serialize + serde::de::DeserializeOwned")]
    pub events: Vec<Event<P>>,
}

/// The response status to a [`PublishRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishStatus {
    Ok,
    Error,
}

/// The response to a [`PublishRequest`] (§6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: PublishStatus,
    pub index: u64,
    pub error: Option<String>,
}

impl PublishResponse {
    pub fn ok(index: u64) -> Self {
        Self {
            status: PublishStatus::Ok,
            index,
            error: None,
        }
    }

    pub fn error(index: u64, error: impl Into<String>) -> Self {
        Self {
            status: PublishStatus::Error,
            index,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, PublishStatus::Ok)
    }
}
