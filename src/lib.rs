//! Server-side session state for a Raft-replicated state machine.
//!
//! A [`Session`] is the correlation anchor between a client and the state machine: it sequences
//! client requests, deduplicates them against the replicated log, caches command results for
//! at-least-once recovery, serializes deferred queries until their causal dependencies are
//! satisfied, and delivers server-originated events back to the client with the same consistency
//! guarantees as commands.
//!
//! This crate covers the session object itself: the sequence/index bookkeeping, the
//! deferred-execution queues for commands and queries, the response cache, and the event
//! emission pipeline. The Raft log, leader election, the state machine executor, transport
//! framing, and snapshotting are all external collaborators, reached only through the narrow
//! interfaces in [`context`].

pub mod config;
pub mod consistency;
pub mod context;
pub mod error;
pub mod metrics;
mod pool;
pub mod registry;
pub mod session;
#[cfg(test)]
pub(crate) mod test_support;
pub mod wire;

pub use config::Config;
pub use config::ConfigError;
pub use consistency::Consistency;
pub use context::Address;
pub use context::Connection;
pub use context::Context;
pub use error::PublishError;
pub use error::SessionError;
pub use metrics::SessionMetrics;
pub use metrics::Wait;
pub use registry::SessionRegistry;
pub use session::Session;
pub use session::SessionId;

/// A trait alias bound for application-specific event payloads.
///
/// Modeled after `async-raft`'s `AppData`/`AppDataResponse` bounds: a payload must be safely
/// sendable across the executor/send-path boundary and must round-trip through the wire format
/// used for publish requests.
pub trait EventPayload:
    Clone + std::fmt::Debug + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static
{
}

impl<T> EventPayload for T where
    T: Clone + std::fmt::Debug + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static
{
}

/// A trait alias bound for cached command results.
pub trait CommandResult: Clone + std::fmt::Debug + Send + Sync + 'static {}

impl<T> CommandResult for T where T: Clone + std::fmt::Debug + Send + Sync + 'static {}
