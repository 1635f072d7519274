//! Collaborator contracts consumed by the session core (§6).
//!
//! These traits describe, not implement, the Raft log/state-machine-executor/transport layers
//! that surround a session. The session core is generic over them the same way `async-raft`'s
//! core is generic over `RaftNetwork`/`RaftStorage`: an application supplies its own
//! implementations and wires them into [`crate::Session`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::consistency::Consistency;
use crate::wire::PublishRequest;
use crate::wire::PublishResponse;

/// An opaque peer identity usable as a connection-registry key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handler invoked for each inbound publish request received on a [`Connection`].
pub type PublishHandler<P> = Arc<dyn Fn(PublishRequest<P>) -> PublishResponse + Send + Sync>;

/// A bidirectional transport channel to a single peer, with request/response correlation.
///
/// Mirrors the role `async-raft::RaftNetwork` plays for RPCs: the session core never touches
/// sockets directly, it calls through this trait.
#[async_trait]
pub trait Connection<P>: Send + Sync + 'static
where P: crate::EventPayload
{
    /// Send a publish request and await the correlated response.
    async fn send_publish(&self, req: PublishRequest<P>) -> anyhow::Result<PublishResponse>;

    /// Install the handler invoked for publish requests this connection receives (§4.5).
    fn set_publish_handler(&self, handler: PublishHandler<P>);
}

/// The state-machine-execution context in effect while a log entry is being applied.
///
/// `index()`/`consistency()`/`synchronous()` describe the entry currently being applied;
/// `connections()` resolves a [`Address`] to a live connection, used as the linearizable-send
/// fallback when no connection is already attached to the session (§4.4).
#[async_trait]
pub trait Context<P>: Send + Sync + 'static
where P: crate::EventPayload
{
    /// The connection type this context's registry hands back.
    type Connection: Connection<P>;

    /// The log index currently being applied, or the index of the most recent apply if none is
    /// in progress.
    fn index(&self) -> u64;

    /// The consistency level of the command currently being applied, or `None` outside of a
    /// command's application.
    fn consistency(&self) -> Option<Consistency>;

    /// Whether the calling thread is the leader's synchronous apply path.
    fn synchronous(&self) -> bool;

    /// Resolve a peer address to a connection, establishing one if necessary.
    async fn connect(&self, addr: &Address) -> anyhow::Result<Arc<Self::Connection>>;
}
