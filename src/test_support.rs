//! Shared test doubles for the `Context`/`Connection` collaborator traits, used by both the
//! session core's own tests and the registry's.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;

use async_trait::async_trait;
use tracing_subscriber::prelude::*;

use crate::consistency::Consistency;
use crate::context::Address;
use crate::context::Connection;
use crate::context::Context;
use crate::context::PublishHandler;
use crate::wire::PublishRequest;
use crate::wire::PublishResponse;

static TRACING_INIT: Once = Once::new();

/// Install a global `tracing` subscriber for test output, the same role
/// `async-raft`'s `fixtures::init_tracing()` plays for its own test suite. Idempotent: later
/// calls within the same test binary are no-ops.
pub(crate) fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::Layer::default().with_ansi(false);
        let subscriber = tracing_subscriber::Registry::default()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(fmt_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// A connection double that records every request it was asked to send and always answers OK.
#[derive(Default)]
pub(crate) struct RecordingConnection {
    pub(crate) sent: Mutex<Vec<PublishRequest<u32>>>,
    handler: Mutex<Option<PublishHandler<u32>>>,
}

#[async_trait]
impl Connection<u32> for RecordingConnection {
    async fn send_publish(&self, req: PublishRequest<u32>) -> anyhow::Result<PublishResponse> {
        let index = req.event_index;
        self.sent.lock().expect("not poisoned").push(req);
        Ok(PublishResponse::ok(index))
    }

    fn set_publish_handler(&self, handler: PublishHandler<u32>) {
        *self.handler.lock().expect("not poisoned") = Some(handler);
    }
}

/// A `Context` double whose `index`/`consistency`/`synchronous` are set directly by the test, and
/// whose `connect` hands back a shared [`RecordingConnection`].
pub(crate) struct NoopContext {
    index: AtomicU64,
    consistency: Mutex<Option<Consistency>>,
    synchronous: std::sync::atomic::AtomicBool,
    connection: Arc<RecordingConnection>,
}

impl Default for NoopContext {
    fn default() -> Self {
        Self {
            index: AtomicU64::new(0),
            consistency: Mutex::new(None),
            synchronous: std::sync::atomic::AtomicBool::new(false),
            connection: Arc::new(RecordingConnection::default()),
        }
    }
}

impl NoopContext {
    pub(crate) fn set_index(&self, index: u64) {
        self.index.store(index, Ordering::SeqCst);
    }

    pub(crate) fn set_consistency(&self, consistency: Option<Consistency>) {
        *self.consistency.lock().expect("not poisoned") = consistency;
    }

    pub(crate) fn set_synchronous(&self, synchronous: bool) {
        self.synchronous.store(synchronous, Ordering::SeqCst);
    }

    pub(crate) fn connection(&self) -> Arc<RecordingConnection> {
        self.connection.clone()
    }
}

#[async_trait]
impl Context<u32> for NoopContext {
    type Connection = RecordingConnection;

    fn index(&self) -> u64 {
        self.index.load(Ordering::SeqCst)
    }

    fn consistency(&self) -> Option<Consistency> {
        *self.consistency.lock().expect("not poisoned")
    }

    fn synchronous(&self) -> bool {
        self.synchronous.load(Ordering::SeqCst)
    }

    async fn connect(&self, _addr: &Address) -> anyhow::Result<Arc<Self::Connection>> {
        Ok(self.connection.clone())
    }
}
