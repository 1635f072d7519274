//! A minimal in-memory home for sessions, so a state-machine executor has somewhere to look one
//! up before driving it.
//!
//! This is ambient plumbing, not policy: keep-alive timeouts and expiration are explicitly out of
//! scope (an application wires its own policy on top, calling [`crate::Session::expire`] when it
//! decides to). Grounded the way `async-raft::Raft` wraps `RaftCore` behind a handle — here the
//! registry is the analogous "holds many sessions" container, kept deliberately dumb.

use std::collections::hash_map;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::session::SessionId;
use crate::CommandResult;
use crate::Context;
use crate::EventPayload;
use crate::Session;

/// A `SessionId -> Session` map. No eviction policy, no background task.
pub struct SessionRegistry<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    config: Config,
    sessions: HashMap<SessionId, Session<P, R, C>>,
}

impl<P, R, C> SessionRegistry<P, R, C>
where
    P: EventPayload,
    R: CommandResult,
    C: Context<P>,
{
    /// Create an empty registry, using `config`'s session/send timeouts as the defaults
    /// [`SessionRegistry::register_session`] falls back to when a caller doesn't supply its own.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// The config this registry was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Insert a session, replacing any existing session with the same id.
    pub fn register(&mut self, session: Session<P, R, C>) {
        self.sessions.insert(session.id(), session);
    }

    /// Build and register a new, closed session for `id`, using `timeout` if supplied or else
    /// the registry's configured [`Config::session_timeout`] (SPEC_FULL.md §2 EXPANSION).
    #[tracing::instrument(level = "trace", skip(self, ctx))]
    pub fn register_session(&mut self, id: SessionId, ctx: Arc<C>, timeout: Option<Duration>) -> &mut Session<P, R, C> {
        let timeout = timeout.unwrap_or_else(|| self.config.session_timeout());
        let send_timeout = self.config.send_timeout();
        let session = Session::new(id, timeout, send_timeout, ctx);
        self.sessions.insert(id, session);
        self.sessions.get_mut(&id).expect("just inserted")
    }

    pub fn get(&self, id: SessionId) -> Option<&Session<P, R, C>> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<P, R, C>> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session<P, R, C>> {
        self.sessions.remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, SessionId, Session<P, R, C>> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> hash_map::ValuesMut<'_, SessionId, Session<P, R, C>> {
        self.sessions.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NoopContext;

    fn test_config() -> Config {
        Config::build("test-cluster".into()).validate().expect("valid config")
    }

    #[test]
    fn register_get_remove_round_trip() {
        let ctx = std::sync::Arc::new(NoopContext::default());
        let mut registry: SessionRegistry<u32, u32, NoopContext> = SessionRegistry::new(test_config());
        let session = Session::new(SessionId(1), std::time::Duration::from_secs(1), std::time::Duration::from_secs(1), ctx);
        registry.register(session);

        assert!(registry.contains(SessionId(1)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(SessionId(1)).is_some());

        let removed = registry.remove(SessionId(1));
        assert!(removed.is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_session_falls_back_to_configured_timeouts() {
        let ctx = std::sync::Arc::new(NoopContext::default());
        let cfg = test_config();
        let expected_timeout = cfg.session_timeout();
        let expected_send_timeout = cfg.send_timeout();
        let mut registry: SessionRegistry<u32, u32, NoopContext> = SessionRegistry::new(cfg);

        let session = registry.register_session(SessionId(1), ctx, None);
        assert_eq!(session.timeout(), expected_timeout);
        assert_eq!(session.send_timeout(), expected_send_timeout);
    }

    #[test]
    fn register_session_honors_an_explicit_timeout() {
        let ctx = std::sync::Arc::new(NoopContext::default());
        let mut registry: SessionRegistry<u32, u32, NoopContext> = SessionRegistry::new(test_config());

        let explicit = std::time::Duration::from_secs(42);
        let session = registry.register_session(SessionId(1), ctx, Some(explicit));
        assert_eq!(session.timeout(), explicit);
    }
}
