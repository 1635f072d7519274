//! Runtime configuration for session bookkeeping.
//!
//! Mirrors the `Config::build(name).validate()` idiom: a config is assembled with a builder,
//! then validated once before use so bad values surface as a [`ConfigError`] rather than a panic
//! deep inside the ordering machinery.

use std::time::Duration;

use thiserror::Error;

/// Default session inactivity budget, used when a caller doesn't supply one explicitly at
/// registration time.
pub const DEFAULT_SESSION_TIMEOUT_MILLIS: u64 = 15_000;

/// Default timeout for a single event-batch send attempt before it is treated as a transport
/// error and left queued for resend.
pub const DEFAULT_SEND_TIMEOUT_MILLIS: u64 = 5_000;

/// Errors produced while validating a [`Config`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The session timeout must be greater than zero.
    #[error("session_timeout_millis must be > 0")]
    SessionTimeoutZero,

    /// The send timeout must be greater than zero.
    #[error("send_timeout_millis must be > 0")]
    SendTimeoutZero,
}

/// Runtime configuration for a [`crate::SessionRegistry`].
///
/// Built via [`Config::build`], then [`Config::validate`]d, the same two-step idiom used by
/// `async-raft::Config`.
#[derive(Clone, Debug)]
pub struct Config {
    /// A human-readable name for the owning cluster, surfaced in tracing spans.
    pub cluster_name: String,

    /// The default session inactivity budget, used when a session is registered without an
    /// explicit timeout.
    pub session_timeout_millis: u64,

    /// How long a single event-batch send attempt may take before it is considered a transport
    /// error.
    pub send_timeout_millis: u64,
}

impl Config {
    /// Start building a new config for the named cluster, with every other field defaulted.
    pub fn build(cluster_name: String) -> ConfigBuilder {
        ConfigBuilder {
            cluster_name,
            session_timeout_millis: None,
            send_timeout_millis: None,
        }
    }

    /// The session timeout as a [`Duration`].
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_millis)
    }

    /// The send timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_millis)
    }
}

/// A builder for [`Config`].
pub struct ConfigBuilder {
    cluster_name: String,
    session_timeout_millis: Option<u64>,
    send_timeout_millis: Option<u64>,
}

impl ConfigBuilder {
    /// Override the default session inactivity budget.
    pub fn session_timeout_millis(mut self, v: u64) -> Self {
        self.session_timeout_millis = Some(v);
        self
    }

    /// Override the default event-batch send timeout.
    pub fn send_timeout_millis(mut self, v: u64) -> Self {
        self.send_timeout_millis = Some(v);
        self
    }

    /// Validate and finalize the config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        let session_timeout_millis = self.session_timeout_millis.unwrap_or(DEFAULT_SESSION_TIMEOUT_MILLIS);
        let send_timeout_millis = self.send_timeout_millis.unwrap_or(DEFAULT_SEND_TIMEOUT_MILLIS);

        if session_timeout_millis == 0 {
            return Err(ConfigError::SessionTimeoutZero);
        }
        if send_timeout_millis == 0 {
            return Err(ConfigError::SendTimeoutZero);
        }

        Ok(Config {
            cluster_name: self.cluster_name,
            session_timeout_millis,
            send_timeout_millis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cfg = Config::build("test".into()).validate().expect("valid config");
        assert_eq!(cfg.session_timeout_millis, DEFAULT_SESSION_TIMEOUT_MILLIS);
        assert_eq!(cfg.send_timeout_millis, DEFAULT_SEND_TIMEOUT_MILLIS);
    }

    #[test]
    fn zero_session_timeout_rejected() {
        let err = Config::build("test".into()).session_timeout_millis(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::SessionTimeoutZero);
    }

    #[test]
    fn zero_send_timeout_rejected() {
        let err = Config::build("test".into()).send_timeout_millis(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::SendTimeoutZero);
    }
}
