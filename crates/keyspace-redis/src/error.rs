//! Error types for the Redis keyspace connection.
//!
//! This module provides error types that map redis-rs failures onto the
//! generic [`KeyspaceError`](keyspace_common::KeyspaceError) type.

use keyspace_common::KeyspaceError;
use redis::{ErrorKind, RedisError};
use thiserror::Error;

/// Result type alias for Redis connection setup.
pub type Result<T> = std::result::Result<T, RedisKeyspaceError>;

/// Errors specific to the Redis keyspace connection.
#[derive(Debug, Error)]
pub enum RedisKeyspaceError {
    /// Error from redis-rs not tied to a key (connect, `PING`).
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Error from redis-rs while running a command against `key`.
    #[error("Redis error on '{key}': {source}")]
    Command {
        /// The prefixed key the command targeted.
        key: String,
        /// The underlying client error.
        #[source]
        source: RedisError,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RedisKeyspaceError {
    /// Wraps a redis-rs error raised by a command on `key`.
    pub(crate) fn on_key(key: &str) -> impl FnOnce(RedisError) -> Self + '_ {
        move |source| Self::Command { key: key.to_owned(), source }
    }
}

impl From<RedisKeyspaceError> for KeyspaceError {
    fn from(err: RedisKeyspaceError) -> Self {
        match err {
            RedisKeyspaceError::Redis(source) => redis_error_to_keyspace_error(source, None),
            RedisKeyspaceError::Command { key, source } => {
                redis_error_to_keyspace_error(source, Some(key))
            },
            RedisKeyspaceError::Config(message) => KeyspaceError::config(message),
        }
    }
}

/// Converts a redis-rs error to a keyspace error.
///
/// Timeouts are checked before generic I/O failures since a timed-out
/// socket read is also an I/O error. Replies saying the server is loading
/// or resyncing map to `Unavailable`.
fn redis_error_to_keyspace_error(err: RedisError, key: Option<String>) -> KeyspaceError {
    if err.is_timeout() {
        return KeyspaceError::timeout();
    }

    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        return KeyspaceError::connection_with_source(err.to_string(), err);
    }

    if matches!(
        err.kind(),
        ErrorKind::BusyLoadingError
            | ErrorKind::MasterDown
            | ErrorKind::TryAgain
            | ErrorKind::ClusterDown
    ) {
        return KeyspaceError::unavailable_with_source(err.to_string(), err);
    }

    match (err.code(), key) {
        (Some("WRONGTYPE"), Some(key)) => KeyspaceError::wrong_type(key),
        _ => KeyspaceError::command_with_source(err.to_string(), err),
    }
}
