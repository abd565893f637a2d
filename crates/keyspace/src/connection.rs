//! Connection trait definition.
//!
//! [`KeyspaceConnection`] is the seam between the [`KeyspaceClient`](crate::KeyspaceClient)
//! and a concrete store client. Each method maps to exactly one store command
//! and receives keys that are already prefixed; implementations never apply
//! naming conventions of their own.
//!
//! # Implementing a Connection
//!
//! 1. Implement [`KeyspaceConnection`] for a cheaply cloneable handle
//! 2. Map client-specific errors to [`KeyspaceError`](crate::KeyspaceError)
//! 3. Report the [`ConnectionRole`] the handle was opened for
//!
//! See [`MemoryConnection`](crate::MemoryConnection) for a reference implementation.

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KeyspaceResult;

/// The role a connection plays in the primary/replica pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Read-write session; every write goes here.
    Primary,
    /// Read-only, best-effort session used to offload reads.
    Replica,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Replica => write!(f, "replica"),
        }
    }
}

/// A persistent session to the key-value store.
///
/// Implementations are shared by every caller in the process, so they must
/// be `Send + Sync` and safe to use concurrently. Atomicity of individual
/// commands (increments, hash field writes) is provided by the store.
///
/// # Commands
///
/// | Method | Store command |
/// |--------|---------------|
/// | [`get`](KeyspaceConnection::get) | `GET` |
/// | [`set`](KeyspaceConnection::set) | `SET` |
/// | [`set_ex`](KeyspaceConnection::set_ex) | `SETEX` |
/// | [`keys`](KeyspaceConnection::keys) | `KEYS` |
/// | [`del`](KeyspaceConnection::del) | `DEL` |
/// | [`lpush`](KeyspaceConnection::lpush) | `LPUSH` |
/// | [`lrem`](KeyspaceConnection::lrem) | `LREM` |
/// | [`lrange`](KeyspaceConnection::lrange) | `LRANGE` |
/// | [`incr_by`](KeyspaceConnection::incr_by) | `INCR` / `INCRBY` |
/// | [`decr_by`](KeyspaceConnection::decr_by) | `DECR` / `DECRBY` |
/// | [`hset`](KeyspaceConnection::hset) | `HSET` |
/// | [`hincrby`](KeyspaceConnection::hincrby) | `HINCRBY` |
/// | [`hdel`](KeyspaceConnection::hdel) | `HDEL` |
/// | [`hgetall`](KeyspaceConnection::hgetall) | `HGETALL` |
/// | [`ttl`](KeyspaceConnection::ttl) | `TTL` |
/// | [`ping`](KeyspaceConnection::ping) | `PING` |
#[async_trait]
pub trait KeyspaceConnection: Send + Sync {
    /// Returns the role this connection was opened for.
    fn role(&self) -> ConnectionRole;

    /// Short identifier of the store client, used in logs and health reports.
    fn backend(&self) -> &'static str;

    /// Reads a string value. `Ok(None)` when the key does not exist.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>>;

    /// Writes a string value without expiry, clearing any existing TTL.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn set(&self, key: &str, value: &str) -> KeyspaceResult<()>;

    /// Writes a string value that expires after `ttl_secs` seconds.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KeyspaceResult<()>;

    /// Returns every key matching the glob `pattern`.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn keys(&self, pattern: &str) -> KeyspaceResult<Vec<String>>;

    /// Deletes a key of any type. Returns the number of keys removed (0 or 1).
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn del(&self, key: &str) -> KeyspaceResult<u64>;

    /// Prepends `value` to the list at `key`. Returns the new list length.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn lpush(&self, key: &str, value: &str) -> KeyspaceResult<i64>;

    /// Removes occurrences of `value` from the list at `key`.
    ///
    /// `count > 0` removes from head to tail, `count < 0` from tail to head,
    /// `count == 0` removes all. Returns the number of removed elements.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn lrem(&self, key: &str, count: i64, value: &str) -> KeyspaceResult<i64>;

    /// Returns list elements between `start` and `stop` inclusive.
    /// Negative indexes count from the tail.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KeyspaceResult<Vec<String>>;

    /// Adds `delta` to the integer at `key` (missing keys start at 0).
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn incr_by(&self, key: &str, delta: i64) -> KeyspaceResult<i64>;

    /// Subtracts `delta` from the integer at `key` (missing keys start at 0).
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn decr_by(&self, key: &str, delta: i64) -> KeyspaceResult<i64>;

    /// Sets a hash field. Returns 1 if the field is new, 0 if it was updated.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn hset(&self, key: &str, field: &str, value: &str) -> KeyspaceResult<i64>;

    /// Adds `delta` to an integer hash field. Returns the new value.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KeyspaceResult<i64>;

    /// Deletes a hash field. Returns the number of fields removed.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn hdel(&self, key: &str, field: &str) -> KeyspaceResult<i64>;

    /// Returns every field and value of the hash at `key`.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn hgetall(&self, key: &str) -> KeyspaceResult<HashMap<String, String>>;

    /// Returns the remaining time-to-live in seconds.
    ///
    /// `-2` when the key does not exist, `-1` when it exists without expiry.
    #[must_use = "keyspace operations may fail and errors must be handled"]
    async fn ttl(&self, key: &str) -> KeyspaceResult<i64>;

    /// Round-trips a `PING` to verify the session is usable.
    #[must_use = "health probes may fail and errors must be handled"]
    async fn ping(&self) -> KeyspaceResult<()>;
}
