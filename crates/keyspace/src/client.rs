//! Prefixed, role-aware access to the key-value store.
//!
//! [`KeyspaceClient`] owns the primary/replica connection pair and is the
//! only component that talks to them. It applies the key prefix, routes
//! writes to the primary, routes reads according to the configured
//! [`ReadFallback`], and logs every failure before returning it.
//!
//! # Routing
//!
//! | Operation | Connection |
//! |-----------|------------|
//! | `set_key`, `del_key`, `l_push_key`, `l_rem_key` | primary |
//! | `increment_key`, `decrement_key` | primary |
//! | `h_set_key`, `h_incrby_key`, `h_del_key` | primary |
//! | `get_key`, `keys`, `l_range_key`, `h_getall_key`, `ttl_key` | replica, then primary |
//!
//! # Consistency
//!
//! Individual commands are atomic in the store. Pattern deletes are
//! scan-then-delete: a key created between the scan and the deletes
//! survives.

use std::{collections::HashMap, fmt, future::Future, sync::Arc, time::Instant};

use tracing::{debug, error, info, warn};

use crate::{
    connection::KeyspaceConnection,
    error::{KeyspaceError, KeyspaceResult},
    fallback::{EmptyReply, ReadFallback},
    glob,
    health::{HealthProbe, HealthReport, HealthStatus, RoleHealth},
    metrics::KeyspaceMetrics,
    prefix::{self, KeyPrefix},
};

/// Client for a primary/replica pair of keyspace connections.
///
/// Construct it once at process start and hand clones to consumers; clones
/// share the connections and metrics.
///
/// # Example
///
/// ```
/// use keyspace_common::{ConnectionRole, KeyPrefix, KeyspaceClient, MemoryConnection};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let primary = MemoryConnection::new(ConnectionRole::Primary);
///     let replica = primary.with_role(ConnectionRole::Replica);
///
///     let client = KeyspaceClient::builder()
///         .primary(primary)
///         .replica(replica)
///         .prefix(KeyPrefix::fixed("TEST|"))
///         .build();
///
///     client.set_key("session:1", "alice", 0).await?;
///     assert_eq!(client.get_key("session:1").await?.as_deref(), Some("alice"));
///     assert_eq!(client.prefixed("session:1"), "TEST|session:1");
///     Ok(())
/// }
/// ```
pub struct KeyspaceClient<C> {
    primary: Arc<C>,
    replica: Arc<C>,
    prefix: KeyPrefix,
    read_fallback: ReadFallback,
    metrics: KeyspaceMetrics,
}

impl<C> Clone for KeyspaceClient<C> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            replica: Arc::clone(&self.replica),
            prefix: self.prefix.clone(),
            read_fallback: self.read_fallback,
            metrics: self.metrics.clone(),
        }
    }
}

impl<C> fmt::Debug for KeyspaceClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyspaceClient")
            .field("prefix", &self.prefix)
            .field("read_fallback", &self.read_fallback)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl<C: KeyspaceConnection> KeyspaceClient<C> {
    /// Creates a client over an already opened connection pair.
    ///
    /// # Arguments
    ///
    /// * `primary` - Read-write connection
    /// * `replica` - Read-only connection; may point at the same server as `primary`
    ///
    /// # Optional Fields
    ///
    /// * `prefix` - Key prefix (default: fixed `DEV|SE|`)
    /// * `read_fallback` - Read routing policy (default: [`ReadFallback::OnError`])
    /// * `metrics` - Metrics collector to report into (default: a fresh one)
    #[builder]
    pub fn new(
        primary: C,
        replica: C,
        #[builder(default)] prefix: KeyPrefix,
        #[builder(default)] read_fallback: ReadFallback,
        #[builder(default)] metrics: KeyspaceMetrics,
    ) -> Self {
        if primary.role() == replica.role() {
            warn!(
                role = %primary.role(),
                "keyspace client built from two connections with the same role"
            );
        }

        Self {
            primary: Arc::new(primary),
            replica: Arc::new(replica),
            prefix,
            read_fallback,
            metrics,
        }
    }
}

impl<C: KeyspaceConnection> KeyspaceClient<C> {
    /// Returns the primary connection.
    #[must_use]
    pub fn primary(&self) -> &C {
        &self.primary
    }

    /// Returns the replica connection.
    #[must_use]
    pub fn replica(&self) -> &C {
        &self.replica
    }

    /// Returns the prefix source.
    #[must_use]
    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// Returns the read routing policy.
    #[must_use]
    pub fn read_fallback(&self) -> ReadFallback {
        self.read_fallback
    }

    /// Returns the metrics collector.
    #[must_use]
    pub fn metrics(&self) -> &KeyspaceMetrics {
        &self.metrics
    }

    /// Returns `key` as it is stored, with the prefix currently in effect.
    #[must_use]
    pub fn prefixed(&self, key: &str) -> String {
        self.prefix.apply(key)
    }

    /// Stores `value` under `key` on the primary.
    ///
    /// `ttl_secs > 0` writes an expiring entry; `0` writes a persistent one and
    /// clears any previous expiry.
    #[tracing::instrument(skip(self, value))]
    pub async fn set_key(&self, key: &str, value: &str, ttl_secs: u64) -> KeyspaceResult<()> {
        let prefixed = self.prefixed(key);
        let result = if ttl_secs > 0 {
            self.write(self.primary.set_ex(&prefixed, value, ttl_secs)).await
        } else {
            self.write(self.primary.set(&prefixed, value)).await
        };
        result.map_err(|e| self.fail("set_key", key, e))
    }

    /// Reads the string at `key`. `Ok(None)` when the key does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_key(&self, key: &str) -> KeyspaceResult<Option<String>> {
        let prefixed = self.prefixed(key);
        self.fallback_read("get_key", key, |conn| conn.get(&prefixed))
            .await
            .map_err(|e| self.fail("get_key", key, e))
    }

    /// Lists logical keys matching the glob `pattern` under the active prefix.
    ///
    /// The prefix is matched literally and stripped from the returned keys,
    /// so each entry can be passed straight back to the other operations.
    #[tracing::instrument(skip(self))]
    pub async fn keys(&self, pattern: &str) -> KeyspaceResult<Vec<String>> {
        let active = self.prefix.resolve();
        let scoped = format!("{}{pattern}", glob::escape(&active));
        let stored = self
            .fallback_read("keys", pattern, |conn| conn.keys(&scoped))
            .await
            .map_err(|e| self.fail("keys", pattern, e))?;

        Ok(stored.iter().map(|key| prefix::strip(&active, key).to_owned()).collect())
    }

    /// Deletes `pattern` from the primary and returns the number of keys removed.
    ///
    /// A pattern with glob metacharacters is resolved first (reading the
    /// replica, then the primary), every match is deleted individually, and
    /// finally the prefixed pattern itself is deleted in case a key carries
    /// those characters literally. Anything else is deleted as a single key.
    #[tracing::instrument(skip(self))]
    pub async fn del_key(&self, pattern: &str) -> KeyspaceResult<u64> {
        let active = self.prefix.resolve();
        let prefixed = format!("{active}{pattern}");

        let result = async {
            let mut removed = 0;
            if glob::has_wildcard(pattern) {
                let scoped = format!("{}{pattern}", glob::escape(&active));
                let matches =
                    self.fallback_read("del_key", pattern, |conn| conn.keys(&scoped)).await?;
                debug!(pattern, matches = matches.len(), "resolved pattern for deletion");
                for stored in &matches {
                    removed += self.write(self.primary.del(stored)).await?;
                }
            }
            removed += self.write(self.primary.del(&prefixed)).await?;
            Ok(removed)
        }
        .await;

        result.map_err(|e| self.fail("del_key", pattern, e))
    }

    /// Prepends `value` to the list at `key`. Returns the new length.
    #[tracing::instrument(skip(self, value))]
    pub async fn l_push_key(&self, key: &str, value: &str) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.write(self.primary.lpush(&prefixed, value))
            .await
            .map_err(|e| self.fail("l_push_key", key, e))
    }

    /// Removes up to `count` occurrences of `value` from the list at `key`.
    ///
    /// Positive `count` scans from the head, negative from the tail, and `0`
    /// removes every occurrence. Returns the number removed.
    #[tracing::instrument(skip(self, value))]
    pub async fn l_rem_key(&self, key: &str, count: i64, value: &str) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.write(self.primary.lrem(&prefixed, count, value))
            .await
            .map_err(|e| self.fail("l_rem_key", key, e))
    }

    /// Returns list elements `start..=stop` (negative indexes count from the tail).
    #[tracing::instrument(skip(self))]
    pub async fn l_range_key(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> KeyspaceResult<Vec<String>> {
        let prefixed = self.prefixed(key);
        self.fallback_read("l_range_key", key, |conn| conn.lrange(&prefixed, start, stop))
            .await
            .map_err(|e| self.fail("l_range_key", key, e))
    }

    /// Increments the counter at `key` and returns the new value.
    ///
    /// `Some(n)` with `n != 0` adds `n`; `None` or `Some(0)` adds one.
    #[tracing::instrument(skip(self))]
    pub async fn increment_key(&self, key: &str, amount: Option<i64>) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.write(self.primary.incr_by(&prefixed, unit_or(amount)))
            .await
            .map_err(|e| self.fail("increment_key", key, e))
    }

    /// Decrements the counter at `key` and returns the new value.
    ///
    /// `Some(n)` with `n != 0` subtracts `n`; `None` or `Some(0)` subtracts one.
    #[tracing::instrument(skip(self))]
    pub async fn decrement_key(&self, key: &str, amount: Option<i64>) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.write(self.primary.decr_by(&prefixed, unit_or(amount)))
            .await
            .map_err(|e| self.fail("decrement_key", key, e))
    }

    /// Sets `field` of the hash at `key`. Returns 1 if the field is new.
    #[tracing::instrument(skip(self, value))]
    pub async fn h_set_key(
        &self,
        key: &str,
        field: &str,
        value: impl fmt::Display,
    ) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        let value = value.to_string();
        self.write(self.primary.hset(&prefixed, field, &value))
            .await
            .map_err(|e| self.fail("h_set_key", key, e))
    }

    /// Adds `amount` to the integer `field` of the hash at `key`.
    #[tracing::instrument(skip(self))]
    pub async fn h_incrby_key(&self, key: &str, field: &str, amount: i64) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.write(self.primary.hincrby(&prefixed, field, amount))
            .await
            .map_err(|e| self.fail("h_incrby_key", key, e))
    }

    /// Deletes `field` from the hash at `key`. Returns the number of fields removed.
    #[tracing::instrument(skip(self))]
    pub async fn h_del_key(&self, key: &str, field: &str) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.write(self.primary.hdel(&prefixed, field))
            .await
            .map_err(|e| self.fail("h_del_key", key, e))
    }

    /// Returns every field of the hash at `key`; empty when the key does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn h_getall_key(&self, key: &str) -> KeyspaceResult<HashMap<String, String>> {
        let prefixed = self.prefixed(key);
        self.fallback_read("h_getall_key", key, |conn| conn.hgetall(&prefixed))
            .await
            .map_err(|e| self.fail("h_getall_key", key, e))
    }

    /// Returns the remaining time-to-live of `key` in seconds.
    ///
    /// `-2` when the key does not exist, `-1` when it never expires.
    #[tracing::instrument(skip(self))]
    pub async fn ttl_key(&self, key: &str) -> KeyspaceResult<i64> {
        let prefixed = self.prefixed(key);
        self.fallback_read("ttl_key", key, |conn| conn.ttl(&prefixed))
            .await
            .map_err(|e| self.fail("ttl_key", key, e))
    }

    /// Pings both connections and reports the pair's health.
    ///
    /// A replica outage only degrades the client since reads fall back to
    /// the primary; a primary outage makes it unhealthy.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self, probe: HealthProbe) -> HealthReport {
        self.metrics.record_health_check();
        let started = Instant::now();

        let (primary, replica) = if probe == HealthProbe::Liveness {
            (RoleHealth::Unchecked, RoleHealth::Unchecked)
        } else {
            let (primary, replica) =
                tokio::join!(timed_ping(self.primary.as_ref()), timed_ping(self.replica.as_ref()));
            (RoleHealth::from_ping(primary), RoleHealth::from_ping(replica))
        };

        let report = HealthReport {
            probe,
            backend: self.primary.backend(),
            check_duration: started.elapsed(),
            primary,
            replica,
        };

        match (report.status(), report.failure()) {
            (HealthStatus::Unhealthy, Some((role, e))) => {
                error!(%probe, %role, error = %e, "connection failed health check");
            },
            (HealthStatus::Degraded, Some((role, e))) => {
                warn!(%probe, %role, error = %e, "connection failed health check");
            },
            _ => {},
        }
        report
    }

    /// Shuts the client down, releasing this handle's share of both connections.
    ///
    /// Connections close once every clone has been closed or dropped.
    pub fn close(self) {
        info!(
            primary = %self.primary.role(),
            replica = %self.replica.role(),
            clones = Arc::strong_count(&self.primary).saturating_sub(1),
            "closing keyspace client"
        );
    }

    /// Runs a read against the replica first, then the primary, per the policy.
    ///
    /// Which replica errors are retried on the primary is up to the policy;
    /// see [`ReadFallback::retries_error`].
    async fn fallback_read<'a, T, F, Fut>(
        &'a self,
        operation: &'static str,
        subject: &str,
        read: F,
    ) -> KeyspaceResult<T>
    where
        T: EmptyReply,
        F: Fn(&'a C) -> Fut,
        Fut: Future<Output = KeyspaceResult<T>>,
    {
        if self.read_fallback.uses_replica() {
            let started = Instant::now();
            match read(self.replica.as_ref()).await {
                Ok(reply) if !(self.read_fallback.retries_empty() && reply.is_empty_reply()) => {
                    self.metrics.record_replica_read(started.elapsed());
                    return Ok(reply);
                },
                Ok(_) => {
                    self.metrics.record_replica_read(started.elapsed());
                    self.metrics.record_empty_fallback();
                    debug!(operation, key = subject, "replica returned no data, reading primary");
                },
                Err(e) if self.read_fallback.retries_error(&e) => {
                    self.metrics.record_error_fallback();
                    warn!(
                        operation,
                        key = subject,
                        error = %e,
                        "replica read failed, reading primary"
                    );
                },
                Err(e) => return Err(e),
            }
        }

        let started = Instant::now();
        let reply = read(self.primary.as_ref()).await?;
        self.metrics.record_primary_read(started.elapsed());
        Ok(reply)
    }

    /// Awaits a primary write and records its latency on success.
    async fn write<T>(
        &self,
        command: impl Future<Output = KeyspaceResult<T>>,
    ) -> KeyspaceResult<T> {
        let started = Instant::now();
        let result = command.await;
        if result.is_ok() {
            self.metrics.record_write(started.elapsed());
        }
        result
    }

    /// Logs a failed operation and counts it before handing the error back.
    fn fail(
        &self,
        operation: &'static str,
        subject: &str,
        error: KeyspaceError,
    ) -> KeyspaceError {
        self.metrics.record_error(&error);
        error!(operation, key = subject, error = %error, "keyspace operation failed");
        error
    }
}

fn unit_or(amount: Option<i64>) -> i64 {
    match amount {
        Some(delta) if delta != 0 => delta,
        _ => 1,
    }
}

async fn timed_ping<C: KeyspaceConnection + ?Sized>(
    conn: &C,
) -> KeyspaceResult<std::time::Duration> {
    let started = Instant::now();
    conn.ping().await?;
    Ok(started.elapsed())
}
