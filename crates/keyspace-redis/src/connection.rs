//! Redis-backed keyspace connection.
//!
//! This module provides [`RedisConnection`], which implements the
//! [`KeyspaceConnection`](keyspace_common::KeyspaceConnection) trait on top
//! of a redis-rs [`ConnectionManager`].

use std::{collections::HashMap, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use keyspace_common::{ConnectionRole, KeyspaceConnection, KeyspaceResult};
use redis::{
    Client, Cmd, FromRedisValue, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::{
    config::RedisKeyspaceConfig,
    error::{RedisKeyspaceError, Result},
};

/// First reconnect delay in milliseconds, doubled on each attempt.
const RECONNECT_FACTOR_MS: u64 = 100;

/// Upper bound on a single reconnect delay in milliseconds.
const RECONNECT_MAX_DELAY_MS: u64 = 1_000;

/// A single Redis server acting as primary or replica.
///
/// The underlying [`ConnectionManager`] is established lazily. If the server
/// is unreachable when the connection is opened, the failure is logged and
/// the next command tries again. Each attempt to establish it is bounded by
/// the connect timeout, so a down server costs a command at most that long.
/// Once established, the manager reconnects on its own after the connection
/// drops, up to `reconnect_attempts` times.
///
/// # Thread Safety
///
/// `RedisConnection` is `Send + Sync` and cheap to clone. Clones share the
/// same manager, which multiplexes commands over one socket.
#[derive(Clone)]
pub struct RedisConnection {
    role: ConnectionRole,

    /// Server address without credentials, for logs.
    address: String,

    client: Client,

    connect_timeout: Duration,

    response_timeout: Duration,

    reconnect_attempts: usize,

    manager: Arc<OnceCell<ConnectionManager>>,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("role", &self.role)
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl RedisConnection {
    /// Opens the connection for `role` using the matching host in `config`.
    ///
    /// Failing to reach the server is not an error here: it is logged and
    /// retried by the first command.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or cannot be turned
    /// into a Redis address.
    pub async fn open(config: &RedisKeyspaceConfig, role: ConnectionRole) -> Result<Self> {
        config.validate()?;

        let host = match role {
            ConnectionRole::Primary => config.host(),
            ConnectionRole::Replica => config.replica_host(),
        };
        let client = Client::open(config.connection_info(host)?)?;

        let connection = Self {
            role,
            address: format!("{host}:{}", config.port()),
            client,
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
            reconnect_attempts: config.reconnect_attempts(),
            manager: Arc::new(OnceCell::new()),
        };

        match connection.manager().await {
            Ok(_) => info!(%role, address = %connection.address, "connected to redis server"),
            Err(e) => error!(
                %role,
                address = %connection.address,
                error = %e,
                "failed to connect to redis server, will retry on next command"
            ),
        }

        Ok(connection)
    }

    /// Returns the server address, without credentials.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns `true` once the connection manager has been established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }

    /// Returns the connection manager, establishing it if needed.
    async fn manager(&self) -> std::result::Result<ConnectionManager, RedisKeyspaceError> {
        let manager = self.manager.get_or_try_init(|| self.establish()).await?;
        Ok(manager.clone())
    }

    /// Builds a manager, giving up once the connect timeout has elapsed even
    /// if reconnect attempts remain.
    async fn establish(&self) -> std::result::Result<ConnectionManager, RedisKeyspaceError> {
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(self.connect_timeout)
            .set_response_timeout(self.response_timeout)
            .set_number_of_retries(self.reconnect_attempts)
            .set_exponent_base(2)
            .set_factor(RECONNECT_FACTOR_MS)
            .set_max_delay(RECONNECT_MAX_DELAY_MS);

        let connecting = ConnectionManager::new_with_config(self.client.clone(), config);
        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(manager) => Ok(manager?),
            Err(_) => Err(RedisError::from(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no connection to {} within {:?}", self.address, self.connect_timeout),
            ))
            .into()),
        }
    }

    /// Runs `cmd` against `key` and decodes the reply.
    async fn query<T: FromRedisValue>(&self, key: &str, cmd: &Cmd) -> KeyspaceResult<T> {
        let mut manager = self.manager().await?;
        let reply = cmd.query_async(&mut manager).await.map_err(RedisKeyspaceError::on_key(key))?;
        Ok(reply)
    }
}

#[async_trait]
impl KeyspaceConnection for RedisConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>> {
        self.query(key, redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> KeyspaceResult<()> {
        self.query(key, redis::cmd("SET").arg(key).arg(value)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KeyspaceResult<()> {
        self.query(key, redis::cmd("SETEX").arg(key).arg(ttl_secs).arg(value)).await
    }

    async fn keys(&self, pattern: &str) -> KeyspaceResult<Vec<String>> {
        self.query(pattern, redis::cmd("KEYS").arg(pattern)).await
    }

    async fn del(&self, key: &str) -> KeyspaceResult<u64> {
        self.query(key, redis::cmd("DEL").arg(key)).await
    }

    async fn lpush(&self, key: &str, value: &str) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("LPUSH").arg(key).arg(value)).await
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("LREM").arg(key).arg(count).arg(value)).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KeyspaceResult<Vec<String>> {
        self.query(key, redis::cmd("LRANGE").arg(key).arg(start).arg(stop)).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("INCRBY").arg(key).arg(delta)).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("DECRBY").arg(key).arg(delta)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("HSET").arg(key).arg(field).arg(value)).await
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("HINCRBY").arg(key).arg(field).arg(delta)).await
    }

    async fn hdel(&self, key: &str, field: &str) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("HDEL").arg(key).arg(field)).await
    }

    async fn hgetall(&self, key: &str) -> KeyspaceResult<HashMap<String, String>> {
        self.query(key, redis::cmd("HGETALL").arg(key)).await
    }

    async fn ttl(&self, key: &str) -> KeyspaceResult<i64> {
        self.query(key, redis::cmd("TTL").arg(key)).await
    }

    async fn ping(&self) -> KeyspaceResult<()> {
        let mut manager = self.manager().await?;
        let _: String =
            redis::cmd("PING").query_async(&mut manager).await.map_err(RedisKeyspaceError::from)?;
        Ok(())
    }
}
