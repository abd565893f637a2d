//! Redis-backed connections for [`keyspace_common`].
//!
//! This crate provides [`RedisConnection`], a
//! [`KeyspaceConnection`](keyspace_common::KeyspaceConnection) over a redis-rs
//! [`ConnectionManager`](redis::aio::ConnectionManager), plus
//! [`RedisKeyspaceConfig`] for describing the primary/replica pair and
//! [`connect`] for wiring both into a
//! [`KeyspaceClient`](keyspace_common::KeyspaceClient).
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a running Redis server.
//! use keyspace_common_redis::{RedisKeyspaceConfig, connect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // COMMON_REDIS_HOST, COMMON_REDIS_PORT, COMMON_REDIS_REPLICA_HOST, ...
//!     let config = RedisKeyspaceConfig::from_env()?;
//!     let client = connect(&config).await?;
//!
//!     client.set_key("session:42", "alice", 3600).await?;
//!     let owner = client.get_key("session:42").await?;
//!     assert_eq!(owner.as_deref(), Some("alice"));
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Environment
//!
//! | Variable | Default |
//! | -------- | ------- |
//! | `COMMON_REDIS_HOST` | `localhost` |
//! | `COMMON_REDIS_PORT` | `6379` |
//! | `COMMON_REDIS_USERNAME` | none |
//! | `COMMON_REDIS_PASSWORD` | none |
//! | `COMMON_REDIS_ENABLE_TLS` | `false` |
//! | `COMMON_REDIS_REPLICA_HOST` | the primary host |
//! | `COMMON_REDIS_KEYS_PREFIX` | `DEV\|SE\|`, read on every operation |
//! | `COMMON_REDIS_READ_FALLBACK` | `on_error` |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;

use keyspace_common::{ConnectionRole, KeyspaceClient};
use tracing::info;

/// Configuration types and environment variable names.
pub use config::{
    ENV_ENABLE_TLS, ENV_HOST, ENV_KEYS_PREFIX, ENV_PASSWORD, ENV_PORT, ENV_READ_FALLBACK,
    ENV_REPLICA_HOST, ENV_USERNAME, RedisKeyspaceConfig,
};
/// Redis-backed keyspace connection.
pub use connection::RedisConnection;
/// Redis-specific error types and result alias.
pub use error::{RedisKeyspaceError, Result};

/// Opens the primary and replica connections described by `config` and
/// returns a client over them.
///
/// The key prefix is read from `COMMON_REDIS_KEYS_PREFIX` on every
/// operation. Unreachable servers are logged, not fatal; see
/// [`RedisConnection::open`].
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub async fn connect(config: &RedisKeyspaceConfig) -> Result<KeyspaceClient<RedisConnection>> {
    let (primary, replica) = tokio::join!(
        RedisConnection::open(config, ConnectionRole::Primary),
        RedisConnection::open(config, ConnectionRole::Replica),
    );
    let (primary, replica) = (primary?, replica?);

    info!(
        primary = primary.address(),
        replica = replica.address(),
        read_fallback = %config.read_fallback(),
        "keyspace client ready"
    );

    Ok(KeyspaceClient::builder()
        .primary(primary)
        .replica(replica)
        .prefix(RedisKeyspaceConfig::key_prefix())
        .read_fallback(config.read_fallback())
        .build())
}

/// Loads [`RedisKeyspaceConfig::from_env`] and [`connect`]s with it.
///
/// # Errors
///
/// Returns an error if the environment does not describe a valid configuration.
pub async fn connect_from_env() -> Result<KeyspaceClient<RedisConnection>> {
    connect(&RedisKeyspaceConfig::from_env()?).await
}
