//! Configuration for the Redis keyspace connections.
//!
//! This module provides [`RedisKeyspaceConfig`], which describes where the
//! primary and replica servers live and how to authenticate against them.
//! It can be built in code, deserialized, or read from `COMMON_REDIS_*`
//! environment variables.

use std::time::Duration;

use keyspace_common::{DEFAULT_KEY_PREFIX, KeyPrefix, ReadFallback};
use redis::{ConnectionInfo, IntoConnectionInfo};
use serde::{Deserialize, Serialize};

use crate::error::{RedisKeyspaceError, Result};

/// Environment variable holding the primary host.
pub const ENV_HOST: &str = "COMMON_REDIS_HOST";
/// Environment variable holding the port shared by primary and replica.
pub const ENV_PORT: &str = "COMMON_REDIS_PORT";
/// Environment variable holding the ACL username.
pub const ENV_USERNAME: &str = "COMMON_REDIS_USERNAME";
/// Environment variable holding the password.
pub const ENV_PASSWORD: &str = "COMMON_REDIS_PASSWORD";
/// Environment variable switching TLS (`rediss://`) on.
pub const ENV_ENABLE_TLS: &str = "COMMON_REDIS_ENABLE_TLS";
/// Environment variable holding the replica host.
pub const ENV_REPLICA_HOST: &str = "COMMON_REDIS_REPLICA_HOST";
/// Environment variable holding the key prefix. Read on every operation.
pub const ENV_KEYS_PREFIX: &str = "COMMON_REDIS_KEYS_PREFIX";
/// Environment variable selecting the [`ReadFallback`] policy.
pub const ENV_READ_FALLBACK: &str = "COMMON_REDIS_READ_FALLBACK";

/// Default host.
const DEFAULT_HOST: &str = "localhost";

/// Default port.
const DEFAULT_PORT: u16 = 6379;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default response timeout (30 seconds).
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of reconnect attempts after an established connection drops.
const DEFAULT_RECONNECT_ATTEMPTS: usize = 0;

/// Configuration for a primary/replica pair of
/// [`RedisConnection`](crate::RedisConnection)s.
///
/// Both servers share the port and credentials; only the host differs.
/// When no replica host is given, reads go to a second connection on the
/// primary host.
///
/// # Example
///
/// ```
/// use keyspace_common_redis::RedisKeyspaceConfig;
///
/// let config = RedisKeyspaceConfig::builder()
///     .host("cache.internal")
///     .replica_host("cache-ro.internal")
///     .enable_tls(true)
///     .build()?;
///
/// assert_eq!(config.primary_url(), "rediss://cache.internal:6379");
/// assert_eq!(config.replica_url(), "rediss://cache-ro.internal:6379");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisKeyspaceConfig {
    /// Primary host name or address.
    #[serde(default = "default_host")]
    pub(crate) host: String,

    /// Port for both servers.
    #[serde(default = "default_port")]
    pub(crate) port: u16,

    /// ACL username.
    #[serde(default)]
    pub(crate) username: Option<String>,

    /// Password.
    #[serde(default)]
    pub(crate) password: Option<String>,

    /// Use `rediss://` instead of `redis://`.
    #[serde(default)]
    pub(crate) enable_tls: bool,

    /// Replica host; `None` means the primary host.
    #[serde(default)]
    pub(crate) replica_host: Option<String>,

    /// Read routing policy.
    #[serde(default)]
    pub(crate) read_fallback: ReadFallback,

    /// Connection timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Response timeout.
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub(crate) response_timeout: Duration,

    /// Reconnect attempts after an established connection drops.
    #[serde(default = "default_reconnect_attempts")]
    pub(crate) reconnect_attempts: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_response_timeout() -> Duration {
    DEFAULT_RESPONSE_TIMEOUT
}

fn default_reconnect_attempts() -> usize {
    DEFAULT_RECONNECT_ATTEMPTS
}

#[bon::bon]
impl RedisKeyspaceConfig {
    /// Creates a new configuration, validating the address.
    ///
    /// # Optional Fields
    ///
    /// * `host` - Primary host (default: `localhost`).
    /// * `port` - Port for both servers (default: 6379).
    /// * `username` / `password` - Credentials (default: none).
    /// * `enable_tls` - Connect with `rediss://` (default: false).
    /// * `replica_host` - Replica host (default: the primary host).
    /// * `read_fallback` - Read routing policy (default: [`ReadFallback::OnError`]).
    /// * `connect_timeout` - Connection timeout (default: 5 seconds).
    /// * `response_timeout` - Response timeout (default: 30 seconds).
    /// * `reconnect_attempts` - Reconnect attempts after a drop, 1s apart at most (default: 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the host or replica host is empty, or the port is 0.
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_HOST.to_owned())] host: String,
        #[builder(default = DEFAULT_PORT)] port: u16,
        #[builder(into)] username: Option<String>,
        #[builder(into)] password: Option<String>,
        #[builder(default)] enable_tls: bool,
        #[builder(into)] replica_host: Option<String>,
        #[builder(default)] read_fallback: ReadFallback,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_RESPONSE_TIMEOUT)] response_timeout: Duration,
        #[builder(default = DEFAULT_RECONNECT_ATTEMPTS)] reconnect_attempts: usize,
    ) -> Result<Self> {
        let config = Self {
            host,
            port,
            username,
            password,
            enable_tls,
            replica_host,
            read_fallback,
            connect_timeout,
            response_timeout,
            reconnect_attempts,
        };
        config.validate()?;
        Ok(config)
    }
}

impl RedisKeyspaceConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid or
    /// `COMMON_REDIS_READ_FALLBACK` names an unknown policy.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps an environment
    /// variable name to its value.
    ///
    /// Empty values count as unset. Unparseable ports and TLS flags fall back
    /// to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid or
    /// `COMMON_REDIS_READ_FALLBACK` names an unknown policy.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let read_fallback = match var(ENV_READ_FALLBACK) {
            Some(raw) => raw.parse::<ReadFallback>().map_err(|_| {
                RedisKeyspaceError::Config(format!("{ENV_READ_FALLBACK}: unknown policy '{raw}'"))
            })?,
            None => ReadFallback::default(),
        };

        Self::builder()
            .host(var(ENV_HOST).unwrap_or_else(default_host))
            .port(var(ENV_PORT).and_then(|raw| raw.trim().parse().ok()).unwrap_or(DEFAULT_PORT))
            .maybe_username(var(ENV_USERNAME))
            .maybe_password(var(ENV_PASSWORD))
            .enable_tls(var(ENV_ENABLE_TLS).is_some_and(|raw| parse_flag(&raw)))
            .maybe_replica_host(var(ENV_REPLICA_HOST))
            .read_fallback(read_fallback)
            .build()
    }

    /// Returns the primary host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the username if configured.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns whether TLS is enabled.
    #[must_use]
    pub fn enable_tls(&self) -> bool {
        self.enable_tls
    }

    /// Returns the replica host, which is the primary host unless overridden.
    #[must_use]
    pub fn replica_host(&self) -> &str {
        self.replica_host.as_deref().unwrap_or(&self.host)
    }

    /// Returns the read routing policy.
    #[must_use]
    pub fn read_fallback(&self) -> ReadFallback {
        self.read_fallback
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the response timeout.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Returns the number of reconnect attempts.
    #[must_use]
    pub fn reconnect_attempts(&self) -> usize {
        self.reconnect_attempts
    }

    /// Returns the primary URL, without credentials.
    #[must_use]
    pub fn primary_url(&self) -> String {
        self.url_for(&self.host)
    }

    /// Returns the replica URL, without credentials.
    #[must_use]
    pub fn replica_url(&self) -> String {
        self.url_for(self.replica_host())
    }

    /// Returns the key prefix read from `COMMON_REDIS_KEYS_PREFIX` on every call.
    #[must_use]
    pub fn key_prefix() -> KeyPrefix {
        KeyPrefix::from_env(ENV_KEYS_PREFIX, DEFAULT_KEY_PREFIX)
    }

    /// Builds the redis-rs connection info for `host`, credentials included.
    pub(crate) fn connection_info(&self, host: &str) -> Result<ConnectionInfo> {
        let mut info = self.url_for(host).into_connection_info()?;
        info.redis.username.clone_from(&self.username);
        info.redis.password.clone_from(&self.password);
        Ok(info)
    }

    fn url_for(&self, host: &str) -> String {
        let scheme = if self.enable_tls { "rediss" } else { "redis" };
        format!("{scheme}://{host}:{}", self.port)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RedisKeyspaceError::Config("host cannot be empty".into()));
        }

        if self.replica_host.as_deref().is_some_and(|host| host.trim().is_empty()) {
            return Err(RedisKeyspaceError::Config("replica_host cannot be empty".into()));
        }

        if self.port == 0 {
            return Err(RedisKeyspaceError::Config("port cannot be 0".into()));
        }

        Ok(())
    }
}

impl std::fmt::Debug for RedisKeyspaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKeyspaceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("enable_tls", &self.enable_tls)
            .field("replica_host", &self.replica_host)
            .field("read_fallback", &self.read_fallback)
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .finish()
    }
}

/// `true`/`false` in any case; anything else is treated as unset.
fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}
