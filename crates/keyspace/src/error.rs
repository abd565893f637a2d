//! Keyspace error types and result alias.
//!
//! Every [`KeyspaceConnection`](crate::KeyspaceConnection) implementation maps
//! its client-specific failures onto [`KeyspaceError`], so the
//! [`KeyspaceClient`](crate::KeyspaceClient) can log and classify them
//! uniformly before handing them back to the caller.
//!
//! # Error Types
//!
//! - [`KeyspaceError::Connection`] - The store could not be reached or the session dropped
//! - [`KeyspaceError::Timeout`] - The store did not answer in time
//! - [`KeyspaceError::Unavailable`] - The server is up but cannot serve yet (loading, resyncing)
//! - [`KeyspaceError::WrongType`] - The key holds a different data structure
//! - [`KeyspaceError::Command`] - The store rejected the command
//! - [`KeyspaceError::Config`] - Connection configuration is invalid
//!
//! # Example
//!
//! ```
//! use keyspace_common::{KeyspaceError, KeyspaceResult};
//!
//! fn read(key: &str) -> KeyspaceResult<String> {
//!     Err(KeyspaceError::connection(format!("replica unreachable while reading {key}")))
//! }
//!
//! assert!(read("session:1").unwrap_err().is_connection());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for keyspace operations.
pub type KeyspaceResult<T> = Result<T, KeyspaceError>;

/// Errors that can occur while talking to the key-value store.
///
/// Errors preserve their source chain via the `#[source]` attribute, so the
/// full client error is still available to callers that need it.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KeyspaceError {
    /// Connection or network error.
    ///
    /// Raised when the session cannot be established (refused, DNS, TLS
    /// handshake) or was dropped mid-command.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The store did not respond within the client's timeout.
    #[error("Operation timeout")]
    Timeout,

    /// The server answered but is not ready to serve data.
    ///
    /// Raised for replies such as `LOADING`, `MASTERDOWN` or `TRYAGAIN`,
    /// which another server in the pair may not share.
    #[error("Server unavailable: {message}")]
    Unavailable {
        /// Description of the server state.
        message: String,
        /// The underlying error reported by the client.
        #[source]
        source: Option<BoxError>,
    },

    /// The command was issued against a key holding another data type.
    #[error("Wrong type for key: {key}")]
    WrongType {
        /// The prefixed key the command targeted.
        key: String,
    },

    /// The store rejected or failed the command.
    #[error("Command error: {message}")]
    Command {
        /// Description of the command failure.
        message: String,
        /// The underlying error reported by the client.
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration could not be turned into a working connection.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },
}

impl KeyspaceError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Unavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into(), source: None }
    }

    /// Creates a new `Unavailable` error with a message and source error.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `WrongType` error for the given key.
    #[must_use]
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }

    /// Creates a new `Command` error with the given message.
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command { message: message.into(), source: None }
    }

    /// Creates a new `Command` error with a message and source error.
    #[must_use]
    pub fn command_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Command { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Returns `true` if the error means the server could not serve the command.
    ///
    /// Timeouts and servers that are still loading or resyncing count as
    /// connectivity failures; a command the server rejected does not.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout | Self::Unavailable { .. })
    }
}
