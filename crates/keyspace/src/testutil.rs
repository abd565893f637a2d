//! Shared test utilities for keyspace testing.
//!
//! Helpers for building [`KeyspaceClient`]s over [`MemoryConnection`] pairs
//! and asserting on [`KeyspaceResult`](crate::KeyspaceResult) values. Gated
//! behind the `testutil` feature so it never leaks into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! keyspace-common = { path = "../keyspace", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use keyspace_common::testutil::{mirrored_client, make_key};
//! ```

use crate::{
    ConnectionRole, KeyPrefix, KeyspaceClient, MemoryConnection, ReadFallback,
    connection::KeyspaceConnection,
};

/// Prefix used by the helper clients.
pub const TEST_PREFIX: &str = "TEST|";

/// Create a deterministic logical key from a namespace and index.
///
/// Produces keys like `"user:000042"`; zero-padding keeps lexicographic and
/// numeric order aligned.
#[must_use]
pub fn make_key(namespace: &str, idx: usize) -> String {
    format!("{namespace}:{idx:06}")
}

/// A primary and a replica handle over the same data, like a replica that
/// is fully caught up.
#[must_use]
pub fn mirrored_pair() -> (MemoryConnection, MemoryConnection) {
    let primary = MemoryConnection::new(ConnectionRole::Primary);
    let replica = primary.with_role(ConnectionRole::Replica);
    (primary, replica)
}

/// A primary and a replica over separate data, like a replica that has not
/// received any writes yet.
#[must_use]
pub fn lagging_pair() -> (MemoryConnection, MemoryConnection) {
    (MemoryConnection::new(ConnectionRole::Primary), MemoryConnection::new(ConnectionRole::Replica))
}

/// Builds a client over `primary`/`replica` with [`TEST_PREFIX`] and `fallback`.
#[must_use]
pub fn client_over<C: KeyspaceConnection>(
    primary: C,
    replica: C,
    fallback: ReadFallback,
) -> KeyspaceClient<C> {
    KeyspaceClient::builder()
        .primary(primary)
        .replica(replica)
        .prefix(KeyPrefix::fixed(TEST_PREFIX))
        .read_fallback(fallback)
        .build()
}

/// A client over a [`mirrored_pair`] using `fallback`.
#[must_use]
pub fn mirrored_client(fallback: ReadFallback) -> KeyspaceClient<MemoryConnection> {
    let (primary, replica) = mirrored_pair();
    client_over(primary, replica, fallback)
}

/// A client over a [`lagging_pair`] using `fallback`.
#[must_use]
pub fn lagging_client(fallback: ReadFallback) -> KeyspaceClient<MemoryConnection> {
    let (primary, replica) = lagging_pair();
    client_over(primary, replica, fallback)
}

/// Assert that a [`KeyspaceResult`](crate::KeyspaceResult) failed with a connectivity error.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use keyspace_common::{assert_connection_error, KeyspaceError, KeyspaceResult};
///
/// let result: KeyspaceResult<()> = Err(KeyspaceError::connection("down"));
/// assert_connection_error!(result);
/// ```
#[macro_export]
macro_rules! assert_connection_error {
    ($result:expr) => {
        assert!(
            matches!(&$result, Err(e) if e.is_connection()),
            "expected a connection error, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!(&$result, Err(e) if e.is_connection()),
            "{}: expected a connection error, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`KeyspaceResult`](crate::KeyspaceResult) failed with
/// [`KeyspaceError::WrongType`](crate::KeyspaceError::WrongType).
#[macro_export]
macro_rules! assert_wrong_type {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::KeyspaceError::WrongType { .. })),
            "expected KeyspaceError::WrongType, got: {:?}",
            $result,
        );
    };
}
