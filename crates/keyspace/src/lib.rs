//! Prefixed, primary/replica-aware key-value access for backend services.
//!
//! This crate provides [`KeyspaceClient`], the single owner of a process's
//! connections to the shared key-value store. It namespaces every key with a
//! configurable prefix, sends every write to the primary, and serves reads
//! from a replica with a fallback to the primary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! │        (sessions, rate counters, cached lookups, ...)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   KeyspaceClient                            │
//! │   key prefix │ read fallback │ logging │ metrics │ health   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │     primary connection       │      replica connection      │
//! │        (read + write)        │     (read, best-effort)      │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │               KeyspaceConnection trait                      │
//! ├──────────────────┬──────────────────────────────────────────┤
//! │ MemoryConnection │  RedisConnection (keyspace-common-redis) │
//! │    (testing)     │             (production)                 │
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use keyspace_common::{ConnectionRole, KeyspaceClient, MemoryConnection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let primary = MemoryConnection::new(ConnectionRole::Primary);
//!     let replica = primary.with_role(ConnectionRole::Replica);
//!     let client = KeyspaceClient::builder().primary(primary).replica(replica).build();
//!
//!     client.set_key("greeting", "hello", 60).await?;
//!     assert_eq!(client.get_key("greeting").await?.as_deref(), Some("hello"));
//!
//!     client.increment_key("visits", None).await?;
//!     assert_eq!(client.increment_key("visits", Some(5)).await?, 6);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Every operation returns [`KeyspaceResult<T>`]. Failures are logged with
//! the operation name and key, counted in [`KeyspaceMetrics`], and returned
//! unchanged. Nothing is retried except the replica-to-primary read fallback.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with client factories over [`MemoryConnection`]
//!   pairs and assertion macros.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod connection;
pub mod error;
pub mod fallback;
pub mod glob;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod prefix;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use client::KeyspaceClient;
pub use connection::{ConnectionRole, KeyspaceConnection};
pub use error::{BoxError, KeyspaceError, KeyspaceResult};
pub use fallback::{EmptyReply, ReadFallback};
pub use health::{HealthProbe, HealthReport, HealthStatus, RoleHealth};
pub use memory::MemoryConnection;
pub use metrics::{KeyspaceMetrics, KeyspaceMetricsSnapshot};
pub use prefix::{DEFAULT_KEY_PREFIX, KeyPrefix};
