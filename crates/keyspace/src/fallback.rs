//! Read routing between the replica and the primary.
//!
//! Reads prefer the replica to offload the primary. [`ReadFallback`] decides
//! when a replica answer is accepted and when the primary is asked instead.
//!
//! | Policy | Replica unreachable | Replica rejects command | Replica empty |
//! |--------|---------------------|-------------------------|---------------|
//! | [`OnError`](ReadFallback::OnError) | ask primary | return error | return empty |
//! | [`OnEmptyOrError`](ReadFallback::OnEmptyOrError) | ask primary | ask primary | ask primary |
//! | [`PrimaryOnly`](ReadFallback::PrimaryOnly) | not used | not used | not used |
//!
//! "Unreachable" covers every [`KeyspaceError::is_connection`] failure,
//! including a replica that is still loading or resyncing. Under `OnError` a
//! command the replica rejects, such as `WRONGTYPE`, is returned directly.
//!
//! For `TTL`, "empty" means `-2` (no such key). A key without expiry
//! answers `-1` and a key about to expire `0`; both are real answers.
//!
//! `OnEmptyOrError` cannot tell "key absent" apart from "replica lagging", so
//! every miss costs a second round-trip. It also hides replication lag for a
//! read that immediately follows a write.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::KeyspaceError;

/// When a read served by the replica falls back to the primary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFallback {
    /// Fall back only when the replica cannot be reached.
    #[default]
    OnError,
    /// Fall back on any replica error or an empty reply.
    OnEmptyOrError,
    /// Send every read straight to the primary.
    PrimaryOnly,
}

impl ReadFallback {
    /// Returns `true` if reads should be attempted on the replica at all.
    #[must_use]
    pub fn uses_replica(self) -> bool {
        !matches!(self, Self::PrimaryOnly)
    }

    /// Returns `true` if an empty replica reply should be retried on the primary.
    #[must_use]
    pub fn retries_empty(self) -> bool {
        matches!(self, Self::OnEmptyOrError)
    }

    /// Returns `true` if a replica read that failed with `error` should be
    /// retried on the primary.
    #[must_use]
    pub fn retries_error(self, error: &KeyspaceError) -> bool {
        match self {
            Self::OnError => error.is_connection(),
            Self::OnEmptyOrError => true,
            Self::PrimaryOnly => false,
        }
    }
}

impl fmt::Display for ReadFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnError => write!(f, "on_error"),
            Self::OnEmptyOrError => write!(f, "on_empty_or_error"),
            Self::PrimaryOnly => write!(f, "primary_only"),
        }
    }
}

impl FromStr for ReadFallback {
    type Err = KeyspaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_error" => Ok(Self::OnError),
            "on_empty_or_error" => Ok(Self::OnEmptyOrError),
            "primary_only" => Ok(Self::PrimaryOnly),
            other => Err(KeyspaceError::config(format!("unknown read fallback policy '{other}'"))),
        }
    }
}

/// Replies that can be "empty" in the sense of carrying no data.
pub trait EmptyReply {
    /// Returns `true` if the reply carries no data.
    fn is_empty_reply(&self) -> bool;
}

impl EmptyReply for Option<String> {
    fn is_empty_reply(&self) -> bool {
        self.as_deref().is_none_or(str::is_empty)
    }
}

impl EmptyReply for Vec<String> {
    fn is_empty_reply(&self) -> bool {
        self.is_empty()
    }
}

impl EmptyReply for HashMap<String, String> {
    fn is_empty_reply(&self) -> bool {
        self.is_empty()
    }
}

/// A `TTL` reply of `-2` means the key does not exist.
impl EmptyReply for i64 {
    fn is_empty_reply(&self) -> bool {
        *self == -2
    }
}
