//! Health reporting for a primary/replica pair.
//!
//! [`KeyspaceClient::health_check`](crate::KeyspaceClient::health_check) pings
//! both connections and returns a [`HealthReport`] holding one
//! [`RoleHealth`] per connection. The overall [`HealthStatus`] is derived
//! from the two:
//!
//! | Primary | Replica | Status |
//! |---------|---------|--------|
//! | up | up | `Healthy` |
//! | up | down | `Degraded` (reads fall back to the primary) |
//! | down | any | `Unhealthy` (writes cannot be served) |
//!
//! A [`HealthProbe::Liveness`] probe does no I/O, so both roles are
//! [`RoleHealth::Unchecked`] and the report is healthy.

use std::{fmt, time::Duration};

use crate::{connection::ConnectionRole, error::KeyspaceError};

/// The type of health probe to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthProbe {
    /// Process is alive. Nothing is pinged.
    Liveness,
    /// Client can serve traffic.
    Readiness,
    /// Initial connections have been established.
    Startup,
}

impl fmt::Display for HealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Liveness => write!(f, "liveness"),
            Self::Readiness => write!(f, "readiness"),
            Self::Startup => write!(f, "startup"),
        }
    }
}

/// Overall health of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    /// Both connections answered.
    Healthy,
    /// The replica is down; reads are served by the primary.
    Degraded,
    /// The primary is down.
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Outcome of pinging one connection.
#[derive(Debug, Clone)]
pub enum RoleHealth {
    /// Not pinged (liveness probe).
    Unchecked,
    /// Answered `PING` after `latency`.
    Up {
        /// Round-trip time of the ping.
        latency: Duration,
    },
    /// `PING` failed.
    Down {
        /// Why the ping failed.
        error: KeyspaceError,
    },
}

impl RoleHealth {
    /// Builds the health of a role from a timed ping result.
    #[must_use]
    pub fn from_ping(result: Result<Duration, KeyspaceError>) -> Self {
        match result {
            Ok(latency) => Self::Up { latency },
            Err(error) => Self::Down { error },
        }
    }

    /// Returns `true` unless the ping failed.
    #[must_use]
    pub fn is_up(&self) -> bool {
        !matches!(self, Self::Down { .. })
    }

    /// Ping round-trip, when the connection answered.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        match self {
            Self::Up { latency } => Some(*latency),
            _ => None,
        }
    }

    /// Ping failure, when the connection did not answer.
    #[must_use]
    pub fn error(&self) -> Option<&KeyspaceError> {
        match self {
            Self::Down { error } => Some(error),
            _ => None,
        }
    }
}

/// Result of a [`health_check`](crate::KeyspaceClient::health_check).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use keyspace_common::{HealthProbe, HealthReport, HealthStatus, KeyspaceError, RoleHealth};
///
/// let report = HealthReport {
///     probe: HealthProbe::Readiness,
///     backend: "redis",
///     check_duration: Duration::from_millis(3),
///     primary: RoleHealth::Up { latency: Duration::from_millis(1) },
///     replica: RoleHealth::Down { error: KeyspaceError::connection("refused") },
/// };
///
/// assert_eq!(report.status(), HealthStatus::Degraded);
/// assert_eq!(report.to_string(), "degraded: replica: Connection error: refused (3ms)");
/// ```
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Probe that produced the report.
    pub probe: HealthProbe,
    /// Connection backend name (e.g. `"memory"`, `"redis"`).
    pub backend: &'static str,
    /// How long the check took.
    pub check_duration: Duration,
    /// Primary connection outcome.
    pub primary: RoleHealth,
    /// Replica connection outcome.
    pub replica: RoleHealth,
}

impl HealthReport {
    /// Returns the outcome for `role`.
    #[must_use]
    pub fn role(&self, role: ConnectionRole) -> &RoleHealth {
        match role {
            ConnectionRole::Primary => &self.primary,
            ConnectionRole::Replica => &self.replica,
        }
    }

    /// Derives the overall status from both roles.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        match (self.primary.is_up(), self.replica.is_up()) {
            (false, _) => HealthStatus::Unhealthy,
            (true, false) => HealthStatus::Degraded,
            (true, true) => HealthStatus::Healthy,
        }
    }

    /// Returns `true` if both connections are up.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status() == HealthStatus::Healthy
    }

    /// Returns `true` if only the replica is down.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.status() == HealthStatus::Degraded
    }

    /// Returns `true` if the primary is down.
    #[must_use]
    pub fn is_unhealthy(&self) -> bool {
        self.status() == HealthStatus::Unhealthy
    }

    /// The role that failed and its error; the primary wins when both failed.
    #[must_use]
    pub fn failure(&self) -> Option<(ConnectionRole, &KeyspaceError)> {
        self.primary
            .error()
            .map(|e| (ConnectionRole::Primary, e))
            .or_else(|| self.replica.error().map(|e| (ConnectionRole::Replica, e)))
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.check_duration.as_millis();
        match self.failure() {
            Some((role, error)) => write!(f, "{}: {role}: {error} ({millis}ms)", self.status()),
            None => write!(f, "{} ({millis}ms)", self.status()),
        }
    }
}
