//! Health reporting for a primary/replica pair.

#![allow(clippy::expect_used)]

use keyspace_common::{
    ConnectionRole, HealthProbe, HealthStatus, ReadFallback, RoleHealth, testutil::mirrored_client,
};

#[tokio::test]
async fn both_connections_up_is_healthy() {
    let client = mirrored_client(ReadFallback::OnError);

    let status = client.health_check(HealthProbe::Readiness).await;
    assert!(status.is_healthy(), "{status}");
    assert_eq!(status.backend, "memory");
    assert_eq!(status.probe, HealthProbe::Readiness);
    assert!(status.primary.latency().is_some());
    assert!(status.replica.latency().is_some());
    assert_eq!(client.primary().calls("PING"), 1);
    assert_eq!(client.replica().calls("PING"), 1);
}

#[tokio::test]
async fn replica_down_is_degraded() {
    let client = mirrored_client(ReadFallback::OnError);
    client.replica().set_available(false);

    let status = client.health_check(HealthProbe::Readiness).await;
    assert!(status.is_degraded(), "{status}");
    assert!(status.primary.is_up());
    assert!(status.replica.error().is_some_and(|e| e.is_connection()));
    assert!(matches!(status.failure(), Some((ConnectionRole::Replica, _))));
}

#[tokio::test]
async fn primary_down_is_unhealthy() {
    let client = mirrored_client(ReadFallback::OnError);
    client.primary().set_available(false);

    let status = client.health_check(HealthProbe::Startup).await;
    assert_eq!(status.status(), HealthStatus::Unhealthy, "{status}");
    assert!(status.to_string().starts_with("unhealthy: primary:"));
}

#[tokio::test]
async fn liveness_does_no_io() {
    let client = mirrored_client(ReadFallback::OnError);
    client.primary().set_available(false);
    client.replica().set_available(false);

    let status = client.health_check(HealthProbe::Liveness).await;
    assert!(status.is_healthy());
    assert!(matches!(status.primary, RoleHealth::Unchecked));
    assert_eq!(client.primary().total_calls(), 0);
    assert_eq!(client.replica().total_calls(), 0);
    assert_eq!(client.metrics().snapshot().health_check_count, 1);
}

#[tokio::test]
async fn loading_replica_is_degraded() {
    let client = mirrored_client(ReadFallback::OnError);
    client.replica().set_loading(true);

    let status = client.health_check(HealthProbe::Readiness).await;
    assert_eq!(status.status(), HealthStatus::Degraded, "{status}");
}
