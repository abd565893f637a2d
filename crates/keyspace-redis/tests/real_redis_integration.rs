//! Integration tests for the Redis keyspace connection with a real server.
//!
//! These tests require a running Redis server. They are skipped unless the
//! `RUN_REDIS_INTEGRATION_TESTS` environment variable is set. The server is
//! located through the usual `COMMON_REDIS_*` variables.
//!
//! # Running the tests
//!
//! ```bash
//! docker run --rm -p 6379:6379 redis:7
//!
//! RUN_REDIS_INTEGRATION_TESTS=1 \
//! COMMON_REDIS_HOST=localhost \
//! cargo test -p keyspace-common-redis --test real_redis_integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    env,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use keyspace_common::{
    ConnectionRole, HealthProbe, KeyPrefix, KeyspaceClient, KeyspaceError, ReadFallback,
};
use keyspace_common_redis::{RedisConnection, RedisKeyspaceConfig};
use tokio::time::sleep;

// ============================================================================
// Test Configuration
// ============================================================================

/// Global counter for generating a unique key prefix per test.
static PREFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Check if real Redis integration tests should run.
fn should_run() -> bool {
    env::var("RUN_REDIS_INTEGRATION_TESTS").is_ok()
}

/// A prefix no other test run shares, so tests need no cleanup between runs.
fn unique_prefix() -> String {
    let run = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    let n = PREFIX_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("KEYSPACE_IT|{run}|{n}|")
}

/// Creates a client against the configured server with a unique prefix.
async fn create_test_client(fallback: ReadFallback) -> KeyspaceClient<RedisConnection> {
    let config = RedisKeyspaceConfig::from_env().expect("valid environment");
    let primary = RedisConnection::open(&config, ConnectionRole::Primary).await.expect("primary");
    let replica = RedisConnection::open(&config, ConnectionRole::Replica).await.expect("replica");

    KeyspaceClient::builder()
        .primary(primary)
        .replica(replica)
        .prefix(KeyPrefix::fixed(unique_prefix()))
        .read_fallback(fallback)
        .build()
}

/// Skips the calling test unless integration tests are enabled.
macro_rules! skip_unless_enabled {
    () => {
        if !should_run() {
            eprintln!("Skipping real Redis test (RUN_REDIS_INTEGRATION_TESTS not set)");
            return;
        }
    };
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_real_string_round_trip_and_ttl() {
    skip_unless_enabled!();
    let client = create_test_client(ReadFallback::OnEmptyOrError).await;

    client.set_key("greeting", "hello", 0).await.expect("set");
    assert_eq!(client.get_key("greeting").await.expect("get").as_deref(), Some("hello"));
    assert_eq!(client.ttl_key("greeting").await.expect("ttl"), -1);

    client.set_key("short", "lived", 1).await.expect("set with ttl");
    assert!(client.ttl_key("short").await.expect("ttl") >= 0);
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(client.get_key("short").await.expect("get"), None);
    assert_eq!(client.ttl_key("short").await.expect("ttl"), -2);

    client.del_key("*").await.expect("cleanup");
}

#[tokio::test]
async fn test_real_counters() {
    skip_unless_enabled!();
    let client = create_test_client(ReadFallback::OnError).await;

    for _ in 0..20 {
        client.increment_key("hits", None).await.expect("incr");
    }
    assert_eq!(client.increment_key("hits", Some(5)).await.expect("incr by"), 25);
    assert_eq!(client.decrement_key("hits", Some(10)).await.expect("decr by"), 15);

    client.set_key("text", "abc", 0).await.expect("set");
    let err = client.increment_key("text", None).await.unwrap_err();
    assert!(matches!(err, KeyspaceError::Command { .. }), "{err:?}");

    client.del_key("*").await.expect("cleanup");
}

#[tokio::test]
async fn test_real_lists_and_hashes() {
    skip_unless_enabled!();
    let client = create_test_client(ReadFallback::OnEmptyOrError).await;

    client.l_push_key("queue", "a").await.expect("lpush");
    client.l_push_key("queue", "b").await.expect("lpush");
    assert_eq!(client.l_range_key("queue", 0, -1).await.expect("lrange"), vec!["b", "a"]);
    assert_eq!(client.l_rem_key("queue", 0, "a").await.expect("lrem"), 1);

    client.h_set_key("stats", "f", 1).await.expect("hset");
    client.h_incrby_key("stats", "f", 4).await.expect("hincrby");
    assert_eq!(
        client.h_getall_key("stats").await.expect("hgetall"),
        HashMap::from([("f".to_owned(), "5".to_owned())])
    );
    assert_eq!(client.h_del_key("stats", "f").await.expect("hdel"), 1);

    client.del_key("*").await.expect("cleanup");
}

#[tokio::test]
async fn test_real_wrong_type_is_classified() {
    skip_unless_enabled!();
    let client = create_test_client(ReadFallback::OnError).await;

    client.l_push_key("list", "a").await.expect("lpush");
    let err = client.h_set_key("list", "f", 1).await.unwrap_err();
    assert!(matches!(err, KeyspaceError::WrongType { .. }), "{err:?}");

    client.del_key("*").await.expect("cleanup");
}

#[tokio::test]
async fn test_real_keys_and_pattern_delete() {
    skip_unless_enabled!();
    let client = create_test_client(ReadFallback::OnEmptyOrError).await;

    for idx in 0..5 {
        client.set_key(&format!("cache:{idx}"), "v", 0).await.expect("set");
    }
    client.set_key("keep", "v", 0).await.expect("set");

    let mut cached = client.keys("cache:*").await.expect("keys");
    cached.sort();
    assert_eq!(cached, vec!["cache:0", "cache:1", "cache:2", "cache:3", "cache:4"]);

    assert_eq!(client.del_key("cache:*").await.expect("del pattern"), 5);
    assert_eq!(client.keys("*").await.expect("keys"), vec!["keep"]);

    client.del_key("*").await.expect("cleanup");
}

#[tokio::test]
async fn test_real_health_check() {
    skip_unless_enabled!();
    let client = create_test_client(ReadFallback::OnError).await;

    let status = client.health_check(HealthProbe::Readiness).await;
    assert!(status.is_healthy(), "{status}");
    assert!(client.primary().is_connected());
}
