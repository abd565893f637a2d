//! End-to-end behavior of [`KeyspaceClient`] over in-memory connections.
//!
//! Each test drives the public operations the way a consuming service would
//! and checks what is observable through the client alone.

#![allow(clippy::expect_used)]

use std::{collections::HashMap, sync::Arc, time::Duration};

use keyspace_common::{
    KeyPrefix, KeyspaceClient, KeyspaceConnection, ReadFallback, assert_connection_error,
    assert_wrong_type,
    testutil::{TEST_PREFIX, make_key, mirrored_client, mirrored_pair},
};
use parking_lot::Mutex;

#[tokio::test]
async fn set_then_get_returns_value() {
    let client = mirrored_client(ReadFallback::OnError);

    client.set_key("user:1", "alice", 0).await.expect("set");
    assert_eq!(client.get_key("user:1").await.expect("get").as_deref(), Some("alice"));

    client.set_key("user:1", "bob", 0).await.expect("overwrite");
    assert_eq!(client.get_key("user:1").await.expect("get").as_deref(), Some("bob"));
}

#[tokio::test]
async fn absent_key_reads_as_empty_without_error() {
    let client = mirrored_client(ReadFallback::OnError);

    assert_eq!(client.get_key("missing").await.expect("get"), None);
    assert!(client.keys("missing*").await.expect("keys").is_empty());
    assert!(client.l_range_key("missing", 0, -1).await.expect("lrange").is_empty());
    assert!(client.h_getall_key("missing").await.expect("hgetall").is_empty());
    assert_eq!(client.ttl_key("missing").await.expect("ttl"), -2);
    assert_eq!(client.del_key("missing").await.expect("del"), 0);
}

#[tokio::test(start_paused = true)]
async fn expiring_key_disappears_after_ttl() {
    let client = mirrored_client(ReadFallback::OnError);

    client.set_key("session", "token", 10).await.expect("set");
    assert_eq!(client.ttl_key("session").await.expect("ttl"), 10);

    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(client.ttl_key("session").await.expect("ttl"), 6);
    assert!(client.get_key("session").await.expect("get").is_some());

    tokio::time::advance(Duration::from_secs(7)).await;
    assert_eq!(client.get_key("session").await.expect("get"), None);
    assert_eq!(client.ttl_key("session").await.expect("ttl"), -2);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_write_clears_previous_expiry() {
    let client = mirrored_client(ReadFallback::OnError);

    client.set_key("k", "v1", 5).await.expect("set with ttl");
    client.set_key("k", "v2", 0).await.expect("set without ttl");
    assert_eq!(client.ttl_key("k").await.expect("ttl"), -1);

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(client.get_key("k").await.expect("get").as_deref(), Some("v2"));
}

#[tokio::test]
async fn counters_step_by_one_or_by_amount() {
    let client = mirrored_client(ReadFallback::OnError);

    for expected in 1..=20 {
        assert_eq!(client.increment_key("hits", None).await.expect("incr"), expected);
    }
    assert_eq!(client.increment_key("hits", Some(5)).await.expect("incr by"), 25);
    assert_eq!(client.increment_key("hits", Some(0)).await.expect("incr zero"), 26);

    assert_eq!(client.decrement_key("hits", None).await.expect("decr"), 25);
    assert_eq!(client.decrement_key("hits", Some(30)).await.expect("decr by"), -5);
    assert_eq!(client.get_key("hits").await.expect("get").as_deref(), Some("-5"));
}

#[tokio::test]
async fn counter_on_text_value_fails() {
    let client = mirrored_client(ReadFallback::OnError);
    client.set_key("name", "alice", 0).await.expect("set");

    assert!(client.increment_key("name", None).await.is_err());
    assert_eq!(client.metrics().snapshot().error_count, 1);
}

#[tokio::test]
async fn list_push_prepends_and_range_reads_back() {
    let client = mirrored_client(ReadFallback::OnError);

    assert_eq!(client.l_push_key("queue", "a").await.expect("lpush"), 1);
    assert_eq!(client.l_push_key("queue", "b").await.expect("lpush"), 2);
    assert_eq!(client.l_range_key("queue", 0, -1).await.expect("lrange"), vec!["b", "a"]);
    assert_eq!(client.l_range_key("queue", -1, -1).await.expect("lrange"), vec!["a"]);
}

#[tokio::test]
async fn list_remove_honors_count_direction() {
    let client = mirrored_client(ReadFallback::OnError);
    for value in ["x", "y", "x", "x"] {
        client.l_push_key("l", value).await.expect("lpush");
    }
    // head -> tail: x x y x

    assert_eq!(client.l_rem_key("l", -1, "x").await.expect("lrem tail"), 1);
    assert_eq!(client.l_range_key("l", 0, -1).await.expect("lrange"), vec!["x", "x", "y"]);

    assert_eq!(client.l_rem_key("l", 0, "x").await.expect("lrem all"), 2);
    assert_eq!(client.l_range_key("l", 0, -1).await.expect("lrange"), vec!["y"]);

    assert_eq!(client.l_rem_key("l", 1, "nope").await.expect("lrem absent"), 0);
}

#[tokio::test]
async fn hash_set_and_increment_field() {
    let client = mirrored_client(ReadFallback::OnError);

    assert_eq!(client.h_set_key("stats", "f", 1).await.expect("hset"), 1);
    assert_eq!(client.h_incrby_key("stats", "f", 4).await.expect("hincrby"), 5);
    assert_eq!(client.h_set_key("stats", "label", "daily").await.expect("hset"), 1);
    assert_eq!(client.h_set_key("stats", "label", "weekly").await.expect("hset"), 0);

    let expected: HashMap<String, String> =
        [("f".to_owned(), "5".to_owned()), ("label".to_owned(), "weekly".to_owned())].into();
    assert_eq!(client.h_getall_key("stats").await.expect("hgetall"), expected);

    assert_eq!(client.h_del_key("stats", "label").await.expect("hdel"), 1);
    assert_eq!(client.h_del_key("stats", "label").await.expect("hdel again"), 0);
    assert_eq!(
        client.h_getall_key("stats").await.expect("hgetall"),
        HashMap::from([("f".to_owned(), "5".to_owned())])
    );
}

#[tokio::test]
async fn hash_operations_reject_other_types() {
    let client = mirrored_client(ReadFallback::OnError);
    client.l_push_key("list", "a").await.expect("lpush");

    assert_wrong_type!(client.h_set_key("list", "f", 1).await);
    assert_wrong_type!(client.h_getall_key("list").await);
}

#[tokio::test]
async fn keys_lists_logical_names_under_prefix() {
    let client = mirrored_client(ReadFallback::OnError);
    for idx in 0..3 {
        client.set_key(&make_key("user", idx), "v", 0).await.expect("set");
    }
    client.set_key("order:1", "v", 0).await.expect("set");

    let mut users = client.keys("user:*").await.expect("keys");
    users.sort();
    assert_eq!(users, vec![make_key("user", 0), make_key("user", 1), make_key("user", 2)]);

    assert_eq!(client.keys("*").await.expect("keys all").len(), 4);
}

#[tokio::test]
async fn keys_ignores_other_prefixes() {
    let (primary, replica) = mirrored_pair();
    let ours = KeyspaceClient::builder()
        .primary(primary.clone())
        .replica(replica.clone())
        .prefix(KeyPrefix::fixed("A|"))
        .build();
    let theirs = KeyspaceClient::builder()
        .primary(primary)
        .replica(replica)
        .prefix(KeyPrefix::fixed("B|"))
        .build();

    ours.set_key("k", "mine", 0).await.expect("set");
    theirs.set_key("k", "theirs", 0).await.expect("set");

    assert_eq!(ours.keys("*").await.expect("keys"), vec!["k"]);
    assert_eq!(ours.get_key("k").await.expect("get").as_deref(), Some("mine"));
    assert_eq!(theirs.get_key("k").await.expect("get").as_deref(), Some("theirs"));
}

#[tokio::test]
async fn glob_characters_in_prefix_match_literally() {
    let (primary, replica) = mirrored_pair();
    let starred = KeyspaceClient::builder()
        .primary(primary.clone())
        .replica(replica.clone())
        .prefix(KeyPrefix::fixed("A*|"))
        .build();
    let neighbour = KeyspaceClient::builder()
        .primary(primary)
        .replica(replica)
        .prefix(KeyPrefix::fixed("AB|"))
        .build();

    starred.set_key("k", "mine", 0).await.expect("set");
    neighbour.set_key("k", "theirs", 0).await.expect("set");
    neighbour.set_key("other", "theirs", 0).await.expect("set");

    assert_eq!(starred.keys("*").await.expect("keys"), vec!["k"]);
    assert_eq!(starred.del_key("*").await.expect("del all"), 1);

    let mut survivors = neighbour.keys("*").await.expect("keys");
    survivors.sort();
    assert_eq!(survivors, vec!["k", "other"]);
}

#[tokio::test]
async fn pattern_delete_removes_every_match() {
    let client = mirrored_client(ReadFallback::OnError);
    for idx in 0..5 {
        client.set_key(&make_key("cache", idx), "v", 0).await.expect("set");
    }
    client.set_key("keep", "v", 0).await.expect("set");

    assert_eq!(client.del_key("cache:*").await.expect("del pattern"), 5);
    assert!(client.keys("cache:*").await.expect("keys").is_empty());
    assert_eq!(client.get_key("keep").await.expect("get").as_deref(), Some("v"));
}

#[tokio::test]
async fn delete_all_under_prefix() {
    let client = mirrored_client(ReadFallback::OnError);
    client.set_key("a", "1", 0).await.expect("set");
    client.l_push_key("b", "1").await.expect("lpush");
    client.h_set_key("c", "f", 1).await.expect("hset");

    assert_eq!(client.del_key("*").await.expect("del all"), 3);
    assert!(client.keys("*").await.expect("keys").is_empty());
}

#[tokio::test]
async fn plain_delete_touches_only_the_prefixed_key() {
    let client = mirrored_client(ReadFallback::OnError);
    client.set_key("k", "v", 0).await.expect("set");

    // A key stored without the prefix must survive a delete of the logical key.
    client.primary().set("k", "raw").await.expect("raw set");

    assert_eq!(client.del_key("k").await.expect("del"), 1);
    assert_eq!(client.primary().get("k").await.expect("raw get").as_deref(), Some("raw"));
    assert_eq!(client.primary().get(&format!("{TEST_PREFIX}k")).await.expect("get"), None);
}

#[tokio::test]
async fn escaped_wildcard_is_deleted_literally() {
    let client = mirrored_client(ReadFallback::OnError);
    client.set_key("a*", "literal", 0).await.expect("set");
    client.set_key("ab", "other", 0).await.expect("set");

    assert_eq!(client.del_key("a\\*").await.expect("del"), 0);
    assert_eq!(client.del_key("a*").await.expect("del"), 2);
}

#[tokio::test]
async fn reads_survive_replica_outage() {
    let client = mirrored_client(ReadFallback::OnError);
    client.set_key("k", "v", 0).await.expect("set");
    client.l_push_key("l", "x").await.expect("lpush");
    client.h_set_key("h", "f", 1).await.expect("hset");
    client.replica().set_available(false);

    assert_eq!(client.get_key("k").await.expect("get").as_deref(), Some("v"));
    assert_eq!(client.keys("*").await.expect("keys").len(), 3);
    assert_eq!(client.l_range_key("l", 0, -1).await.expect("lrange"), vec!["x"]);
    assert_eq!(client.h_getall_key("h").await.expect("hgetall").len(), 1);
    assert_eq!(client.ttl_key("k").await.expect("ttl"), -1);
    assert_eq!(client.del_key("*").await.expect("del pattern"), 3);

    let snapshot = client.metrics().snapshot();
    assert_eq!(snapshot.error_fallbacks, 6);
    assert_eq!(snapshot.error_count, 0);
}

#[tokio::test]
async fn primary_outage_fails_writes_and_reads_that_need_it() {
    let client = mirrored_client(ReadFallback::OnError);
    client.set_key("k", "v", 0).await.expect("set");
    client.primary().set_available(false);

    assert!(client.set_key("k", "v2", 0).await.is_err());
    assert!(client.increment_key("n", None).await.is_err());

    // The replica still answers reads on its own.
    assert_eq!(client.get_key("k").await.expect("get").as_deref(), Some("v"));

    client.replica().set_available(false);
    assert_connection_error!(client.get_key("k").await);
}

#[tokio::test]
async fn dynamic_prefix_is_resolved_per_call() {
    let current = Arc::new(Mutex::new("ONE|".to_owned()));
    let source = Arc::clone(&current);

    let (primary, replica) = mirrored_pair();
    let client = KeyspaceClient::builder()
        .primary(primary)
        .replica(replica)
        .prefix(KeyPrefix::dynamic(move || source.lock().clone()))
        .build();

    client.set_key("k", "first", 0).await.expect("set");
    *current.lock() = "TWO|".to_owned();
    assert_eq!(client.get_key("k").await.expect("get"), None);

    client.set_key("k", "second", 0).await.expect("set");
    assert_eq!(client.prefixed("k"), "TWO|k");
    assert_eq!(client.keys("*").await.expect("keys"), vec!["k"]);

    *current.lock() = "ONE|".to_owned();
    assert_eq!(client.get_key("k").await.expect("get").as_deref(), Some("first"));
}

#[tokio::test]
async fn clones_share_connections_and_metrics() {
    let client = mirrored_client(ReadFallback::OnError);
    let clone = client.clone();

    clone.set_key("k", "v", 0).await.expect("set");
    assert_eq!(client.get_key("k").await.expect("get").as_deref(), Some("v"));
    assert_eq!(client.metrics().snapshot().writes, 1);

    clone.close();
    client.close();
}
