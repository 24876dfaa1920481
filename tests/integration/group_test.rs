// tests/integration/group_test.rs

//! Integration tests for the partitioned client group lifecycle.

use super::test_helpers::{GroupHarness, key, mock_group, wait_for_applied};
use futures::future::join_all;
use shardline::config::GroupConfig;
use shardline::core::discovery::EventKind;
use shardline::core::protocol::Request;
use shardline::core::{ClientError, ClientHandle};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_unknown_key_fails_without_constructing() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);

    let handle = h.group.get(&k);
    assert!(handle.is_unknown());
    assert_eq!(handle.id(), None);

    let err = handle.request(Request::get("/a")).await.unwrap_err();
    assert_eq!(err, ClientError::UnknownPartition { key: k.clone() });
    let err = handle.reserve_connection(&Request::get("/a")).await.unwrap_err();
    assert_eq!(err, ClientError::UnknownPartition { key: k });
    assert!(handle.close().await.is_ok());
    assert_eq!(h.log.created_count(), 0);
}

#[tokio::test]
async fn test_available_creates_lazy_partition() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "10.0.0.1:80").await;
    h.settle().await;

    let handle = h.group.get(&k);
    assert!(handle.is_live());
    let partition = handle.partition().unwrap();
    assert!(!partition.is_constructed());
    assert_eq!(partition.addresses(), vec!["10.0.0.1:80".to_string()]);
    assert_eq!(h.log.created_count(), 0);

    let response = handle.request(Request::get("/ping")).await.unwrap();
    assert_eq!(response.body, format!("{} /ping", k));
    assert!(partition.is_constructed());
    assert_eq!(h.log.created_count(), 1);

    let conn = h.group.get(&k).reserve_connection(&Request::get("/x")).await.unwrap();
    assert_eq!(conn, format!("conn:{}", k));
    assert_eq!(h.log.created_count(), 1);
}

#[tokio::test]
async fn test_concurrent_first_use_constructs_once() {
    let h = GroupHarness::new();
    h.log.create_delay_ms.store(20, Ordering::SeqCst);
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.settle().await;

    let handle = h.group.get(&k);
    let calls = (0..16).map(|i| handle.request(Request::get(format!("/{i}"))));
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(h.log.created_count(), 1);
    assert_eq!(h.log.requests.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn test_repeated_available_reuses_handle() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.settle().await;
    let first = h.group.get(&k).id().unwrap();

    h.available(&k, "b").await;
    h.available(&k, "a").await;
    h.settle().await;

    let handle = h.group.get(&k);
    assert_eq!(handle.id(), Some(first));
    assert_eq!(
        handle.partition().unwrap().addresses(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(h.group.snapshot().live_partitions(), 1);
}

#[tokio::test]
async fn test_address_changes_reach_the_client_feed() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.available(&k, "b").await;
    h.settle().await;

    let handle = h.group.get(&k);
    let client = handle.partition().unwrap().client().await.unwrap();
    let mut feed = client.addresses.lock().await;

    let seeded: Vec<_> = [feed.recv().await.unwrap(), feed.recv().await.unwrap()]
        .into_iter()
        .map(|e| (e.address, e.kind))
        .collect();
    assert_eq!(
        seeded,
        vec![
            ("a".to_string(), EventKind::Available),
            ("b".to_string(), EventKind::Available)
        ]
    );

    h.unavailable(&k, "a").await;
    h.available(&k, "c").await;
    h.settle().await;

    let next = feed.recv().await.unwrap();
    assert_eq!((next.address.as_str(), next.kind), ("a", EventKind::Unavailable));
    let next = feed.recv().await.unwrap();
    assert_eq!((next.address.as_str(), next.kind), ("c", EventKind::Available));
    assert!(feed.try_recv().is_none());
}

#[tokio::test]
async fn test_last_address_gone_closes_partition() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.available(&k, "b").await;
    h.settle().await;

    let old = h.group.get(&k);
    old.request(Request::get("/warm")).await.unwrap();

    h.unavailable(&k, "a").await;
    h.settle().await;
    assert!(h.group.get(&k).is_live());

    h.unavailable(&k, "b").await;
    h.settle().await;

    let handle = h.group.get(&k);
    assert!(handle.is_closed());
    let err = handle.request(Request::get("/a")).await.unwrap_err();
    assert_eq!(err, ClientError::ClosedPartition { key: k.clone() });

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.log.closed_count() < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(h.log.closed.lock().clone(), vec![k.clone()]);

    // A handle taken before the teardown fails the same way.
    let err = old.request(Request::get("/b")).await.unwrap_err();
    assert_eq!(err, ClientError::ClosedPartition { key: k });
}

#[tokio::test]
async fn test_rediscovered_key_gets_new_handle() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.settle().await;
    let first = h.group.get(&k).id().unwrap();

    h.unavailable(&k, "a").await;
    h.settle().await;
    assert!(h.group.get(&k).is_closed());

    h.available(&k, "a").await;
    h.settle().await;
    let second = h.group.get(&k);
    assert!(second.is_live());
    assert_ne!(second.id().unwrap(), first);
    assert!(second.request(Request::get("/again")).await.is_ok());
}

#[tokio::test]
async fn test_rediscovered_key_is_registered_once() {
    let h = GroupHarness::new();
    let k = key(&[("dc", "east"), ("shard", "1")]);
    for _ in 0..3 {
        h.available(&k, "a").await;
        h.unavailable(&k, "a").await;
    }
    h.available(&k, "a").await;
    h.settle().await;

    let snapshot = h.group.snapshot();
    assert_eq!(snapshot.partition_keys(), vec![k.clone()]);
    assert_eq!(h.group.get(&key(&[("dc", "east")])).key(), &k);
    assert!(h.group.get(&k).is_live());
}

#[tokio::test]
async fn test_discovery_queue_bounded_by_config() {
    use shardline::config::Config;
    use shardline::core::discovery::discovery_channel;

    let config = Config::from_toml_str("[discovery]\nmax_queue_size = 2\n").unwrap();
    let (sender, _feed) = discovery_channel::<String>(config.discovery.max_queue_size);
    let k = key(&[("shard", "1")]);
    sender.available(k.clone(), "a".to_string()).await.unwrap();
    sender.available(k.clone(), "b".to_string()).await.unwrap();

    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        sender.available(k, "c".to_string()),
    )
    .await;
    assert!(blocked.is_err(), "third event was queued past max_queue_size");
}

#[tokio::test]
async fn test_teardown_survives_dropping_the_group() {
    let (sender, group, log) = mock_group(&GroupConfig::default());
    log.close_delay_ms.store(50, Ordering::SeqCst);
    let k = key(&[("shard", "1")]);

    sender.available(k.clone(), "a".to_string()).await.unwrap();
    wait_for_applied(&group, 1).await;
    group.get(&k).request(Request::get("/warm")).await.unwrap();

    sender.unavailable(k.clone(), "a".to_string()).await.unwrap();
    wait_for_applied(&group, 2).await;
    assert!(group.get(&k).is_closed());
    drop(group);
    drop(sender);

    tokio::time::timeout(Duration::from_secs(5), async {
        while log.closed_count() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client was not closed after the group was dropped");
    assert_eq!(log.closed.lock().clone(), vec![k]);
}

#[tokio::test]
async fn test_unavailable_for_unknown_or_closed_key_is_ignored() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.unavailable(&k, "a").await;
    h.settle().await;
    assert!(h.group.get(&k).is_unknown());

    h.available(&k, "a").await;
    h.unavailable(&k, "a").await;
    h.unavailable(&k, "a").await;
    h.settle().await;
    assert!(h.group.get(&k).is_closed());
    assert_eq!(h.group.snapshot().applied_events(), 4);
}

#[tokio::test]
async fn test_construction_failure_retried_after_available() {
    let h = GroupHarness::new();
    h.log.failures_left.store(1, Ordering::SeqCst);
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.settle().await;

    let handle = h.group.get(&k);
    let err = handle.request(Request::get("/a")).await.unwrap_err();
    assert!(matches!(err, ClientError::ConstructionFailure { ref key, .. } if *key == k));
    assert!(err.is_retryable());

    // Sticky until the next Available event.
    let again = handle.request(Request::get("/b")).await.unwrap_err();
    assert_eq!(again, err);
    assert_eq!(h.log.created_count(), 0);

    h.available(&k, "a").await;
    h.settle().await;
    let response = h.group.get(&k).request(Request::get("/c")).await.unwrap();
    assert!(response.is_success());
    assert_eq!(h.log.created_for(&k), 1);
}

#[tokio::test]
async fn test_subset_lookup_and_exact_precedence() {
    let h = GroupHarness::new();
    let coarse = key(&[("dc", "east")]);
    let fine = key(&[("dc", "east"), ("shard", "1")]);
    h.available(&fine, "a").await;
    h.settle().await;

    // A coarser lookup reaches the finer partition.
    let handle = h.group.get(&coarse);
    assert_eq!(handle.key(), &fine);

    h.available(&coarse, "b").await;
    h.settle().await;
    assert_eq!(h.group.get(&coarse).key(), &coarse);
    assert_eq!(h.group.get(&fine).key(), &fine);
    assert!(h.group.get(&key(&[("shard", "2")])).is_unknown());
}

#[tokio::test]
async fn test_subset_lookup_skips_closed_partitions() {
    let h = GroupHarness::new();
    let first = key(&[("dc", "east"), ("shard", "1")]);
    let second = key(&[("dc", "east"), ("shard", "2")]);
    let lookup = key(&[("dc", "east")]);
    h.available(&first, "a").await;
    h.available(&second, "b").await;
    h.settle().await;
    assert_eq!(h.group.get(&lookup).key(), &first);

    h.unavailable(&first, "a").await;
    h.settle().await;
    assert_eq!(h.group.get(&lookup).key(), &second);

    h.unavailable(&second, "b").await;
    h.settle().await;
    assert!(matches!(h.group.get(&lookup), ClientHandle::Closed(k) if k == lookup));
}

#[tokio::test]
async fn test_snapshot_is_stable() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.settle().await;

    let before = h.group.snapshot();
    h.unavailable(&k, "a").await;
    h.settle().await;

    assert_eq!(before.applied_events(), 1);
    assert_eq!(before.live_partitions(), 1);
    assert_eq!(h.group.snapshot().live_partitions(), 0);
    assert_eq!(h.group.snapshot().partition_keys(), vec![k]);
}

#[tokio::test]
async fn test_close_closes_live_clients_once() {
    let h = GroupHarness::new();
    let a = key(&[("shard", "1")]);
    let b = key(&[("shard", "2")]);
    let c = key(&[("shard", "3")]);
    for k in [&a, &b, &c] {
        h.available(k, "addr").await;
    }
    h.settle().await;
    h.group.get(&a).request(Request::get("/")).await.unwrap();
    h.group.get(&b).request(Request::get("/")).await.unwrap();

    let (first, second) = tokio::join!(h.group.close(), h.group.close());
    assert_eq!(first, second);
    assert!(first.is_clean());
    assert_eq!(first.closed, 3);
    // Only constructed clients are closed, each exactly once.
    assert_eq!(h.log.closed_count(), 2);

    let third = h.group.close().await;
    assert_eq!(third, first);
    assert_eq!(h.log.closed_count(), 2);

    assert!(h.group.is_closed());
    assert!(h.group.snapshot().is_closed());
    for k in [&a, &b, &c] {
        let err = h.group.get(k).request(Request::get("/")).await.unwrap_err();
        assert_eq!(err, ClientError::ClosedPartition { key: k.clone() });
    }
    assert!(h.group.get(&key(&[("shard", "9")])).is_unknown());
    tokio::time::timeout(Duration::from_secs(1), h.group.on_close())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_close_reports_failures() {
    let h = GroupHarness::new();
    h.log.fail_close.store(true, Ordering::SeqCst);
    let a = key(&[("shard", "1")]);
    let b = key(&[("shard", "2")]);
    h.available(&a, "x").await;
    h.available(&b, "y").await;
    h.settle().await;
    h.group.get(&a).request(Request::get("/")).await.unwrap();

    let report = h.group.close().await;
    assert!(!report.is_clean());
    assert!(!report.timed_out);
    assert_eq!(report.closed, 1);
    assert_eq!(
        report.failures,
        vec![(a, ClientError::Internal("close failed".to_string()))]
    );
}

#[tokio::test]
async fn test_close_stops_consuming_discovery() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.group.close().await;

    // The consumer is gone, so the feed no longer accepts events.
    tokio::time::timeout(Duration::from_secs(1), async {
        while !h.sender.is_closed() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert!(h.sender.available(k.clone(), "a".to_string()).await.is_err());
    assert!(h.group.get(&k).is_unknown());
}

#[tokio::test]
async fn test_on_close_waits_for_close() {
    let h = GroupHarness::new();
    let waited = tokio::time::timeout(Duration::from_millis(20), h.group.on_close()).await;
    assert!(waited.is_err());

    let (_, report) = tokio::join!(h.group.on_close(), h.group.close());
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_close_bounded_by_timeout() {
    use async_trait::async_trait;
    use shardline::core::discovery::{AddressFeed, discovery_channel};
    use shardline::core::partition::PartitionKey;
    use shardline::core::protocol::Response;
    use shardline::core::{PartitionClient, PartitionedClientGroup};

    struct StuckClient;

    #[async_trait]
    impl PartitionClient for StuckClient {
        type Connection = ();

        async fn request(&self, _request: Request) -> Result<Response, ClientError> {
            Ok(Response::ok("stuck"))
        }

        async fn reserve_connection(&self, _request: &Request) -> Result<(), ClientError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ClientError> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    let (sender, feed) = discovery_channel(8);
    let config = GroupConfig {
        close_timeout: Duration::from_millis(50),
    };
    let group = PartitionedClientGroup::new(
        feed,
        |_key: PartitionKey, _feed: AddressFeed<String>| async {
            Ok::<_, ClientError>(StuckClient)
        },
        &config,
    );
    let k = key(&[("shard", "1")]);
    sender.available(k.clone(), "a".to_string()).await.unwrap();
    super::test_helpers::wait_for_applied(&group, 1).await;
    group.get(&k).request(Request::get("/")).await.unwrap();

    let report = group.close().await;
    assert!(report.timed_out);
    assert_eq!(report.closed, 0);
    assert!(group.get(&k).is_closed());
}

#[tokio::test]
async fn test_feed_error_keeps_existing_partitions() {
    let h = GroupHarness::new();
    let k = key(&[("shard", "1")]);
    h.available(&k, "a").await;
    h.settle().await;

    h.sender
        .clone()
        .fail(ClientError::Internal("discovery backend lost".to_string()))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !h.sender.is_closed() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    assert!(h.group.get(&k).request(Request::get("/")).await.is_ok());
    let report = h.group.close().await;
    assert_eq!(report.closed, 1);
}
