mod support;

use std::sync::Arc;
use std::time::Duration;

use relaycast::{AutoGroup, AutoGroupUpdate, Config, Directory, EventKind, ServerId};

use support::{
    FakeDiscovery, MemoryDirectory, RecordingTransport, advance, harness_with, init_tracing,
};

fn fast() -> Config {
    Config {
        join_interval: Duration::from_secs(10),
        join_settle: Duration::from_secs(1),
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn joins_matching_candidates_until_exhausted() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let h = harness_with(fast(), RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(FakeDiscovery::new(
        directory.clone(),
        &[(1, "alpha-1"), (2, "beta-2"), (3, "alpha-3")],
    ));

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();

    // The first attempt waits one full interval.
    advance(Duration::from_secs(9)).await;
    assert!(discovery.joined().is_empty());

    advance(Duration::from_secs(3)).await;
    assert_eq!(discovery.joined(), vec![ServerId(1)]);
    assert_eq!(group.join_count(), 1);

    advance(Duration::from_secs(40)).await;
    assert_eq!(discovery.joined(), vec![ServerId(1), ServerId(3)]);
    assert_eq!(group.join_count(), 2);
    assert!(discovery.is_closed());
    assert_eq!(directory.servers().len(), 2);
    assert_eq!(h.engine.bus().listener_count(EventKind::GroupJoinTick), 0);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn stops_at_discovery_limit() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let h = harness_with(fast(), RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(
        FakeDiscovery::new(directory.clone(), &[(1, "alpha-1"), (2, "alpha-2")]).with_limit(1),
    );

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(60)).await;
    assert_eq!(discovery.joined(), vec![ServerId(1)]);
    assert_eq!(group.join_count(), 1);
    assert!(!discovery.is_closed());
    assert_eq!(h.engine.bus().listener_count(EventKind::GroupJoinTick), 0);

    h.engine.close().await;
    assert!(discovery.is_closed());
}

#[tokio::test(start_paused = true)]
async fn existing_membership_counts_without_joining() {
    init_tracing();
    let directory = MemoryDirectory::new();
    directory.add_server(1, "alpha-1");
    let h = harness_with(fast(), RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(FakeDiscovery::new(directory.clone(), &[(1, "alpha-1")]));

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(11)).await;
    assert!(discovery.joined().is_empty());
    assert_eq!(group.join_count(), 1);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn invisible_server_is_not_counted() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let h = harness_with(fast(), RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(
        FakeDiscovery::new(directory.clone(), &[(5, "alpha-5"), (6, "alpha-6")]).with_ghost(5),
    );

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(12)).await;
    assert_eq!(discovery.joined(), vec![ServerId(5)]);
    assert_eq!(group.join_count(), 0);

    advance(Duration::from_secs(11)).await;
    assert_eq!(discovery.joined(), vec![ServerId(5), ServerId(6)]);
    assert_eq!(group.join_count(), 1);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn refused_join_is_not_counted() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let h = harness_with(fast(), RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(
        FakeDiscovery::new(directory.clone(), &[(7, "alpha-7"), (8, "alpha-8")])
            .with_refusal(7),
    );

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(12)).await;
    assert_eq!(discovery.joined(), vec![ServerId(7)]);
    assert_eq!(group.join_count(), 0);
    assert!(directory.servers().is_empty());
    assert_eq!(h.engine.bus().listener_count(EventKind::GroupJoinTick), 1);

    // The loop keeps going with the next candidate.
    advance(Duration::from_secs(11)).await;
    assert_eq!(discovery.joined(), vec![ServerId(7), ServerId(8)]);
    assert_eq!(group.join_count(), 1);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn server_cap_stops_joining() {
    init_tracing();
    let directory = MemoryDirectory::new();
    directory.add_server(1, "alpha-home");
    let cfg = Config {
        max_servers: 1,
        ..fast()
    };
    let h = harness_with(cfg, RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(FakeDiscovery::new(directory.clone(), &[(2, "alpha-2")]));

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(30)).await;
    assert!(discovery.joined().is_empty());
    assert_eq!(group.join_count(), 0);
    assert_eq!(h.engine.bus().listener_count(EventKind::GroupJoinTick), 0);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn join_count_survives_update() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let h = harness_with(fast(), RecordingTransport::new(), directory.clone());
    let discovery = Arc::new(FakeDiscovery::new(
        directory.clone(),
        &[(1, "alpha-1"), (2, "alpha-2")],
    ));

    let group = Arc::new(AutoGroup::new("alpha").with_discovery(discovery.clone()));
    h.engine.add_group(group.clone()).await.unwrap();
    advance(Duration::from_secs(12)).await;
    assert_eq!(group.join_count(), 1);

    group
        .update(AutoGroupUpdate::new().with_logging(true))
        .await
        .unwrap();
    assert!(group.logging());

    // The cursor continues with the next candidate instead of starting over.
    advance(Duration::from_secs(12)).await;
    assert_eq!(discovery.joined(), vec![ServerId(1), ServerId(2)]);
    assert_eq!(group.join_count(), 2);

    h.engine.close().await;
}
