mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use relaycast::{
    ChannelId, Config, ContentSource, DeliveryFailure, Destinations, Group, ItemPhase, ItemSpec,
    Lifetime, Payload, Period, RemoveAfter, SendableItem, ServerId,
};

use support::{RecordingTransport, advance, harness};

fn every(secs: u64) -> Period {
    Period::fixed(Duration::from_secs(secs))
}

#[tokio::test(start_paused = true)]
async fn end_to_end_prunes_denied_destination() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);
    h.directory.add_text(11, "b", 1);

    let item = SendableItem::new(ItemSpec::text(
        "hello",
        every(15),
        Destinations::fixed([ChannelId(10), ChannelId(11)]),
    ));
    let group = Arc::new(
        Group::new(ServerId(1))
            .with_items(vec![item.clone()])
            .with_logging(true),
    );
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(1)).await;
    assert_eq!(h.transport.sent_to(10), 1);
    assert_eq!(h.transport.sent_to(11), 1);
    let saved = h.sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0.id, ServerId(1));
    assert_eq!(saved[0].1.successful.len(), 2);
    assert!(saved[0].1.failed.is_empty());

    h.transport
        .fail(10, DeliveryFailure::PermissionDenied("missing access".into()));
    advance(Duration::from_secs(15)).await;
    let saved = h.sink.saved();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].1.successful.len(), 1);
    assert_eq!(saved[1].1.failed.len(), 1);
    assert_eq!(saved[1].1.failed[0].channel.id, ChannelId(10));

    let ids: Vec<_> = item.destinations().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![ChannelId(11)]);

    // Next cycle only reaches the remaining destination.
    h.transport.heal(10);
    advance(Duration::from_secs(15)).await;
    assert_eq!(h.transport.sent_to(10), 1);
    assert_eq!(h.transport.sent_to(11), 3);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_keep_destination() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);

    let item = SendableItem::new(ItemSpec::text(
        "hi",
        every(5),
        Destinations::fixed([ChannelId(10)]),
    ));
    h.engine
        .add_group(Group::new(ServerId(1)).with_items(vec![item.clone()]))
        .await
        .unwrap();

    h.transport.fail(10, DeliveryFailure::Other("timeout".into()));
    advance(Duration::from_secs(11)).await;
    assert_eq!(h.transport.sent_to(10), 0);
    assert_eq!(item.destinations().len(), 1);
    assert_eq!(item.phase(), ItemPhase::Ready);

    h.transport.heal(10);
    advance(Duration::from_secs(5)).await;
    assert_eq!(h.transport.sent_to(10), 1);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn last_destination_pruned_removes_item() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);

    let item = SendableItem::new(ItemSpec::text(
        "hi",
        every(5),
        Destinations::fixed([ChannelId(10)]),
    ));
    let group = Arc::new(Group::new(ServerId(1)).with_items(vec![item.clone()]));
    h.engine.add_group(group.clone()).await.unwrap();

    h.transport.fail(10, DeliveryFailure::NotFound("deleted".into()));
    advance(Duration::from_secs(1)).await;

    assert!(group.items().is_empty());
    assert_eq!(group.removed_items().len(), 1);
    assert_eq!(item.phase(), ItemPhase::Closed);
    assert!(item.check_state());

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn counted_lifetime_removes_after_last_send() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);

    let item = SendableItem::new(
        ItemSpec::text("twice", every(5), Destinations::fixed([ChannelId(10)]))
            .with_remove_after(RemoveAfter::Sends(2)),
    );
    let group = Arc::new(Group::new(ServerId(1)).with_items(vec![item.clone()]));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(1)).await;
    assert_eq!(item.remaining(), Lifetime::Sends(1));

    advance(Duration::from_secs(20)).await;
    assert_eq!(h.transport.sent_to(10), 2);
    assert!(group.items().is_empty());
    assert_eq!(item.phase(), ItemPhase::Closed);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn producer_without_value_skips_cycle() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let content = ContentSource::producer(move || {
        // Only every other call has something to say.
        let n = counter.fetch_add(1, Ordering::SeqCst);
        (n % 2 == 1).then(|| Payload::from(format!("tick {n}")))
    });
    let item = SendableItem::new(
        ItemSpec::new(
            relaycast::ChannelKind::Text,
            content,
            every(5),
            Destinations::fixed([ChannelId(10)]),
        )
        .with_remove_after(RemoveAfter::Sends(1)),
    );
    let group = Arc::new(Group::new(ServerId(1)).with_items(vec![item.clone()]));
    h.engine.add_group(group.clone()).await.unwrap();

    advance(Duration::from_secs(1)).await;
    assert_eq!(h.transport.sent_to(10), 0);
    assert_eq!(item.remaining(), Lifetime::Sends(1));

    advance(Duration::from_secs(5)).await;
    assert_eq!(h.transport.sent_to(10), 1);
    assert_eq!(
        h.transport.deliveries()[0].payload,
        Payload::Text("tick 1".into())
    );
    assert!(group.items().is_empty());

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn session_released_between_destinations() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);
    h.directory.add_text(11, "b", 1);

    let item = SendableItem::new(ItemSpec::text(
        "hi",
        every(60),
        Destinations::fixed([ChannelId(10), ChannelId(11)]),
    ));
    h.engine
        .add_group(Group::new(ServerId(1)).with_items(vec![item]))
        .await
        .unwrap();

    advance(Duration::from_secs(1)).await;
    assert_eq!(h.transport.releases(), 2);

    // Closing the group releases the session once more.
    h.engine.close().await;
    assert_eq!(h.transport.releases(), 3);
}

#[tokio::test(start_paused = true)]
async fn logging_filters_to_channels_still_present() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);
    h.directory.add_text(11, "b", 1);

    let item = SendableItem::new(ItemSpec::text(
        "hi",
        every(10),
        Destinations::fixed([ChannelId(10), ChannelId(11)]),
    ));
    h.engine
        .add_group(
            Group::new(ServerId(1))
                .with_items(vec![item])
                .with_logging(true),
        )
        .await
        .unwrap();

    advance(Duration::from_secs(1)).await;
    assert_eq!(h.sink.saved().len(), 1);

    // Channel 10 disappears from the live directory but stays a destination.
    h.directory.remove_channel(10);
    advance(Duration::from_secs(10)).await;
    let saved = h.sink.saved();
    assert_eq!(saved.len(), 2);
    let logged: Vec<_> = saved[1].1.successful.iter().map(|c| c.id).collect();
    assert_eq!(logged, vec![ChannelId(11)]);
    assert_eq!(h.transport.sent_to(10), 2);

    h.engine.close().await;
}

#[tokio::test(start_paused = true)]
async fn logging_disabled_or_failing_sink_does_not_stop_sending() {
    let h = harness(Config::default(), RecordingTransport::new());
    h.directory.add_server(1, "home");
    h.directory.add_text(10, "a", 1);

    let quiet = SendableItem::new(ItemSpec::text(
        "quiet",
        every(10),
        Destinations::fixed([ChannelId(10)]),
    ));
    h.engine
        .add_group(Group::new(ServerId(1)).with_items(vec![quiet]))
        .await
        .unwrap();
    advance(Duration::from_secs(1)).await;
    assert!(h.sink.saved().is_empty());
    assert_eq!(h.transport.sent_to(10), 1);

    h.sink.set_failing(true);
    let loud = SendableItem::new(ItemSpec::text(
        "loud",
        every(10),
        Destinations::fixed([ChannelId(10)]),
    ));
    h.engine
        .add_group(
            Group::new(ServerId(1))
                .with_items(vec![loud])
                .with_logging(true),
        )
        .await
        .unwrap();
    advance(Duration::from_secs(11)).await;
    assert!(h.sink.saved().is_empty());
    assert_eq!(h.transport.sent_to(10), 4);

    h.engine.close().await;
}
