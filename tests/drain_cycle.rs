//! Integration tests for the drain-and-broadcast cycle
//!
//! The drain is exercised end-to-end: joins feed the relay queues through
//! the service, then a scheduler cycle drains, filters against watermarks,
//! and publishes authoritative batches.

mod common;

use std::time::Duration;

use seonchak::drain::DrainScheduler;
use seonchak::queue::RelayQueue;

use common::{harness, test_member, test_room, ROOM_ID};

fn drain_for(h: &common::Harness) -> DrainScheduler {
    DrainScheduler::new(
        h.backends.queue.clone(),
        h.backends.broadcaster.clone(),
        Duration::from_secs(3),
    )
}

#[tokio::test]
async fn test_watermark_equals_max_broadcast_rank() {
    let h = harness(2, 5);

    for member_id in 1..=5 {
        h.service.join(ROOM_ID, member_id).await.unwrap();
    }

    let drain = drain_for(&h);
    let stats = drain.run_once().await;

    assert_eq!(stats.rooms_drained, 1);
    assert_eq!(stats.entries_broadcast, 5);
    assert_eq!(h.backends.queue.watermark(ROOM_ID).await.unwrap(), 5);
}

#[tokio::test]
async fn test_drain_without_new_entries_is_a_no_op() {
    let h = harness(1, 2);

    h.service.join(ROOM_ID, 1).await.unwrap();
    h.service.join(ROOM_ID, 2).await.unwrap();

    let drain = drain_for(&h);
    drain.run_once().await;
    assert_eq!(h.backends.queue.watermark(ROOM_ID).await.unwrap(), 2);

    // Subscribe after the first cycle so only new broadcasts are observed
    let mut rx = h.broadcaster.subscribe();

    let stats = drain.run_once().await;
    assert_eq!(stats.rooms_drained, 0);
    assert_eq!(stats.entries_broadcast, 0);
    assert_eq!(h.backends.queue.watermark(ROOM_ID).await.unwrap(), 2);
    assert!(rx.try_recv().is_err(), "no broadcast expected");
}

#[tokio::test]
async fn test_joins_between_cycles_broadcast_only_the_delta() {
    let h = harness(1, 3);
    let drain = drain_for(&h);

    h.service.join(ROOM_ID, 1).await.unwrap();
    h.service.join(ROOM_ID, 2).await.unwrap();
    drain.run_once().await;

    h.service.join(ROOM_ID, 3).await.unwrap();

    let mut rx = h.broadcaster.subscribe();
    let stats = drain.run_once().await;
    assert_eq!(stats.entries_broadcast, 1);

    let message = rx.recv().await.unwrap();
    assert_eq!(message.batch.len(), 1);
    assert_eq!(message.batch[0].rank, 3);
    assert_eq!(h.backends.queue.watermark(ROOM_ID).await.unwrap(), 3);
}

#[tokio::test]
async fn test_malformed_entry_does_not_fail_the_cycle_for_other_rooms() {
    let h = harness(1, 4);

    // A second room served by the same backends
    const OTHER_ROOM: i64 = 2;
    h.rooms.insert(test_room(OTHER_ROOM, 1));
    h.members.insert(test_member(10));

    h.service.join(ROOM_ID, 1).await.unwrap();
    h.backends
        .queue
        .push(ROOM_ID, "definitely not json")
        .await
        .unwrap();
    h.service.join(ROOM_ID, 2).await.unwrap();
    h.service.join(OTHER_ROOM, 10).await.unwrap();

    let mut rx = h.broadcaster.subscribe();
    let drain = drain_for(&h);
    let stats = drain.run_once().await;

    assert_eq!(stats.rooms_drained, 2);
    assert_eq!(stats.rooms_failed, 0);
    assert_eq!(stats.malformed_entries, 1);
    assert_eq!(stats.entries_broadcast, 3);

    // Both valid entries of room 1 made it out
    let first = rx.recv().await.unwrap();
    assert_eq!(first.room_id, ROOM_ID);
    let ranks: Vec<i64> = first.batch.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2]);

    // The other room was drained in the same tick
    let second = rx.recv().await.unwrap();
    assert_eq!(second.room_id, OTHER_ROOM);
    assert_eq!(second.batch.len(), 1);
}

#[tokio::test]
async fn test_queues_are_empty_after_drain() {
    let h = harness(1, 2);

    h.service.join(ROOM_ID, 1).await.unwrap();
    h.service.join(ROOM_ID, 2).await.unwrap();

    let drain = drain_for(&h);
    drain.run_once().await;

    assert!(h.backends.queue.entries(ROOM_ID).await.unwrap().is_empty());
    assert!(h.backends.queue.active_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spawned_scheduler_picks_up_late_joins() {
    let h = harness(1, 2);

    let drain = DrainScheduler::new(
        h.backends.queue.clone(),
        h.backends.broadcaster.clone(),
        Duration::from_millis(50),
    );
    let handle = drain.spawn();

    h.service.join(ROOM_ID, 1).await.unwrap();
    let mut rx = h.broadcaster.subscribe();
    h.service.join(ROOM_ID, 2).await.unwrap();

    // The periodic task eventually broadcasts an authoritative batch
    let message = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let message = rx.recv().await.unwrap();
            // Skip the join path's optimistic notices
            if message.batch.iter().any(|r| r.rank == 2) {
                break message;
            }
        }
    })
    .await
    .expect("authoritative batch within the interval");

    assert!(message.batch.iter().map(|r| r.rank).any(|rank| rank == 2));
    handle.shutdown().await;
    assert_eq!(h.backends.queue.watermark(ROOM_ID).await.unwrap(), 2);
}
