// tests/log_stream.rs

//! Log subscription semantics: snapshot-then-live with exactly-once
//! per-subscriber delivery, pending subscriptions, eviction.

#![cfg(unix)]

use procwatch::proc::types::ServiceStatus;
use procwatch_test_utils::builders::{ServiceConfigBuilder, SupervisorBuilder};
use procwatch_test_utils::events::wait_for_status;
use procwatch_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn late_subscriber_gets_snapshot_then_live_with_no_gap_or_duplicate() {
    init_tracing();
    // Two lines, a pause we can subscribe inside, then three more.
    let sup = SupervisorBuilder::new()
        .with_command(
            "talker",
            "echo a; echo b; sleep 0.5; echo c; echo d; echo e",
        )
        .build();

    let mut status_rx = sup.subscribe_status();
    sup.start("talker").await.unwrap();

    // Wait until the first two lines are buffered, then attach mid-stream.
    with_timeout(async {
        while sup.logs("talker").unwrap().len() < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await;

    let mut sub = sup.subscribe_logs("talker").unwrap();

    with_timeout(wait_for_status(&mut status_rx, "talker", ServiceStatus::Stopped)).await;

    let mut seen = Vec::new();
    for _ in 0..5 {
        let entry = with_timeout(async { sub.recv().await.unwrap() }).await;
        seen.push(entry.data.clone());
    }
    assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn subscription_before_first_start_is_held_pending() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("later", "echo hello")
        .build();

    // No instance exists yet; the subscription just waits.
    let mut sub = sup.subscribe_logs("later").unwrap();
    assert!(sup.logs("later").unwrap().is_empty());

    let mut status_rx = sup.subscribe_status();
    sup.start("later").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "later", ServiceStatus::Stopped)).await;

    let entry = with_timeout(async { sub.recv().await.unwrap() }).await;
    assert_eq!(entry.data, "hello");
}

#[tokio::test]
async fn subscription_survives_restart_without_replaying_old_history() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("again", "echo tick")
        .build();

    let mut status_rx = sup.subscribe_status();
    let mut sub = sup.subscribe_logs("again").unwrap();

    sup.start("again").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "again", ServiceStatus::Stopped)).await;
    sup.start("again").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "again", ServiceStatus::Stopped)).await;

    // One "tick" per run, delivered live; nothing replayed in between.
    let first = with_timeout(async { sub.recv().await.unwrap() }).await;
    let second = with_timeout(async { sub.recv().await.unwrap() }).await;
    assert_eq!(first.data, "tick");
    assert_eq!(second.data, "tick");
    assert!(sub.rx.try_recv().is_err());
}

#[tokio::test]
async fn unsubscribed_and_dropped_consumers_do_not_disturb_others() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("fan", "echo x; echo y")
        .build();

    let keeper = sup.subscribe_logs("fan").unwrap();
    let leaver = sup.subscribe_logs("fan").unwrap();
    let dropped = sup.subscribe_logs("fan").unwrap();

    leaver.unsubscribe();
    leaver.unsubscribe(); // idempotent
    drop(dropped);

    let mut status_rx = sup.subscribe_status();
    sup.start("fan").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "fan", ServiceStatus::Stopped)).await;

    let mut keeper = keeper;
    let first = with_timeout(async { keeper.recv().await.unwrap() }).await;
    let second = with_timeout(async { keeper.recv().await.unwrap() }).await;
    assert_eq!(first.data, "x");
    assert_eq!(second.data, "y");

    // Unsubscribe after the instance terminated is still safe.
    keeper.unsubscribe();
}

#[tokio::test]
async fn orphan_output_from_a_previous_instance_never_reaches_the_new_ring() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("first-run-done");
    // The first run leaves behind an orphan that writes to the inherited
    // stdout pipe long after the service itself exited; the second run is
    // quiet. The orphan's late line must not land in the new instance's
    // buffer.
    let cmd = "if [ -e \"$MARKER\" ]; then \
                   echo second; \
               else \
                   touch \"$MARKER\"; (sleep 1; echo stale) & echo first; \
               fi";
    let svc = ServiceConfigBuilder::new("orphaned", cmd)
        .env("MARKER", marker.to_str().unwrap())
        .build();
    let sup = SupervisorBuilder::new().with_service(svc).build();

    let mut status_rx = sup.subscribe_status();
    sup.start("orphaned").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "orphaned", ServiceStatus::Stopped)).await;

    sup.start("orphaned").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "orphaned", ServiceStatus::Stopped)).await;

    // Let the orphan's write come due before inspecting the buffer.
    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let lines: Vec<String> = sup
        .logs("orphaned")
        .unwrap()
        .iter()
        .map(|e| e.data.clone())
        .collect();
    assert_eq!(lines, vec!["second"]);
}

#[tokio::test]
async fn ring_eviction_caps_logs_at_capacity_keeping_newest() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("chatty", "i=1; while [ $i -le 50 ]; do echo line-$i; i=$((i+1)); done")
        .log_buffer_capacity(16)
        .build();

    let mut status_rx = sup.subscribe_status();
    sup.start("chatty").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "chatty", ServiceStatus::Stopped)).await;

    // Readers may still be draining the pipe after the exit is reaped.
    with_timeout(async {
        while sup
            .logs("chatty")
            .unwrap()
            .last()
            .map(|e| e.data != "line-50")
            .unwrap_or(true)
        {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await;

    let logs = sup.logs("chatty").unwrap();
    assert_eq!(logs.len(), 16);
    assert_eq!(logs.first().unwrap().data, "line-35");
    assert_eq!(logs.last().unwrap().data, "line-50");
}
