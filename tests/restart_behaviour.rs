// tests/restart_behaviour.rs

//! Restart semantics: full stop before the new start, fresh buffers, and
//! rejection of concurrent starts while the old instance winds down.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use procwatch::errors::ProcwatchError;
use procwatch::proc::types::ServiceStatus;
use procwatch_test_utils::builders::SupervisorBuilder;
use procwatch_test_utils::events::wait_for_status;
use procwatch_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn restart_fully_stops_the_old_instance_before_starting_the_new_one() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("svc", "echo started; sleep 30")
        .build();

    let mut status_rx = sup.subscribe_status();
    sup.start("svc").await.unwrap();
    let old_pid = with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Running))
        .await
        .pid
        .unwrap();

    let summary = with_timeout(sup.restart("svc")).await.unwrap();
    assert!(summary.status.is_active());

    // Every transition of the old instance precedes every transition of the
    // new one on the feed: stopping, stopped, then a fresh starting/running.
    let stopping =
        with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Stopping)).await;
    assert_eq!(stopping.pid, Some(old_pid));
    with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Stopped)).await;
    let starting =
        with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Starting)).await;
    let new_pid = starting.pid.unwrap();
    assert_ne!(new_pid, old_pid);
    with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Running)).await;

    with_timeout(sup.shutdown_all()).await.unwrap();
}

#[tokio::test]
async fn restart_clears_the_previous_instances_logs() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("svc", "echo started; sleep 30")
        .build();

    let mut status_rx = sup.subscribe_status();
    sup.start("svc").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Running)).await;
    with_timeout(async {
        while sup.logs("svc").unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    with_timeout(sup.restart("svc")).await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "svc", ServiceStatus::Running)).await;
    with_timeout(async {
        while sup.logs("svc").unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    // Exactly one "started" line: the new instance's, not accumulated history.
    let logs = sup.logs("svc").unwrap();
    let count = logs.iter().filter(|e| e.data == "started").count();
    assert_eq!(count, 1);

    with_timeout(sup.shutdown_all()).await.unwrap();
}

#[tokio::test]
async fn restart_works_from_a_terminal_state() {
    init_tracing();
    let sup = SupervisorBuilder::new()
        .with_command("oneshot", "echo done")
        .build();

    let mut status_rx = sup.subscribe_status();
    sup.start("oneshot").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "oneshot", ServiceStatus::Stopped)).await;

    // No running instance: restart degenerates to a plain start.
    with_timeout(sup.restart("oneshot")).await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "oneshot", ServiceStatus::Stopped)).await;
}

#[tokio::test]
async fn start_during_an_in_flight_restart_is_rejected() {
    init_tracing();
    // SIGTERM-deaf service keeps the restart inside its stop phase for a
    // while, leaving room to race a start against it.
    let sup = Arc::new(
        SupervisorBuilder::new()
            .with_command("slow", "trap '' TERM; while :; do sleep 0.1; done")
            .grace_period(Duration::from_secs(2))
            .build(),
    );

    let mut status_rx = sup.subscribe_status();
    sup.start("slow").await.unwrap();
    with_timeout(wait_for_status(&mut status_rx, "slow", ServiceStatus::Running)).await;

    let restart = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.restart("slow").await }
    });

    with_timeout(wait_for_status(&mut status_rx, "slow", ServiceStatus::Stopping)).await;
    assert!(matches!(
        sup.start("slow").await,
        Err(ProcwatchError::AlreadyStopping(_))
    ));

    let summary = with_timeout(async { restart.await.unwrap() }).await.unwrap();
    assert!(summary.status.is_active());
    with_timeout(sup.shutdown_all()).await.unwrap();
}
