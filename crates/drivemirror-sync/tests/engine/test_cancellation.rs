//! Cooperative cancellation

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::{self, FakeStorage, SOURCE_ROOT};

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_does_nothing() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_folder(SOURCE_ROOT, "Sub");

    let token = CancellationToken::new();
    token.cancel();
    let engine = common::engine(&storage, common::options(4)).with_cancellation(token);
    let report = engine.run(common::root_task()).await.expect("run");

    assert!(report.cancelled);
    assert!(report.converged.is_empty());
    assert!(storage.copy_calls().is_empty());
    assert!(storage.ensure_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_new_submissions() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_file(SOURCE_ROOT, "b.txt");
    storage.add_file(SOURCE_ROOT, "c.txt");
    storage.add_folder(SOURCE_ROOT, "Sub");

    let token = CancellationToken::new();
    storage.cancel_on_first_copy(token.clone());
    let engine = common::engine(&storage, common::options(1)).with_cancellation(token);
    let report = engine.run(common::root_task()).await.expect("run");

    assert!(report.cancelled);
    assert_eq!(storage.copy_calls().len(), 1);
    assert_eq!(report.stats.copied, 1);
    assert!(storage.ensure_calls().is_empty());
    assert!(!report.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_copies_finish_after_cancellation() {
    let storage = Arc::new(
        FakeStorage::new(Duration::from_secs(1)).with_copy_latency(Duration::from_millis(200)),
    );
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        storage.add_file(SOURCE_ROOT, name);
    }

    let token = CancellationToken::new();
    let engine = common::engine(&storage, common::options(2)).with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let report = engine.run(common::root_task()).await.expect("run");
    canceller.await.unwrap();

    assert!(report.cancelled);
    // both submissions already in flight when the token fired complete
    assert_eq!(storage.copy_calls().len(), 2);
    assert_eq!(report.stats.copied, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_propagation_wait() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");

    let token = CancellationToken::new();
    let engine = common::engine(&storage, common::options(4)).with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    });

    let started = tokio::time::Instant::now();
    let report = engine.run(common::root_task()).await.expect("run");
    canceller.await.unwrap();

    assert!(report.cancelled);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.stats.copied, 1);
}
