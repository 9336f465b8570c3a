//! Per-directory reconciliation behavior

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::domain::MirrorError;
use drivemirror_sync::DirectoryOutcome;

use crate::common::{self, FakeStorage, SOURCE_ROOT, TARGET_ROOT};

#[tokio::test(start_paused = true)]
async fn test_copies_only_missing_files() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_file(SOURCE_ROOT, "b.txt");
    storage.add_file(TARGET_ROOT, "a.txt");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 1 });
    assert_eq!(storage.copy_calls(), vec!["b.txt".to_string()]);
    assert_eq!(engine.stats().snapshot().copied, 1);
    assert_eq!(engine.stats().snapshot().retried, 0);
    assert_eq!(storage.visible_names(TARGET_ROOT), vec!["a.txt", "b.txt"]);
}

#[tokio::test(start_paused = true)]
async fn test_complete_directory_needs_no_copies() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_file(TARGET_ROOT, "a.txt");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 0 });
    assert!(storage.copy_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_run_is_a_no_op() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_file(SOURCE_ROOT, "b.txt");

    let first = common::engine(&storage, common::options(4));
    first.run(common::root_task()).await.expect("first run");
    assert_eq!(first.stats().snapshot().copied, 2);

    let second = common::engine(&storage, common::options(4));
    let report = second.run(common::root_task()).await.expect("second run");
    assert_eq!(second.stats().snapshot().copied, 0);
    assert_eq!(storage.copy_calls().len(), 2);
    assert!(report.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_slow_propagation_is_resubmitted_then_converges() {
    // visible 4s after submission, first wait is only 3s
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(4)));
    storage.add_file(SOURCE_ROOT, "slow.bin");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 2 });
    assert_eq!(storage.copy_calls(), vec!["slow.bin", "slow.bin"]);
    let stats = engine.stats().snapshot();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.copied, 2);
    assert_eq!(stats.incomplete_directories, 0);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_rejection_exhausts_rounds() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "bad.txt");
    storage.add_file(SOURCE_ROOT, "good.txt");
    storage.reject_copies_of("bad.txt");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Exhausted { missing: 1 });
    let stats = engine.stats().snapshot();
    assert_eq!(stats.copied, 1);
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.retried, 3);
    assert_eq!(stats.incomplete_directories, 1);
    let bad_submissions = storage
        .copy_calls()
        .iter()
        .filter(|name| *name == "bad.txt")
        .count();
    assert_eq!(bad_submissions, 4);
}

#[tokio::test(start_paused = true)]
async fn test_name_taken_by_folder_counts_as_present() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "notes");
    storage.add_folder(TARGET_ROOT, "notes");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 0 });
    assert!(storage.copy_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_items_of_other_kind_are_ignored() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_other(SOURCE_ROOT, "Notebook");
    storage.add_file(SOURCE_ROOT, "a.txt");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 1 });
    assert!(result.subfolders.is_empty());
    assert_eq!(storage.copy_calls(), vec!["a.txt"]);
}

#[tokio::test(start_paused = true)]
async fn test_subfolders_are_returned_sorted() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_folder(SOURCE_ROOT, "Zeta");
    storage.add_folder(SOURCE_ROOT, "Alpha");
    storage.add_folder(SOURCE_ROOT, "Mid");

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    let names: Vec<_> = result.subfolders.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);
}

#[tokio::test(start_paused = true)]
async fn test_target_listing_failure_is_retried() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.fail_listing(TARGET_ROOT, 1);

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 1 });
    assert_eq!(engine.stats().snapshot().retried, 0);
    assert_eq!(engine.stats().snapshot().copied, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unlistable_source_is_skipped() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_folder(SOURCE_ROOT, "Sub");
    storage.fail_listing(SOURCE_ROOT, 100);

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Unlisted);
    assert!(result.subfolders.is_empty());
    assert!(storage.copy_calls().is_empty());
    assert_eq!(engine.stats().snapshot().incomplete_directories, 1);
}

#[tokio::test(start_paused = true)]
async fn test_source_listing_recovers_within_budget() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.fail_listing(SOURCE_ROOT, 2);

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_aborts() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.fail_auth_on_copy();

    let engine = common::engine(&storage, common::options(4));
    let err = engine
        .reconcile_directory(&common::root_task())
        .await
        .unwrap_err();

    assert!(matches!(err, MirrorError::AuthFailure(_)));
}

#[tokio::test(start_paused = true)]
async fn test_copy_concurrency_is_bounded_by_workers() {
    let storage = Arc::new(
        FakeStorage::new(Duration::from_secs(1)).with_copy_latency(Duration::from_millis(100)),
    );
    for i in 0..20 {
        storage.add_file(SOURCE_ROOT, &format!("file-{i:02}.dat"));
    }

    let engine = common::engine(&storage, common::options(3));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Converged { copy_rounds: 1 });
    assert_eq!(storage.max_in_flight(), 3);
    assert_eq!(engine.stats().snapshot().copied, 20);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_target_exhausts_but_keeps_subfolders() {
    let storage = Arc::new(FakeStorage::new(Duration::from_secs(1)));
    storage.add_file(SOURCE_ROOT, "a.txt");
    storage.add_folder(SOURCE_ROOT, "Sub");
    storage.fail_listing(TARGET_ROOT, 100);

    let engine = common::engine(&storage, common::options(4));
    let result = engine
        .reconcile_directory(&common::root_task())
        .await
        .expect("reconciled");

    assert_eq!(result.outcome, DirectoryOutcome::Exhausted { missing: 1 });
    assert_eq!(result.subfolders.len(), 1);
    assert!(storage.copy_calls().is_empty());
}
