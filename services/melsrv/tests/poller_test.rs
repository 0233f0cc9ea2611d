//! Poller integration tests
//!
//! Drives a full poller against an in-memory PLC:
//! - connect retries and immediate first poll
//! - ASCII data code through the whole pipeline
//! - reconnect after a dropped connection
//! - aggregation windows and flush on shutdown
//! - giving up, storage failures and cancelling while reconnecting

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use melsrv::protocols::melsec::DataCode;
use melsrv::runtime::{spawn_poller, Poller, PollerState, ReconnectPolicy};
use melsrv::storage::BatchWriter;
use melsrv::MelsrvError;
use support::{output_files, settings, wait_for_status, FakePlc};

fn read_records(path: &std::path::Path) -> serde_json::Map<String, serde_json::Value> {
    let content: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    content.as_object().unwrap().clone()
}

// ============================================================================
// Connect and poll
// ============================================================================

#[tokio::test]
async fn test_polls_immediately_after_refused_connects() {
    let dir = tempfile::tempdir().unwrap();
    let plc = FakePlc::new(vec![42, 0x0001]).refusing(2);
    let poller = Poller::new(
        settings(Duration::from_secs(60), Duration::from_secs(60)),
        plc.clone(),
        BatchWriter::new(dir.path()),
    )
    .unwrap();
    let mut rx = poller.subscribe();
    let handle = spawn_poller(poller, CancellationToken::new());

    // one minute poll interval: only the immediate first tick can satisfy this
    let status = wait_for_status(&mut rx, Duration::from_secs(2), |s| s.polls >= 1).await;
    assert_eq!(status.connect_attempts, 3);
    assert!(status.connected);
    assert_eq!(plc.attempts(), 3);
    assert!(output_files(dir.path()).is_empty());

    handle.shutdown().await.unwrap();

    let final_status = rx.borrow().clone();
    assert_eq!(final_status.state, PollerState::ShuttingDown);
    assert!(!final_status.connected);
    assert_eq!(final_status.files_written, 1);

    let files = output_files(dir.path());
    assert_eq!(files.len(), 1);
    let records = read_records(&files[0]);
    assert_eq!(records.len(), 1);
    let record = records.values().next().unwrap();
    assert_eq!(record["source"], "press01");
    assert_eq!(record["counter"], 42);
    assert_eq!(record["running"], true);
    assert_eq!(record["fieldvalues"]["COUNT"]["value"], 42);
}

#[tokio::test]
async fn test_ascii_data_code_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let plc = FakePlc::new(vec![0x1234, 0x0001]).ascii();
    let mut config = settings(Duration::from_secs(60), Duration::from_secs(60));
    config.data_code = DataCode::Ascii;
    let poller = Poller::new(config, plc, BatchWriter::new(dir.path())).unwrap();
    let mut rx = poller.subscribe();
    let handle = spawn_poller(poller, CancellationToken::new());

    let status = wait_for_status(&mut rx, Duration::from_secs(2), |s| s.polls >= 1).await;
    assert_eq!(status.disconnect_count, 0);
    handle.shutdown().await.unwrap();

    let files = output_files(dir.path());
    assert_eq!(files.len(), 1);
    let records = read_records(&files[0]);
    let record = records.values().next().unwrap();
    assert_eq!(record["fieldvalues"]["COUNT"]["value"], 0x1234);
    assert_eq!(record["counter"], 0x1234);
    assert_eq!(record["running"], true);
}

#[tokio::test]
async fn test_reconnects_after_dropped_connection() {
    let dir = tempfile::tempdir().unwrap();
    let plc = FakePlc::new(vec![7, 0]).dropping_first_after(1);
    let poller = Poller::new(
        settings(Duration::from_millis(20), Duration::from_secs(60)),
        plc.clone(),
        BatchWriter::new(dir.path()),
    )
    .unwrap();
    let mut rx = poller.subscribe();
    let handle = spawn_poller(poller, CancellationToken::new());

    let status = wait_for_status(&mut rx, Duration::from_secs(3), |s| {
        s.disconnect_count >= 1 && s.polls >= 2
    })
    .await;
    assert!(status.last_error.is_some());
    assert!(plc.accepted() >= 2);

    handle.shutdown().await.unwrap();

    let polls = rx.borrow().polls;
    let files = output_files(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(read_records(&files[0]).len() as u64, polls);
}

// ============================================================================
// Batching
// ============================================================================

#[tokio::test]
async fn test_batches_follow_aggregation_window() {
    let dir = tempfile::tempdir().unwrap();
    let plc = FakePlc::new(vec![1, 1]);
    let poller = Poller::new(
        settings(Duration::from_millis(20), Duration::from_millis(100)),
        plc,
        BatchWriter::new(dir.path()),
    )
    .unwrap();
    let mut rx = poller.subscribe();
    let handle = spawn_poller(poller, CancellationToken::new());

    wait_for_status(&mut rx, Duration::from_secs(3), |s| s.files_written >= 2).await;
    handle.shutdown().await.unwrap();

    let status = rx.borrow().clone();
    let files = output_files(dir.path());
    assert_eq!(files.len() as u64, status.files_written);

    let total: usize = files.iter().map(|f| read_records(f).len()).sum();
    assert_eq!(total as u64, status.polls);
    for file in &files {
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("press01_"), "{name}");
    }
}

// ============================================================================
// Failure and shutdown paths
// ============================================================================

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let plc = FakePlc::new(vec![0, 0]).refusing(u32::MAX);
    let mut config = settings(Duration::from_millis(20), Duration::from_secs(60));
    config.reconnect = ReconnectPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..ReconnectPolicy::default()
    };
    let poller = Poller::new(config, plc.clone(), BatchWriter::new(dir.path())).unwrap();
    let handle = spawn_poller(poller, CancellationToken::new());

    let err = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, MelsrvError::ConnectionError(_)), "{err}");
    assert_eq!(plc.attempts(), 3);
    assert!(output_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unwritable_output_ends_poller() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    let plc = FakePlc::new(vec![3, 1]);
    let poller = Poller::new(
        settings(Duration::from_millis(20), Duration::from_millis(1)),
        plc,
        BatchWriter::new(blocker.join("out")),
    )
    .unwrap();
    let rx = poller.subscribe();
    let handle = spawn_poller(poller, CancellationToken::new());

    let err = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, MelsrvError::StorageError(_)), "{err}");

    let status = rx.borrow().clone();
    assert_eq!(status.state, PollerState::ShuttingDown);
    assert_eq!(status.files_written, 0);
    assert!(status.polls >= 2);
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn test_cancel_interrupts_reconnect_delay() {
    let dir = tempfile::tempdir().unwrap();
    let plc = FakePlc::new(vec![0, 0]).refusing(u32::MAX);
    let mut config = settings(Duration::from_millis(20), Duration::from_secs(60));
    config.reconnect = ReconnectPolicy::fixed(Duration::from_secs(30));
    let poller = Poller::new(config, plc, BatchWriter::new(dir.path())).unwrap();
    let mut rx = poller.subscribe();
    let cancel = CancellationToken::new();
    let handle = spawn_poller(poller, cancel.clone());

    wait_for_status(&mut rx, Duration::from_secs(2), |s| s.connect_attempts >= 1).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.borrow().connect_attempts, 1);
}

#[test]
fn test_rejects_invalid_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = settings(Duration::from_millis(20), Duration::from_secs(60));
    config.blocks[0].datafields[1].address = "0x2".to_string();

    let result = Poller::new(config, FakePlc::new(Vec::new()), BatchWriter::new(dir.path()));
    match result {
        Err(MelsrvError::BlockValidation(names)) => assert_eq!(names, vec!["RUN".to_string()]),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("layout outside the block was accepted"),
    }
}
