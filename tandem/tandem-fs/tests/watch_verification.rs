//! Watch Pipeline Verification Tests
//!
//! Runs the full pipeline against a real temporary directory:
//! - File create / overwrite / delete reported as Create / Write / Remove
//! - Directory creation reported as a folder
//! - Close drains and closes both channels
//! - Registration failures surface from `watch()`
//!
//! OS notification sources may report extra events (several writes for one
//! `fs::write`, for instance), so assertions wait for the expected event and
//! tolerate anything else in between.

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::config::WatchConfig;
use tandem_core::prelude::*;
use tandem_fs::FsEndpoint;
use tempfile::TempDir;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

async fn create_watched_root() -> (TempDir, Arc<FsEndpoint>, WatchSession) {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("docs")).unwrap();

    let endpoint = FsEndpoint::open(temp_dir.path(), &WatchConfig::default())
        .await
        .unwrap();
    let session = endpoint.watch("/").await.unwrap();
    assert_eq!(session.state(), WatchState::Subscribed);

    // Give backends with asynchronous registration time to settle.
    tokio::time::sleep(Duration::from_millis(200)).await;
    (temp_dir, endpoint, session)
}

async fn wait_for(
    session: &mut WatchSession,
    what: &str,
    matches: impl Fn(&ChangeEvent) -> bool,
) -> ChangeEvent {
    let found = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match session.next_event().await {
                Some(event) if matches(&event) => return Some(event),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await;

    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("session closed while waiting for {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Every event up to and including the first one on `path`.
async fn collect_until(session: &mut WatchSession, path: &str) -> Vec<ChangeEvent> {
    let mut seen = Vec::new();
    let collected = tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(event) = session.next_event().await {
            let done = event.path == path;
            seen.push(event);
            if done {
                return true;
            }
        }
        false
    })
    .await;
    assert!(matches!(collected, Ok(true)), "no event on {path}");
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_lifecycle_events() {
    let (temp_dir, endpoint, mut session) = create_watched_root().await;
    let file = temp_dir.path().join("docs").join("readme.txt");

    fs::write(&file, "v1").unwrap();
    let created = wait_for(&mut session, "create", |e| {
        e.path == "/docs/readme.txt" && e.change_type == ChangeType::Create
    })
    .await;
    assert_eq!(created.is_folder, Some(false));
    let source = created.source.clone().unwrap();
    assert!(source.same_endpoint(&endpoint.source_ref()));
    assert!(source.upgrade().is_some());

    // The create may be stat'ed before the bytes land; a write follows then.
    if created.size != Some(2) {
        wait_for(&mut session, "v1 content", |e| {
            e.path == "/docs/readme.txt" && e.size == Some(2)
        })
        .await;
    }

    fs::write(&file, "v2").unwrap();
    let written = wait_for(&mut session, "write", |e| {
        e.path == "/docs/readme.txt" && e.change_type == ChangeType::Write && e.size == Some(2)
    })
    .await;
    assert_eq!(written.is_folder, Some(false));

    fs::remove_file(&file).unwrap();
    let removed = wait_for(&mut session, "remove", |e| {
        e.path == "/docs/readme.txt" && e.change_type == ChangeType::Remove
    })
    .await;
    assert!(removed.size.is_none());
    assert!(removed.is_folder.is_none());
    assert_eq!(removed.timestamp().len(), "2024-01-01T00:00:00.000Z".len());

    session.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_create_is_folder() {
    let (temp_dir, _endpoint, mut session) = create_watched_root().await;

    fs::create_dir(temp_dir.path().join("docs").join("photos")).unwrap();
    let created = wait_for(&mut session, "folder create", |e| {
        e.path == "/docs/photos" && e.change_type == ChangeType::Create
    })
    .await;
    assert_eq!(created.is_folder, Some(true));

    session.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_files_are_not_reported() {
    let (temp_dir, _endpoint, mut session) = create_watched_root().await;

    fs::write(temp_dir.path().join("docs").join(".readme.txt.swp"), "swap").unwrap();
    fs::write(temp_dir.path().join("docs").join("kept.txt"), "k").unwrap();

    // Delivery is in order, so the swap file would show up before this point.
    let events = collect_until(&mut session, "/docs/kept.txt").await;
    for event in &events {
        assert!(!event.path.ends_with(".swp"), "ignored path reported: {}", event.path);
    }

    session.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_drains_and_closes_channels() {
    let (temp_dir, endpoint, mut session) = create_watched_root().await;

    fs::write(temp_dir.path().join("docs").join("a.txt"), "a").unwrap();
    wait_for(&mut session, "create", |e| e.path == "/docs/a.txt").await;

    session.close();
    tokio::time::timeout(EVENT_TIMEOUT, session.closed())
        .await
        .expect("session did not close");
    assert_eq!(session.state(), WatchState::Closed);

    while session.next_event().await.is_some() {}
    assert!(session.next_error().await.is_none());

    // The sub-path is free again once the session is closed.
    let again = endpoint.watch("/").await.unwrap();
    again.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sub_path_watch() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("docs")).unwrap();
    fs::create_dir_all(temp_dir.path().join("other")).unwrap();

    let endpoint = FsEndpoint::open(temp_dir.path(), &WatchConfig::default())
        .await
        .unwrap();
    let mut session = endpoint.watch("/docs").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(temp_dir.path().join("other").join("skip.txt"), "x").unwrap();
    fs::write(temp_dir.path().join("docs").join("seen.txt"), "y").unwrap();

    // Paths stay relative to the endpoint root, not to the sub-path.
    let events = collect_until(&mut session, "/docs/seen.txt").await;
    for event in &events {
        assert!(event.path.starts_with("/docs"), "unexpected {}", event.path);
    }
    let seen = events.last().unwrap();
    assert_eq!(seen.change_type, ChangeType::Create);

    session.close();
}

#[tokio::test]
async fn test_watch_missing_path_fails() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = FsEndpoint::open(temp_dir.path(), &WatchConfig::default())
        .await
        .unwrap();

    let err = endpoint.watch("/does/not/exist").await.unwrap_err();
    assert!(matches!(err, TandemError::Subscription { .. }));

    // A failed registration does not hold the sub-path.
    let err = endpoint.watch("/does/not/exist").await.unwrap_err();
    assert!(matches!(err, TandemError::Subscription { .. }));
}

#[tokio::test]
async fn test_open_missing_root_is_unreachable() {
    let temp_dir = TempDir::new().unwrap();
    let err = FsEndpoint::open(temp_dir.path().join("gone"), &WatchConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TandemError::Unreachable { .. }));
}
