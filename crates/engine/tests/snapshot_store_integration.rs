mod support;

use std::time::Duration;

use inkstone_engine::backend::BackendError;
use inkstone_engine::error::SessionError;
use inkstone_engine::session::SessionNotice;
use support::{chapter, next_notice, open, settle, MockBackend};

#[tokio::test(start_paused = true)]
async fn create_saves_buffer_first() {
    let backend = MockBackend::with_chapter(chapter("v1"));
    let session = open(&backend).await;

    session.commit("v1 with edits").await.unwrap();
    let snapshot = session.create_snapshot(Some("Before the duel".into())).await.expect("snapshot should be created");

    assert_eq!(snapshot.label.as_deref(), Some("Before the duel"));
    let stored = session.get_snapshot(snapshot.id).await.unwrap();
    assert_eq!(stored.content.as_deref(), Some("v1 with edits"));
    assert_eq!(backend.calls(), vec!["update:v1 with edits".to_string(), "snapshot:Before the duel".to_string()]);

    // The pending debounce was consumed by the pre-snapshot save.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unlabeled_snapshot_gets_timestamped_label() {
    let backend = MockBackend::with_chapter(chapter("v1"));
    let session = open(&backend).await;

    let snapshot = session.create_snapshot(None).await.unwrap();
    let label = snapshot.label.expect("label should be filled in");
    assert!(label.starts_with("Manual snapshot - "), "unexpected label {label}");
}

#[tokio::test(start_paused = true)]
async fn rollback_replaces_whole_buffer() {
    let backend = MockBackend::with_chapter(chapter("v1"));
    let session = open(&backend).await;
    let mut notices = session.notices();

    let snapshot = session.create_snapshot(None).await.unwrap();
    session.commit("v1 plus a scene that gets thrown away").await.unwrap();
    let before = session.view().revision;

    session.rollback(snapshot.id).await.expect("rollback should succeed");
    assert_eq!(session.text(), "v1");
    assert!(session.view().revision > before);

    let rolled_back = next_notice(&mut notices, |notice| match notice {
        SessionNotice::RolledBack { snapshot_id } => Some(snapshot_id),
        _ => None,
    })
    .await;
    assert_eq!(rolled_back, snapshot.id);

    // The discarded edit's debounced save never fires.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.stored_content(), "v1");
    assert!(!backend.saves().iter().any(|s| s.contains("thrown away")));
}

#[tokio::test(start_paused = true)]
async fn rollback_cancels_active_stream() {
    let backend = MockBackend::with_chapter(chapter("v1"));
    let snapshot_id = backend.insert_snapshot("v0", "Earlier");
    let tokens = backend.push_stream();
    let session = open(&backend).await;

    session.start_continuation(None).await.unwrap();
    tokens.send(Ok("generated".into())).await.unwrap();
    settle().await;

    session.rollback(snapshot_id).await.unwrap();
    let _ = tokens.send(Ok(" more".into())).await;
    settle().await;

    assert_eq!(session.text(), "v0");
    assert!(!session.view().streaming);
}

#[tokio::test(start_paused = true)]
async fn failed_rollback_leaves_buffer() {
    let backend = MockBackend::with_chapter(chapter("v1"));
    let session = open(&backend).await;

    let error = session.rollback(404).await.expect_err("unknown snapshot should fail");
    assert!(matches!(error, SessionError::Backend(BackendError::Status { status: 404, .. })));
    assert_eq!(session.text(), "v1");
}

#[tokio::test(start_paused = true)]
async fn failed_rollback_keeps_pending_save_and_stream() {
    let backend = MockBackend::with_chapter(chapter("v1"));
    let tokens = backend.push_stream();
    let session = open(&backend).await;

    session.commit("v1 plus unsaved edits").await.unwrap();
    session.start_continuation(None).await.unwrap();
    session.rollback(404).await.expect_err("unknown snapshot should fail");

    assert_eq!(session.text(), "v1 plus unsaved edits");
    assert!(session.view().streaming, "stream should survive a failed rollback");

    tokens.send(Ok("more".into())).await.unwrap();
    settle().await;
    assert_eq!(session.text(), "v1 plus unsaved edits\nmore");

    session.close().await;
    assert_eq!(backend.stored_content(), "v1 plus unsaved edits\nmore");
}

#[tokio::test(start_paused = true)]
async fn list_is_newest_first_and_delete_removes() {
    let backend = MockBackend::with_chapter(chapter("v3"));
    let first = backend.insert_snapshot("v1", "First");
    let second = backend.insert_snapshot("v2", "Second");
    let session = open(&backend).await;

    let listed = session.list_snapshots().await.unwrap();
    assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second, first]);
    assert!(listed.iter().all(|s| s.content.is_none()));

    session.delete_snapshot(second).await.expect("delete should succeed");
    let listed = session.list_snapshots().await.unwrap();
    assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![first]);

    // Rollback does not delete the snapshot it restored.
    session.rollback(first).await.unwrap();
    assert_eq!(session.list_snapshots().await.unwrap().len(), 1);
}
