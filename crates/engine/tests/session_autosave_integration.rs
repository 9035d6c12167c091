mod support;

use std::time::Duration;

use inkstone_engine::backend::BackendError;
use inkstone_engine::config::EditorConfig;
use inkstone_engine::error::{RejectReason, SessionError};
use inkstone_engine::session::SessionNotice;
use support::{chapter, next_notice, open, open_with, settle, MockBackend};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn debounced_save_persists_text_at_fire_time() {
    let backend = MockBackend::with_chapter(chapter(""));
    let session = open(&backend).await;

    session.commit("A").await.expect("commit should apply");
    sleep(Duration::from_secs(1)).await;
    session.commit("AB").await.expect("commit should apply");

    // 3.5s after "A" but only 2.5s after "AB": the first deadline was replaced.
    sleep(Duration::from_millis(2_500)).await;
    assert!(backend.saves().is_empty());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.saves(), vec!["AB".to_string()]);
    assert_eq!(backend.stored_content(), "AB");
}

#[tokio::test(start_paused = true)]
async fn commit_updates_view_and_char_count() {
    let backend = MockBackend::with_chapter(chapter("天地"));
    let session = open(&backend).await;
    assert_eq!(session.view().char_count, 2);

    let revision = session.commit("天地玄黄").await.expect("commit should apply");
    let view = session.view();
    assert_eq!(view.text, "天地玄黄");
    assert_eq!(view.char_count, 4);
    assert_eq!(view.revision, revision);

    // Identical text is not a mutation.
    assert_eq!(session.commit("天地玄黄").await.unwrap(), revision);
}

#[tokio::test(start_paused = true)]
async fn manual_save_cancels_pending_debounce() {
    let backend = MockBackend::with_chapter(chapter("draft"));
    let session = open(&backend).await;

    session.commit("draft, revised").await.unwrap();
    session.save().await.expect("manual save should succeed");
    assert_eq!(backend.saves(), vec!["draft, revised".to_string()]);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.saves().len(), 1, "debounced save should have been cancelled");
}

#[tokio::test(start_paused = true)]
async fn manual_save_failure_is_returned() {
    let backend = MockBackend::with_chapter(chapter("draft"));
    backend.state().failing_saves = 1;
    let session = open(&backend).await;

    session.commit("draft, revised").await.unwrap();
    let error = session.save().await.expect_err("save should fail");
    assert_eq!(error, SessionError::Backend(BackendError::Transport("connection reset".into())));
}

#[tokio::test(start_paused = true)]
async fn debounced_save_failure_becomes_notice() {
    let backend = MockBackend::with_chapter(chapter("draft"));
    backend.state().failing_saves = 1;
    let session = open(&backend).await;
    let mut notices = session.notices();

    session.commit("draft, revised").await.unwrap();
    sleep(Duration::from_secs(4)).await;

    let message = next_notice(&mut notices, |notice| match notice {
        SessionNotice::SaveFailed { message } => Some(message),
        _ => None,
    })
    .await;
    assert!(message.contains("connection reset"));

    // The session keeps working; the next edit saves normally.
    session.commit("draft, revised again").await.unwrap();
    sleep(Duration::from_secs(4)).await;
    assert_eq!(backend.stored_content(), "draft, revised again");
}

#[tokio::test(start_paused = true)]
async fn autosave_window_follows_config() {
    let backend = MockBackend::with_chapter(chapter(""));
    let config = EditorConfig { autosave_ms: 1_000, ..EditorConfig::default() };
    let session = open_with(&backend, config).await;

    session.commit("quick").await.unwrap();
    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(backend.saves(), vec!["quick".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn close_flushes_pending_save() {
    let backend = MockBackend::with_chapter(chapter(""));
    let session = open(&backend).await;

    session.commit("typed just before closing").await.unwrap();
    session.close().await;
    assert_eq!(backend.saves(), vec!["typed just before closing".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_still_flushes() {
    let backend = MockBackend::with_chapter(chapter(""));
    let session = open(&backend).await;

    session.commit("unsaved").await.unwrap();
    drop(session);
    settle().await;
    assert_eq!(backend.saves(), vec!["unsaved".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn rewrite_replaces_selection_and_saves() {
    let backend = MockBackend::with_chapter(chapter("天地玄黄，宇宙洪荒。"));
    backend.state().rewrites.push_back(Ok("乾坤浩渺".into()));
    let session = open(&backend).await;

    let rewritten = session.rewrite_selection(0..4, "更华丽一些").await.expect("rewrite should apply");
    assert_eq!(rewritten, "乾坤浩渺");
    assert_eq!(session.text(), "乾坤浩渺，宇宙洪荒。");

    let request = backend.state().rewrite_requests[0].clone();
    assert_eq!(request.text, "天地玄黄");
    assert_eq!(request.instruction, "更华丽一些");

    settle().await;
    assert_eq!(backend.stored_content(), "乾坤浩渺，宇宙洪荒。");
}

#[tokio::test(start_paused = true)]
async fn rewrite_rejects_bad_selections() {
    let backend = MockBackend::with_chapter(chapter("short text"));
    let config = EditorConfig { rewrite_max_chars: 4, ..EditorConfig::default() };
    let session = open_with(&backend, config).await;

    let error = session.rewrite_selection(3..3, "tighten").await.unwrap_err();
    assert_eq!(error.rejection(), Some(&RejectReason::EmptySelection));

    let error = session.rewrite_selection(0..6, "tighten").await.unwrap_err();
    assert_eq!(error.rejection(), Some(&RejectReason::SelectionTooLong { len: 6, max: 4 }));

    let error = session.rewrite_selection(8..12, "tighten").await.unwrap_err();
    assert_eq!(error.rejection(), Some(&RejectReason::SelectionOutOfBounds { end: 12, len: 10 }));

    let error = session.rewrite_selection(0..4, "  ").await.unwrap_err();
    assert_eq!(error.rejection(), Some(&RejectReason::EmptyInput("instruction")));

    assert!(backend.state().rewrite_requests.is_empty());
}
