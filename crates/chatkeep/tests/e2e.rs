// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests driving tab sessions over a real database file.
//!
//! Each test gets its own temp directory. Sessions opened on the same
//! directory behave like tabs of one browser profile.

use std::sync::Arc;

use chatkeep::TabSession;
use chatkeep_config::ChatkeepConfig;
use chatkeep_core::{Conversation, ManualClock, Message, Role, SaveRequest, TabId};
use chatkeep_lock::LockEventBus;
use chatkeep_merge::ImportMode;
use tempfile::TempDir;

const NOW: i64 = 1_704_067_200_000;

fn config(dir: &TempDir) -> ChatkeepConfig {
    let mut config = ChatkeepConfig::default();
    config.storage.database_path = dir.path().join("chatkeep.db").display().to_string();
    config
}

async fn open(config: &ChatkeepConfig, tab: &str, clock: &Arc<ManualClock>) -> TabSession {
    TabSession::open(config, TabId(tab.into()), LockEventBus::default(), clock.clone())
        .await
        .unwrap()
}

fn chat(title: &str, ms: i64, contents: &[&str]) -> Conversation {
    let mut chat = Conversation::new(title, None, ms);
    chat.messages = contents
        .iter()
        .enumerate()
        .map(|(i, text)| Message::new(Role::User, *text, ms + i as i64 + 1))
        .collect();
    chat
}

// ---- Tabs sharing one store ----

#[tokio::test]
async fn tabs_keep_their_own_current_conversation() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let clock = Arc::new(ManualClock::new(NOW));
    let a = open(&config, "a", &clock).await;
    let b = open(&config, "b", &clock).await;

    let first = chat("First", NOW - 2_000, &["hi"]);
    let second = chat("Second", NOW - 1_000, &["yo"]);
    a.save(SaveRequest::new(vec![first.clone()]).with_current_id(Some(first.id.clone())))
        .await
        .unwrap();
    b.save(SaveRequest::new(vec![second.clone()]).with_current_id(Some(second.id.clone())))
        .await
        .unwrap();

    let seen_a = a.load().await;
    let seen_b = b.load().await;
    assert_eq!(seen_a.conversations.len(), 2);
    assert_eq!(seen_b.conversations.len(), 2);
    assert_eq!(seen_a.current_id.as_deref(), Some(first.id.as_str()));
    assert_eq!(seen_b.current_id.as_deref(), Some(second.id.as_str()));
}

#[tokio::test]
async fn stale_tab_cannot_resurrect_a_deleted_conversation() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let clock = Arc::new(ManualClock::new(NOW));
    let a = open(&config, "a", &clock).await;
    let b = open(&config, "b", &clock).await;

    let doomed = chat("Doomed", NOW - 1_000, &["bye"]);
    a.save(SaveRequest::new(vec![doomed.clone()])).await.unwrap();
    let stale = b.load().await;

    a.delete(&doomed.id).await.unwrap();
    clock.advance(1_000);
    let report = b.save(SaveRequest::new(stale.conversations)).await.unwrap();
    assert_eq!(report.suppressed_deleted, 1);
    assert!(a.load().await.conversations.is_empty());
}

// ---- Archives ----

#[tokio::test]
async fn full_export_imports_into_another_profile() {
    let clock = Arc::new(ManualClock::new(NOW));
    let source_dir = TempDir::new().unwrap();
    let source = open(&config(&source_dir), "a", &clock).await;
    source
        .save(SaveRequest::new(vec![
            chat("Alpha", NOW - 3_000, &["one"]),
            chat("Beta", NOW - 2_000, &["two", "three"]),
        ]))
        .await
        .unwrap();
    let doc = source.export_archive(false).await.unwrap();
    assert_eq!(doc["meta"]["type"], "full");

    let target_dir = TempDir::new().unwrap();
    let target = open(&config(&target_dir), "b", &clock).await;
    let summary = target
        .import_archive(&doc.to_string(), ImportMode::Merge)
        .await
        .unwrap();
    assert_eq!(summary.added, 2);
    assert_eq!(summary.total, 2);

    let mut titles: Vec<String> = target
        .load()
        .await
        .conversations
        .into_iter()
        .map(|c| c.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Alpha（分支）", "Beta（分支）"]);
}

#[tokio::test]
async fn reimporting_the_same_archive_adds_nothing() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let tab = open(&config(&dir), "a", &clock).await;
    tab.save(SaveRequest::new(vec![chat("Alpha", NOW - 3_000, &["one"])]))
        .await
        .unwrap();
    let doc = tab.export_archive(false).await.unwrap().to_string();

    let summary = tab.import_archive(&doc, ImportMode::Merge).await.unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.merged, 1);
    assert_eq!(tab.load().await.conversations[0].title, "Alpha");
}

#[tokio::test]
async fn bare_array_archive_with_legacy_fields_is_repaired() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let tab = open(&config(&dir), "a", &clock).await;

    let text = r#"[
        {"id": "1700000000000", "title": "Old export", "timestamp": 1700000000000,
         "messages": [{"role": "user", "content": "hello"}]}
    ]"#;
    let summary = tab
        .import_archive(text, ImportMode::Overwrite)
        .await
        .unwrap();
    assert_eq!(summary.total, 1);

    let state = tab.load().await;
    let imported = &state.conversations[0];
    assert_eq!(imported.title, "Old export");
    assert_eq!(imported.messages.len(), 1);
    assert!(!imported.messages[0].id.is_empty());
}

#[tokio::test]
async fn malformed_archive_leaves_the_store_untouched() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let tab = open(&config(&dir), "a", &clock).await;
    tab.save(SaveRequest::new(vec![chat("Keep", NOW - 1_000, &["x"])]))
        .await
        .unwrap();

    let err = tab
        .import_archive(r#"{"encrypted": true, "payload": "..."}"#, ImportMode::Overwrite)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_archive");
    assert!(tab.import_archive("not json", ImportMode::Merge).await.is_err());
    assert_eq!(tab.load().await.conversations.len(), 1);
}

// ---- Save failures ----

#[tokio::test]
async fn repeated_save_failures_are_reported_once() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.storage.busy_timeout_ms = 50;
    let clock = Arc::new(ManualClock::new(NOW));
    let tab = open(&config, "a", &clock).await;

    let blocker = tab.store().database().unwrap().open_blocking().unwrap();
    blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let request = || SaveRequest::new(vec![chat("Busy", NOW - 1_000, &["x"])]);
    assert!(tab.save(request()).await.is_err());
    let notice = tab.take_save_notice().expect("first failure is reported");
    assert!(notice.contains("could not be saved"));

    assert!(tab.save(request()).await.is_err());
    assert!(tab.take_save_notice().is_none());

    blocker.execute_batch("ROLLBACK").unwrap();
    tab.save(request()).await.unwrap();
    assert_eq!(tab.load().await.conversations.len(), 1);
}
