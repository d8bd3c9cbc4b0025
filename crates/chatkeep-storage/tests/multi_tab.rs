// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Several store handles on one database file, standing in for browser tabs.

use std::sync::Arc;
use std::time::Duration;

use chatkeep_config::StorageConfig;
use chatkeep_core::{
    Conversation, LoadSource, LockEventKind, ManualClock, Message, Role, SaveRequest,
    StorageAdapter, TabId,
};
use chatkeep_lock::{LockAcquisition, LockEventBus, LockManager, LockSettings};
use chatkeep_storage::legacy::{LEGACY_CHATS_KEY, LEGACY_CURRENT_ID_KEY};
use chatkeep_storage::{ChatStore, FileLegacyStore, LockEventRelay, SqliteLockBackend};
use tokio_util::sync::CancellationToken;
use tempfile::TempDir;

const NOW: i64 = 1_704_067_200_000;

fn config(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        database_path: dir.path().join("chatkeep.db").display().to_string(),
        busy_timeout_ms: 10_000,
        ..StorageConfig::default()
    }
}

async fn tab(dir: &TempDir, name: &str, clock: &Arc<ManualClock>) -> ChatStore {
    let store = ChatStore::new(config(dir), TabId(name.into()), clock.clone());
    store.initialize().await.unwrap();
    store
}

fn message(id: &str, ms: i64, content: &str) -> Message {
    let mut m = Message::new(Role::User, content, ms);
    m.id = id.into();
    m
}

fn conversation(id: &str, messages: Vec<Message>) -> Conversation {
    let mut c = Conversation::new("Shared", None, NOW - 60_000);
    c.id = id.into();
    c.messages = messages;
    c
}

#[tokio::test]
async fn fresh_migration_from_legacy_files() {
    let dir = TempDir::new().unwrap();
    let legacy_dir = dir.path().join("legacy");
    std::fs::create_dir_all(&legacy_dir).unwrap();
    std::fs::write(
        legacy_dir.join(LEGACY_CHATS_KEY),
        r#"[{"id":"a1","title":"Hello","messages":[],"createdAt":"2024-01-01T00:00:00.000Z"}]"#,
    )
    .unwrap();
    std::fs::write(legacy_dir.join(LEGACY_CURRENT_ID_KEY), "a1").unwrap();

    let clock = Arc::new(ManualClock::new(NOW));
    let store = ChatStore::new(config(&dir), TabId("t1".into()), clock)
        .with_legacy(Arc::new(FileLegacyStore::new(&legacy_dir)));
    store.initialize().await.unwrap();

    let loaded = store.load().await;
    assert_eq!(loaded.source, LoadSource::MigratedFromLegacy);
    assert_eq!(loaded.conversations.len(), 1);
    assert_eq!(loaded.conversations[0].title, "Hello");
    assert_eq!(loaded.conversations[0].created_at_ms, NOW);
    assert!(!legacy_dir.join(LEGACY_CHATS_KEY).exists());
    assert!(!legacy_dir.join(LEGACY_CURRENT_ID_KEY).exists());

    let again = store.load().await;
    assert_eq!(again.source, LoadSource::Embedded);
    assert_eq!(again.conversations, loaded.conversations);
}

#[tokio::test]
async fn concurrent_appends_are_both_kept() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;

    // Neither tab has seen the other's message.
    let from_a = conversation("c1", vec![message("m1", NOW - 2_000, "from a")]);
    let from_b = conversation("c1", vec![message("m2", NOW - 1_000, "from b")]);
    let (ra, rb) = tokio::join!(
        a.save(SaveRequest::new(vec![from_a])),
        b.save(SaveRequest::new(vec![from_b])),
    );
    ra.unwrap();
    rb.unwrap();

    for store in [&a, &b] {
        let loaded = store.load().await;
        assert_eq!(loaded.conversations.len(), 1);
        let ids: Vec<&str> = loaded.conversations[0]
            .messages
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["m1", "m2"]);
    }
}

#[tokio::test]
async fn many_writers_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let mut tabs = Vec::new();
    for i in 0..4 {
        tabs.push(Arc::new(tab(&dir, &format!("t{i}"), &clock).await));
    }

    let mut handles = Vec::new();
    for (i, store) in tabs.iter().enumerate() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..5 {
                let id = format!("m{i}-{j}");
                let ms = NOW - 10_000 + (i * 10 + j) as i64;
                let chat = conversation("c1", vec![message(&id, ms, "x")]);
                store.save(SaveRequest::new(vec![chat])).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let loaded = tabs[0].load().await;
    assert_eq!(loaded.conversations[0].messages.len(), 20);
}

#[tokio::test]
async fn deletion_beats_stale_save() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;

    let c1 = conversation("c1", vec![message("m1", NOW - 5_000, "hello")]);
    let c2 = conversation("c2", vec![]);
    a.save(SaveRequest::new(vec![c1.clone(), c2.clone()]))
        .await
        .unwrap();
    // b read the set before a deleted c1.
    let stale = b.load().await.conversations;

    a.save(SaveRequest::new(vec![c2]).with_deleted_ids(["c1".to_string()]))
        .await
        .unwrap();
    b.save(SaveRequest::new(stale)).await.unwrap();

    let ids: Vec<String> = a
        .load()
        .await
        .conversations
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["c2".to_string()]);
}

async fn stored(store: &ChatStore, id: &str) -> Conversation {
    store
        .load()
        .await
        .conversations
        .into_iter()
        .find(|c| c.id == id)
        .unwrap()
}

#[tokio::test]
async fn removed_message_stays_removed() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;

    let full = conversation(
        "c1",
        vec![message("m1", NOW - 3_000, "q"), message("m2", NOW - 2_000, "a")],
    );
    a.save(SaveRequest::new(vec![full])).await.unwrap();
    let stale = b.load().await.conversations;

    let mut trimmed = stored(&a, "c1").await;
    trimmed.remove_message("m2");
    a.save(SaveRequest::new(vec![trimmed]).with_deleted_message_ids(["m2".to_string()]))
        .await
        .unwrap();
    // The same tab saving again without the flag must not bring it back.
    a.save(SaveRequest::new(vec![stored(&a, "c1").await]))
        .await
        .unwrap();
    let report = b.save(SaveRequest::new(stale)).await.unwrap();
    assert_eq!(report.suppressed_messages, 1);

    let ids: Vec<String> = stored(&a, "c1").await.messages.into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["m1".to_string()]);
}

#[tokio::test]
async fn shortened_edit_persists_over_longer_copy() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;

    let original = conversation("c1", vec![message("m1", NOW - 3_000, "a long first draft")]);
    a.save(SaveRequest::new(vec![original])).await.unwrap();
    let stale = b.load().await.conversations;

    let mut edited = stored(&a, "c1").await;
    edited.message_mut("m1").unwrap().edit("short");
    a.save(SaveRequest::new(vec![edited])).await.unwrap();
    assert_eq!(stored(&a, "c1").await.messages[0].content, "short");

    b.save(SaveRequest::new(stale)).await.unwrap();
    let message = &stored(&b, "c1").await.messages[0];
    assert_eq!(message.content, "short");
    assert_eq!(message.revision, 1);
}

#[tokio::test]
async fn second_rename_persists() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;

    let mut chat = conversation("c1", vec![]);
    chat.rename("First");
    a.save(SaveRequest::new(vec![chat])).await.unwrap();
    let stale = b.load().await.conversations;

    let mut renamed = stored(&a, "c1").await;
    renamed.rename("Second");
    a.save(SaveRequest::new(vec![renamed])).await.unwrap();
    assert_eq!(stored(&a, "c1").await.title, "Second");

    b.save(SaveRequest::new(stale)).await.unwrap();
    let chat = stored(&b, "c1").await;
    assert_eq!(chat.title, "Second");
    assert_eq!(chat.title_revision, 2);
}

#[tokio::test]
async fn locks_are_exclusive_across_handles() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;
    let bus = LockEventBus::default();
    let settings = LockSettings::default();

    let lock_a = LockManager::new(
        Arc::new(SqliteLockBackend::new(a.database().unwrap())),
        a.tab_id().clone(),
        clock.clone(),
        settings,
        bus.clone(),
    );
    let lock_b = LockManager::new(
        Arc::new(SqliteLockBackend::new(b.database().unwrap())),
        b.tab_id().clone(),
        clock.clone(),
        settings,
        bus,
    );

    assert!(lock_a.acquire("c1", "Chat").await.unwrap().is_acquired());
    match lock_b.acquire("c1", "Chat").await.unwrap() {
        LockAcquisition::LockedByOtherTab(held) => assert_eq!(held.tab_id, TabId("a".into())),
        other => panic!("expected conflict, got {other:?}"),
    }

    // a's tab goes away without async work.
    assert!(lock_a.release_all_blocking().unwrap());
    assert!(lock_b.acquire("c1", "Chat").await.unwrap().is_acquired());

    clock.advance(settings.ttl_ms as i64 + 1);
    assert!(lock_a.acquire("c1", "Chat").await.unwrap().is_acquired());
    assert!(!lock_b.refresh("c1", "Chat").await.unwrap());
}

#[tokio::test]
async fn lock_events_reach_a_separate_bus() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let b = tab(&dir, "b", &clock).await;
    let (bus_a, bus_b) = (LockEventBus::default(), LockEventBus::default());
    let settings = LockSettings::default();

    let lock_a = LockManager::new(
        Arc::new(SqliteLockBackend::new(a.database().unwrap())),
        a.tab_id().clone(),
        clock.clone(),
        settings,
        bus_a.clone(),
    );
    let relay = LockEventRelay::spawn(
        b.database().unwrap(),
        bus_b.clone(),
        Duration::from_millis(10),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let mut seen_by_a = bus_a.subscribe();
    let mut seen_by_b = bus_b.subscribe();

    lock_a.acquire("c1", "Chat").await.unwrap();
    lock_a.release("c1").await.unwrap();

    assert_eq!(seen_by_a.recv().await.unwrap().kind, LockEventKind::LockUpdated);
    for expected in [LockEventKind::LockUpdated, LockEventKind::LockReleased] {
        let event = tokio::time::timeout(Duration::from_secs(5), seen_by_b.recv())
            .await
            .expect("event relayed in time")
            .unwrap();
        assert_eq!(event.kind, expected);
        assert_eq!(event.tab_id, TabId("a".into()));
    }

    relay.stop().await;
}

#[tokio::test]
async fn relay_skips_its_own_bus() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let a = tab(&dir, "a", &clock).await;
    let bus = LockEventBus::default();
    let lock_a = LockManager::new(
        Arc::new(SqliteLockBackend::new(a.database().unwrap())),
        a.tab_id().clone(),
        clock.clone(),
        LockSettings::default(),
        bus.clone(),
    );
    let relay = LockEventRelay::spawn(
        a.database().unwrap(),
        bus.clone(),
        Duration::from_millis(10),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let mut events = bus.subscribe();

    lock_a.acquire("c1", "Chat").await.unwrap();
    assert_eq!(events.recv().await.unwrap().kind, LockEventKind::LockUpdated);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());

    relay.stop().await;
}
