use std::sync::Arc;

use common::date;
use task_ledger::identity::{Identity, Role};
use task_ledger::ledger::{LedgerError, TaskLedger};
use task_ledger::store::document::DocumentStore;
use task_ledger::store::{Backend, StorageMode};

mod common;

async fn open_ledger(path: &std::path::Path) -> anyhow::Result<TaskLedger> {
    let store = DocumentStore::open(path).await?;
    Ok(TaskLedger::new(
        Arc::new(store),
        StorageMode::Connected(Backend::Document),
    ))
}

#[tokio::test]
async fn entries_and_settings_survive_reopening() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let ledger = open_ledger(&path).await.unwrap();
    ledger.set_start_date(date(2025, 1, 1)).await.unwrap();
    ledger.upsert(date(2025, 1, 1), "Setup env").await.unwrap();
    let removed = ledger.upsert(date(2025, 1, 2), "Temporary").await.unwrap();
    ledger.upsert(date(2025, 1, 3), "Wrote docs").await.unwrap();
    ledger.delete_by_id(removed.entry().id()).await.unwrap();
    drop(ledger);

    let reopened = open_ledger(&path).await.unwrap();
    assert_eq!(reopened.count_all().await.unwrap(), 2);
    assert_eq!(reopened.start_date().await.unwrap(), Some(date(2025, 1, 1)));
    assert_eq!(
        reopened.peek(date(2025, 1, 3)).await.unwrap().unwrap().text(),
        "Wrote docs"
    );

    // IDs keep counting after a reopen, deleted ones are not handed out again.
    let next = reopened.upsert(date(2025, 1, 4), "Review").await.unwrap();
    assert_eq!(next.entry().id(), 4);
}

#[tokio::test]
async fn missing_document_starts_empty_and_is_created_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.json");

    let ledger = open_ledger(&path).await.unwrap();
    assert_eq!(ledger.count_all().await.unwrap(), 0);
    assert!(!path.exists());

    ledger.upsert(date(2025, 5, 1), "First day").await.unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("fresh.json.tmp").exists());
}

#[tokio::test]
async fn missing_ids_leave_the_document_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("untouched.json");
    let ledger = open_ledger(&path).await.unwrap();

    assert!(matches!(
        ledger.update_by_id(7, "nothing").await,
        Err(LedgerError::NotFound(7))
    ));
    assert!(matches!(
        ledger.delete_by_id(7).await,
        Err(LedgerError::NotFound(7))
    ));
    assert!(!path.exists());
}

#[tokio::test]
async fn malformed_document_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    assert!(DocumentStore::open(&path).await.is_err());
}

#[tokio::test]
async fn accounts_are_kept_in_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let store = Arc::new(DocumentStore::open(&path).await.unwrap());
    Identity::new(store)
        .register("admin", "admin123", Role::Admin)
        .await
        .unwrap();

    let reopened = Identity::new(Arc::new(DocumentStore::open(&path).await.unwrap()));
    let admin = reopened.authenticate("admin", "admin123").await.unwrap();
    assert_eq!(admin.map(|user| user.role()), Some(Role::Admin));

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(!contents.contains("admin123"));
}
