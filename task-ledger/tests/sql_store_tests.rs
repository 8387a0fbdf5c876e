use std::sync::Arc;

use common::date;
use task_ledger::identity::{Identity, Role};
use task_ledger::ledger::{LedgerError, TaskLedger};
use task_ledger::report::ReportFilter;
use task_ledger::store::sql::SqlStore;
use task_ledger::store::{Backend, StorageMode};
use task_ledger::task::UpsertOutcome;

mod common;

pub struct TestContext {
    pub db: common::TestDb,
    pub ledger: TaskLedger,
}

async fn setup() -> anyhow::Result<TestContext> {
    let db = common::setup_db().await?;
    let ledger = TaskLedger::new(
        Arc::new(db.store.clone()),
        StorageMode::Connected(Backend::Sqlite),
    );
    Ok(TestContext { db, ledger })
}

#[tokio::test]
async fn saves_overwrites_and_reports_in_date_order() {
    let state = setup().await.expect("Failed to setup test context");
    let ledger = &state.ledger;
    let start = date(2025, 1, 1);
    ledger.set_start_date(start).await.unwrap();

    let first = ledger.upsert(start, "Setup env").await.unwrap();
    assert_eq!(first.outcome(), UpsertOutcome::Created);
    let second = ledger.upsert(date(2025, 1, 3), "Wrote docs").await.unwrap();
    assert_eq!(second.outcome(), UpsertOutcome::Created);
    let third = ledger.upsert(start, "Setup env v2").await.unwrap();
    assert_eq!(third.outcome(), UpsertOutcome::Updated);
    assert_eq!(third.previous_text(), Some("Setup env"));
    assert_eq!(third.entry().id(), first.entry().id());
    assert_eq!(third.entry().created_at(), first.entry().created_at());

    assert_eq!(ledger.count_all().await.unwrap(), 2);
    assert_eq!(ledger.count_distinct_dates().await.unwrap(), 2);

    let report = ledger.build_report(start).await.unwrap().unwrap();
    let rows: Vec<_> = report
        .rows()
        .iter()
        .map(|row| (row.day_number, row.task.as_str()))
        .collect();
    assert_eq!(rows, vec![(Some(1), "Setup env v2"), (Some(3), "Wrote docs")]);
    assert_eq!(report.rows()[1].formatted_date, "Friday, 03 January 2025");

    let filtered = report.filter(&ReportFilter {
        min_day: Some(2),
        max_day: None,
        search: Some("DOCS".to_string()),
    });
    assert_eq!(filtered.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_connections_racing_on_the_same_days_all_succeed() {
    let state = setup().await.expect("Failed to setup test context");
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        state.db.dir.path().join("ledger.db").display()
    );
    let mut ledgers = Vec::new();
    for _ in 0..4 {
        let store = SqlStore::connect(&db_url).await.unwrap();
        ledgers.push(Arc::new(TaskLedger::new(
            Arc::new(store),
            StorageMode::Connected(Backend::Sqlite),
        )));
    }

    let mut handles = Vec::new();
    for (writer, ledger) in ledgers.iter().enumerate() {
        for day in 1..=15 {
            let ledger = Arc::clone(ledger);
            handles.push(tokio::spawn(async move {
                ledger.upsert(date(2025, 4, day), &format!("writer {writer}")).await
            }));
        }
    }
    let mut created = 0;
    for handle in handles {
        let upserted = handle.await.unwrap().expect("racing upsert failed");
        if upserted.outcome() == UpsertOutcome::Created {
            created += 1;
        }
    }

    assert_eq!(created, 15);
    assert_eq!(state.ledger.count_all().await.unwrap(), 15);
    for day in 1..=15 {
        let stored = state.ledger.peek(date(2025, 4, day)).await.unwrap().unwrap();
        assert!(stored.text().starts_with("writer "));
    }
}

#[tokio::test]
async fn delete_and_edit_by_id() {
    let state = setup().await.expect("Failed to setup test context");
    let ledger = &state.ledger;
    let kept = ledger.upsert(date(2025, 1, 1), "keep").await.unwrap();
    let doomed = ledger.upsert(date(2025, 1, 2), "remove").await.unwrap();

    let deleted = ledger.delete_by_id(doomed.entry().id()).await.unwrap();
    assert_eq!(deleted.task_date(), date(2025, 1, 2));
    assert!(ledger.peek(date(2025, 1, 2)).await.unwrap().is_none());
    assert_eq!(ledger.count_all().await.unwrap(), 1);
    assert!(matches!(
        ledger.delete_by_id(doomed.entry().id()).await,
        Err(LedgerError::NotFound(_))
    ));

    let edited = ledger
        .update_by_id(kept.entry().id(), "kept and edited")
        .await
        .unwrap();
    assert_eq!(edited.text(), "kept and edited");
    assert_eq!(
        ledger.get_by_id(kept.entry().id()).await.unwrap().text(),
        "kept and edited"
    );
    assert!(matches!(
        ledger.update_by_id(9_999, "nope").await,
        Err(LedgerError::NotFound(9_999))
    ));
}

#[tokio::test]
async fn list_and_date_range() {
    let state = setup().await.expect("Failed to setup test context");
    let ledger = &state.ledger;
    assert_eq!(ledger.date_range().await.unwrap(), (None, None));
    assert!(ledger.build_report(date(2025, 1, 1)).await.unwrap().is_none());

    for day in [5, 1, 9, 3] {
        ledger
            .upsert(date(2025, 3, day), &format!("day {day}"))
            .await
            .unwrap();
    }

    let newest: Vec<_> = ledger
        .list(None, 2)
        .await
        .unwrap()
        .iter()
        .map(|entry| entry.task_date())
        .collect();
    assert_eq!(newest, vec![date(2025, 3, 9), date(2025, 3, 5)]);
    assert_eq!(ledger.list(Some(date(2025, 3, 3)), 20).await.unwrap().len(), 1);
    assert!(ledger.list(None, 0).await.unwrap().is_empty());
    assert_eq!(
        ledger.date_range().await.unwrap(),
        (Some(date(2025, 3, 1)), Some(date(2025, 3, 9)))
    );

    assert_eq!(ledger.clear_all().await.unwrap(), 4);
    assert_eq!(ledger.count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn start_date_setting_persists_across_connections() {
    let state = setup().await.expect("Failed to setup test context");
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        state.db.dir.path().join("ledger.db").display()
    );

    let start = state.ledger.ensure_start_date(date(2025, 1, 1)).await.unwrap();
    assert_eq!(start, date(2025, 1, 1));
    state.ledger.set_start_date(date(2025, 2, 1)).await.unwrap();

    let reopened = TaskLedger::new(
        Arc::new(SqlStore::connect(&db_url).await.unwrap()),
        StorageMode::Connected(Backend::Sqlite),
    );
    assert_eq!(
        reopened.ensure_start_date(date(2030, 1, 1)).await.unwrap(),
        date(2025, 2, 1)
    );
}

#[tokio::test]
async fn users_are_stored_as_digests() {
    let state = setup().await.expect("Failed to setup test context");
    let identity = Identity::new(Arc::new(state.db.store.clone()));

    identity.register("admin", "admin123", Role::Admin).await.unwrap();
    identity.register("viewer", "viewer123", Role::Viewer).await.unwrap();
    identity.register("admin", "changed", Role::Admin).await.unwrap();

    assert!(identity.authenticate("admin", "admin123").await.unwrap().is_none());
    let admin = identity.authenticate("admin", "changed").await.unwrap().unwrap();
    assert_eq!(admin.role(), Role::Admin);
    let viewer = identity.authenticate("viewer", "viewer123").await.unwrap().unwrap();
    assert_eq!(viewer.role(), Role::Viewer);
}
