use chrono::NaiveDate;
use task_ledger::store::sql::SqlStore;
use tempfile::TempDir;

/// A migrated SQLite database in a temporary directory.
#[allow(dead_code)]
pub struct TestDb {
    // Keeps the directory alive for the lifetime of the store.
    pub dir: TempDir,
    pub store: SqlStore,
}

#[allow(dead_code)]
pub async fn setup_db() -> anyhow::Result<TestDb> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir()?;
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    let store = SqlStore::connect(&db_url).await?;
    Ok(TestDb { dir, store })
}

#[allow(dead_code)]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}
