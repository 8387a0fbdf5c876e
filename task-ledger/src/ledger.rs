use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::report::{DEFAULT_TOTAL_DAYS, Progress, Report};
use crate::store::{LedgerStore, ScanOrder, ScanQuery, Storage, StorageMode, StoreError};
use crate::task::{ISO_DATE_FORMAT, TaskEntry, UpsertOutcome, Upserted};

/// Setting key holding day 1 of the tracked period.
pub const START_DATE_KEY: &str = "start_date";

/// Error type for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Represents a task entry ID that does not exist.
    #[error("Task entry with ID {0} not found")]
    NotFound(u32),
    /// Represents a storage backend that could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    /// Represents any other storage failure.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
    /// Represents a stored setting that cannot be interpreted.
    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidSetting { key: String, value: String },
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            LedgerError::StorageUnavailable(err)
        } else {
            LedgerError::Storage(err)
        }
    }
}

/// Summary counts shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    pub total_tasks: u64,
    pub active_days: u64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// The date-keyed task log and its start-date setting.
pub struct TaskLedger {
    store: Arc<dyn LedgerStore>,
    mode: StorageMode,
    total_days: u32,
}

impl TaskLedger {
    pub fn new(store: Arc<dyn LedgerStore>, mode: StorageMode) -> Self {
        Self {
            store,
            mode,
            total_days: DEFAULT_TOTAL_DAYS,
        }
    }

    pub fn from_storage(storage: &Storage) -> Self {
        Self::new(storage.tasks(), storage.mode())
    }

    /// Sets the length of the tracked period used by [`TaskLedger::progress`].
    pub fn with_total_days(mut self, total_days: u32) -> Self {
        self.total_days = total_days;
        self
    }

    /// Whether the ledger runs on its configured backend or the in-memory fallback.
    pub fn storage_mode(&self) -> StorageMode {
        self.mode
    }

    pub fn total_days(&self) -> u32 {
        self.total_days
    }

    /// Looks up the entry for `date` without changing anything.
    #[tracing::instrument(skip(self))]
    pub async fn peek(&self, date: NaiveDate) -> Result<Option<TaskEntry>, LedgerError> {
        Ok(self.store.find_by_date(date).await?)
    }

    /// Saves `text` as the task for `date`.
    ///
    /// Creates the entry on the first save for a date; later saves replace
    /// the text and report what was overwritten.
    #[tracing::instrument(skip(self, text))]
    pub async fn upsert(&self, date: NaiveDate, text: &str) -> Result<Upserted, LedgerError> {
        let upserted = self.store.upsert_by_date(date, text, Utc::now()).await?;
        match upserted.outcome() {
            UpsertOutcome::Created => tracing::info!(
                "Created task {} for {}",
                upserted.entry().id(),
                date
            ),
            UpsertOutcome::Updated => tracing::info!(
                "Updated task {} for {}",
                upserted.entry().id(),
                date
            ),
        }
        Ok(upserted)
    }

    /// Looks up the entry with the given ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: u32) -> Result<TaskEntry, LedgerError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::NotFound(id))
    }

    /// Replaces the text of the entry with the given ID.
    #[tracing::instrument(skip(self, text))]
    pub async fn update_by_id(&self, id: u32, text: &str) -> Result<TaskEntry, LedgerError> {
        self.store
            .update_text(id, text, Utc::now())
            .await?
            .ok_or(LedgerError::NotFound(id))
    }

    /// Permanently removes the entry with the given ID and returns it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_id(&self, id: u32) -> Result<TaskEntry, LedgerError> {
        let deleted = self
            .store
            .delete(id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;
        tracing::info!("Deleted task {} for {}", id, deleted.task_date());
        Ok(deleted)
    }

    /// Removes every entry. Settings are kept.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<u64, LedgerError> {
        let removed = self.store.clear().await?;
        tracing::warn!("Cleared {} task entries", removed);
        Ok(removed)
    }

    /// Lists entries newest first.
    ///
    /// With `filter_date` the result holds at most that day's entry.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        filter_date: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<TaskEntry>, LedgerError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(date) = filter_date {
            return Ok(self.peek(date).await?.into_iter().collect());
        }
        let query = ScanQuery::all(ScanOrder::Descending).with_limit(limit as u64);
        Ok(self.store.scan(query).await?)
    }

    pub async fn count_all(&self) -> Result<u64, LedgerError> {
        Ok(self.store.count().await?)
    }

    /// Number of distinct task dates. Always equal to [`TaskLedger::count_all`],
    /// since every entry has its own date.
    pub async fn count_distinct_dates(&self) -> Result<u64, LedgerError> {
        self.count_all().await
    }

    /// Earliest and latest task dates, or `(None, None)` for an empty ledger.
    pub async fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), LedgerError> {
        Ok(self.store.date_bounds().await?)
    }

    /// Builds the chronological report relative to `start_date`.
    ///
    /// Returns `None` when the ledger has no entries at all.
    #[tracing::instrument(skip(self))]
    pub async fn build_report(&self, start_date: NaiveDate) -> Result<Option<Report>, LedgerError> {
        let entries = self.store.scan(ScanQuery::all(ScanOrder::Ascending)).await?;
        Ok(Report::build(start_date, entries))
    }

    pub async fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let total_tasks = self.count_all().await?;
        let active_days = self.count_distinct_dates().await?;
        let (first_date, last_date) = self.date_range().await?;
        Ok(LedgerStats {
            total_tasks,
            active_days,
            first_date,
            last_date,
        })
    }

    /// Progress through the tracked period, or `None` before a start date is set.
    pub async fn progress(&self, today: NaiveDate) -> Result<Option<Progress>, LedgerError> {
        let start_date = self.start_date().await?;
        Ok(start_date.map(|start| Progress::compute(start, today, self.total_days)))
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.store.get_setting(key).await?)
    }

    /// Stores `value` under `key`, replacing any previous value.
    #[tracing::instrument(skip(self))]
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        Ok(self.store.put_setting(key, value, Utc::now()).await?)
    }

    pub async fn start_date(&self) -> Result<Option<NaiveDate>, LedgerError> {
        let Some(value) = self.get_setting(START_DATE_KEY).await? else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(&value, ISO_DATE_FORMAT)
            .map(Some)
            .map_err(|_| LedgerError::InvalidSetting {
                key: START_DATE_KEY.to_string(),
                value,
            })
    }

    pub async fn set_start_date(&self, date: NaiveDate) -> Result<(), LedgerError> {
        let value = date.format(ISO_DATE_FORMAT).to_string();
        self.set_setting(START_DATE_KEY, &value).await
    }

    /// Returns the configured start date, storing `default` first if none is set.
    pub async fn ensure_start_date(&self, default: NaiveDate) -> Result<NaiveDate, LedgerError> {
        if let Some(start_date) = self.start_date().await? {
            return Ok(start_date);
        }
        tracing::info!("No start date configured, defaulting to {}", default);
        self.set_start_date(default).await?;
        Ok(default)
    }
}
