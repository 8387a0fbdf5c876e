use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use super::collection::Collection;
use super::{LedgerStore, ScanQuery, StoreError, UserStore};
use crate::identity::UserRecord;
use crate::task::{TaskEntry, Upserted};

/// Store that keeps everything in process memory.
///
/// Used for the `memory` backend and as the fallback when the configured
/// backend cannot be reached.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Collection::new()),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<TaskEntry>, StoreError> {
        Ok(self.inner.lock().await.find_by_date(date).cloned())
    }

    async fn find_by_id(&self, id: u32) -> Result<Option<TaskEntry>, StoreError> {
        Ok(self.inner.lock().await.find_by_id(id).cloned())
    }

    async fn upsert_by_date(
        &self,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Upserted, StoreError> {
        Ok(self.inner.lock().await.upsert(date, text, now))
    }

    async fn update_text(
        &self,
        id: u32,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEntry>, StoreError> {
        Ok(self.inner.lock().await.update_text(id, text, now))
    }

    async fn delete(&self, id: u32) -> Result<Option<TaskEntry>, StoreError> {
        Ok(self.inner.lock().await.delete(id))
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.clear())
    }

    async fn scan(&self, query: ScanQuery) -> Result<Vec<TaskEntry>, StoreError> {
        Ok(self.inner.lock().await.scan(&query))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.count())
    }

    async fn date_bounds(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), StoreError> {
        Ok(self.inner.lock().await.date_bounds())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().await.get_setting(key))
    }

    async fn put_setting(
        &self,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.lock().await.put_setting(key, value, now);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.lock().await.find_user(username))
    }

    async fn put_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.inner.lock().await.put_user(user);
        Ok(())
    }
}
