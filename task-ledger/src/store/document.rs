use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use super::collection::Collection;
use super::{LedgerStore, ScanQuery, StoreError, UserStore};
use crate::identity::UserRecord;
use crate::task::{TaskEntry, Upserted};

/// Store backed by a single JSON document on disk.
///
/// The whole document is rewritten on every change: first to a sibling
/// temporary file, then renamed over the original.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    inner: Mutex<Collection>,
}

impl DocumentStore {
    /// Loads the document at `path`. A missing file is an empty ledger; it is
    /// created on the first write.
    #[tracing::instrument]
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let collection = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No document at {}, starting empty", path.display());
                Collection::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(collection),
        })
    }

    /// Applies `change` to a copy of the document, persists the copy, and
    /// only then makes it visible. A failed write leaves the store unchanged.
    async fn write<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Collection) -> T + Send,
        T: Send,
    {
        let mut current = self.inner.lock().await;
        let mut next = current.clone();
        let result = change(&mut next);
        self.persist(&next).await?;
        *current = next;
        Ok(result)
    }

    /// Like [`DocumentStore::write`], but `change` may decline by returning
    /// `None`. Nothing is written to disk in that case.
    async fn write_if<T, F>(&self, change: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&mut Collection) -> Option<T> + Send,
        T: Send,
    {
        let mut current = self.inner.lock().await;
        let mut next = current.clone();
        let Some(result) = change(&mut next) else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *current = next;
        Ok(Some(result))
    }

    async fn persist(&self, collection: &Collection) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(collection)?;
        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);
        tokio::fs::write(&temporary, contents).await?;
        tokio::fs::rename(&temporary, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for DocumentStore {
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
        self.write(|collection| collection.upsert(date, text, now))
            .await
    }

    async fn update_text(
        &self,
        id: u32,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEntry>, StoreError> {
        self.write_if(|collection| collection.update_text(id, text, now))
            .await
    }

    async fn delete(&self, id: u32) -> Result<Option<TaskEntry>, StoreError> {
        self.write_if(|collection| collection.delete(id)).await
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        self.write(Collection::clear).await
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
        self.write(|collection| collection.put_setting(key, value, now))
            .await
    }
}

#[async_trait]
impl UserStore for DocumentStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.lock().await.find_user(username))
    }

    async fn put_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.write(|collection| collection.put_user(user)).await
    }
}
