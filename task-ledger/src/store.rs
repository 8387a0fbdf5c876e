//! Storage backends behind one capability interface.
//!
//! A backend is picked once at startup by [`Storage::connect`]. When the
//! configured backend cannot be opened, the process keeps running on an
//! in-memory store and reports [`StorageMode::Degraded`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::DbErr;
use serde::Deserialize;

use crate::config::Config;
use crate::identity::UserRecord;
use crate::task::{TaskEntry, Upserted};

mod collection;
pub mod document;
pub mod memory;
pub mod sql;

use self::document::DocumentStore;
use self::memory::MemoryStore;
use self::sql::SqlStore;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// Represents a failure reading or writing the document file.
    #[error("Document I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Represents a document file that is not valid JSON for the ledger.
    #[error("Malformed document: {0}")]
    Document(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the backend could not be reached at all, as opposed to
    /// rejecting a particular request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Database(DbErr::Conn(_) | DbErr::ConnectionAcquire(_)) => true,
            StoreError::Io(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// Ordered scan over task dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanQuery {
    pub order: ScanOrder,
    pub limit: Option<u64>,
}

impl ScanQuery {
    pub fn all(order: ScanOrder) -> Self {
        Self {
            order,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Task and settings persistence.
///
/// Each method is atomic on its own. `upsert_by_date` must never create a
/// second entry for a date, including when another writer inserts the same
/// date concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<TaskEntry>, StoreError>;

    async fn find_by_id(&self, id: u32) -> Result<Option<TaskEntry>, StoreError>;

    /// Inserts the entry for `date`, or replaces the text of the existing one.
    async fn upsert_by_date(
        &self,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Upserted, StoreError>;

    /// Returns the updated entry, or `None` when `id` does not exist.
    async fn update_text(
        &self,
        id: u32,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEntry>, StoreError>;

    /// Returns the removed entry, or `None` when `id` does not exist.
    async fn delete(&self, id: u32) -> Result<Option<TaskEntry>, StoreError>;

    /// Removes every entry and returns how many were removed.
    async fn clear(&self) -> Result<u64, StoreError>;

    async fn scan(&self, query: ScanQuery) -> Result<Vec<TaskEntry>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Earliest and latest task dates.
    async fn date_bounds(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put_setting(
        &self,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Inserts the account or replaces the one with the same username.
    async fn put_user(&self, user: UserRecord) -> Result<(), StoreError>;
}

/// Which backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded SQLite file.
    #[default]
    Sqlite,
    /// Remote PostgreSQL database.
    Postgres,
    /// JSON document file.
    Document,
    /// Process memory only.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
            Backend::Document => "document",
            Backend::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Connected(Backend),
    /// The configured backend was unreachable; data lives in memory and is
    /// lost when the process exits.
    Degraded,
}

impl StorageMode {
    pub fn is_degraded(&self) -> bool {
        matches!(self, StorageMode::Degraded)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Connected(backend) => write!(f, "connected ({backend})"),
            StorageMode::Degraded => f.write_str("degraded (in-memory, not persisted)"),
        }
    }
}

/// The opened backend and the mode it runs in.
#[derive(Clone)]
pub struct Storage {
    mode: StorageMode,
    tasks: Arc<dyn LedgerStore>,
    users: Arc<dyn UserStore>,
}

impl Storage {
    /// Opens the configured backend, falling back to memory when it is unreachable.
    #[tracing::instrument(skip(config), fields(backend = %config.storage))]
    pub async fn connect(config: &Config) -> Self {
        match Self::open(config).await {
            Ok(storage) => {
                tracing::info!("Storage ready: {}", storage.mode);
                storage
            }
            Err(err) => {
                tracing::warn!(
                    "Storage backend {} unavailable, continuing in memory: {}",
                    config.storage,
                    err
                );
                Self::shared(Arc::new(MemoryStore::new()), StorageMode::Degraded)
            }
        }
    }

    /// Opens the configured backend without any fallback.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let mode = StorageMode::Connected(config.storage);
        let storage = match config.storage {
            Backend::Sqlite | Backend::Postgres => {
                Self::shared(Arc::new(SqlStore::connect(&config.database_url).await?), mode)
            }
            Backend::Document => {
                Self::shared(Arc::new(DocumentStore::open(&config.document_path).await?), mode)
            }
            Backend::Memory => Self::shared(Arc::new(MemoryStore::new()), mode),
        };
        Ok(storage)
    }

    pub fn shared<S>(store: Arc<S>, mode: StorageMode) -> Self
    where
        S: LedgerStore + UserStore + 'static,
    {
        Self {
            mode,
            tasks: store.clone(),
            users: store,
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn tasks(&self) -> Arc<dyn LedgerStore> {
        self.tasks.clone()
    }

    pub fn users(&self) -> Arc<dyn UserStore> {
        self.users.clone()
    }
}
