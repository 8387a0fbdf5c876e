use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use migration::MigratorTrait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
};

use super::{LedgerStore, ScanOrder, ScanQuery, StoreError, UserStore};
use crate::entities::{setting, task, user};
use crate::identity::UserRecord;
use crate::task::{TaskEntry, Upserted};

/// Read-then-write rounds before an upsert stops checking for concurrent changes.
const UPSERT_ATTEMPTS: usize = 8;

/// Relational store for SQLite files and PostgreSQL databases.
///
/// Every write is a single autocommit statement. SQLite makes such
/// statements wait on its busy timeout, whereas a read inside an open
/// transaction followed by a write fails with "database is locked" when
/// another connection is writing.
#[derive(Debug, Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    /// Wraps an already migrated connection.
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connects to `database_url` and applies pending migrations.
    #[tracing::instrument(skip_all)]
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db = Database::connect(database_url).await?;
        migration::Migrator::up(&db, None).await?;
        tracing::info!("Database migrations applied successfully");
        Ok(Self::new(db))
    }

    /// Inserts the entry for `date`. Returns `None` when another writer
    /// already holds that date.
    async fn insert_if_absent(
        &self,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Upserted>, StoreError> {
        let active_model = task::ActiveModel {
            task_date: ActiveValue::Set(date),
            task: ActiveValue::Set(text.to_string()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        match active_model.insert(&self.db).await {
            Ok(created_model) => Ok(Some(Upserted::created(TaskEntry::from(created_model)))),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the text of `current`, provided the row still holds the text
    /// that was read. Returns `None` when it changed or vanished meanwhile.
    async fn replace_if_unchanged(
        &self,
        current: task::Model,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Upserted>, StoreError> {
        let result = task::Entity::update_many()
            .col_expr(task::Column::Task, Expr::value(text.to_string()))
            .col_expr(task::Column::UpdatedAt, Expr::value(now))
            .filter(task::Column::Id.eq(current.id))
            .filter(task::Column::Task.eq(current.task.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        let entry = TaskEntry::new(
            current.id as u32,
            current.task_date,
            text.to_string(),
            current.created_at,
            now,
        );
        Ok(Some(Upserted::updated(entry, current.task)))
    }

    /// Overwrites the text of the row for `date` without comparing it first.
    async fn overwrite(
        &self,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Upserted, StoreError> {
        let on_conflict = OnConflict::column(task::Column::TaskDate)
            .update_columns([task::Column::Task, task::Column::UpdatedAt])
            .to_owned();
        let previous = find_task_by_date(&self.db, date).await?;
        task::Entity::insert(task::ActiveModel {
            task_date: ActiveValue::Set(date),
            task: ActiveValue::Set(text.to_string()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        })
        .on_conflict(on_conflict)
        .exec_without_returning(&self.db)
        .await?;
        let stored = find_task_by_date(&self.db, date)
            .await?
            .ok_or(DbErr::RecordNotFound(format!("task for {date}")))?;
        Ok(match previous {
            Some(model) => Upserted::updated(TaskEntry::from(stored), model.task),
            None => Upserted::created(TaskEntry::from(stored)),
        })
    }
}

async fn find_task_by_date<C>(db: &C, date: NaiveDate) -> Result<Option<task::Model>, DbErr>
where
    C: ConnectionTrait,
{
    task::Entity::find()
        .filter(task::Column::TaskDate.eq(date))
        .one(db)
        .await
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl LedgerStore for SqlStore {
    #[tracing::instrument(skip(self))]
    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<TaskEntry>, StoreError> {
        Ok(find_task_by_date(&self.db, date).await?.map(TaskEntry::from))
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: u32) -> Result<Option<TaskEntry>, StoreError> {
        let model = task::Entity::find_by_id(id as i32).one(&self.db).await?;
        Ok(model.map(TaskEntry::from))
    }

    /// A concurrent writer may insert or rewrite the same date between our
    /// read and our write. The unique index rejects a second insert and the
    /// text comparison rejects a stale update; either way the round is
    /// re-read and retried.
    #[tracing::instrument(skip(self, text))]
    async fn upsert_by_date(
        &self,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Upserted, StoreError> {
        for _ in 0..UPSERT_ATTEMPTS {
            let upserted = match find_task_by_date(&self.db, date).await? {
                Some(current) => self.replace_if_unchanged(current, text, now).await?,
                None => self.insert_if_absent(date, text, now).await?,
            };
            if let Some(upserted) = upserted {
                return Ok(upserted);
            }
            tracing::warn!("Entry for {} changed concurrently, retrying", date);
        }
        self.overwrite(date, text, now).await
    }

    #[tracing::instrument(skip(self, text))]
    async fn update_text(
        &self,
        id: u32,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskEntry>, StoreError> {
        let Some(model) = task::Entity::find_by_id(id as i32).one(&self.db).await? else {
            return Ok(None);
        };
        let mut active_model: task::ActiveModel = model.into();
        active_model.task = ActiveValue::Set(text.to_string());
        active_model.updated_at = ActiveValue::Set(now);
        let updated_model = active_model.update(&self.db).await?;
        Ok(Some(TaskEntry::from(updated_model)))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: u32) -> Result<Option<TaskEntry>, StoreError> {
        let Some(model) = task::Entity::find_by_id(id as i32).one(&self.db).await? else {
            return Ok(None);
        };
        let result = task::Entity::delete_by_id(id as i32).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Some(TaskEntry::from(model)))
    }

    #[tracing::instrument(skip(self))]
    async fn clear(&self) -> Result<u64, StoreError> {
        let result = task::Entity::delete_many().exec(&self.db).await?;
        Ok(result.rows_affected)
    }

    #[tracing::instrument(skip(self))]
    async fn scan(&self, query: ScanQuery) -> Result<Vec<TaskEntry>, StoreError> {
        let mut select = match query.order {
            ScanOrder::Ascending => task::Entity::find().order_by_asc(task::Column::TaskDate),
            ScanOrder::Descending => task::Entity::find().order_by_desc(task::Column::TaskDate),
        };
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }
        let entries = select
            .all(&self.db)
            .await?
            .into_iter()
            .map(TaskEntry::from)
            .collect();
        Ok(entries)
    }

    #[tracing::instrument(skip(self))]
    async fn count(&self) -> Result<u64, StoreError> {
        Ok(task::Entity::find().count(&self.db).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn date_bounds(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), StoreError> {
        let first = task::Entity::find()
            .order_by_asc(task::Column::TaskDate)
            .one(&self.db)
            .await?;
        let last = task::Entity::find()
            .order_by_desc(task::Column::TaskDate)
            .one(&self.db)
            .await?;
        Ok((
            first.map(|model| model.task_date),
            last.map(|model| model.task_date),
        ))
    }

    #[tracing::instrument(skip(self))]
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let model = setting::Entity::find()
            .filter(setting::Column::SettingKey.eq(key))
            .one(&self.db)
            .await?;
        Ok(model.map(|model| model.setting_value))
    }

    #[tracing::instrument(skip(self))]
    async fn put_setting(
        &self,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let on_conflict = OnConflict::column(setting::Column::SettingKey)
            .update_columns([setting::Column::SettingValue, setting::Column::UpdatedAt])
            .to_owned();
        setting::Entity::insert(setting::ActiveModel {
            setting_key: ActiveValue::Set(key.to_string()),
            setting_value: ActiveValue::Set(value.to_string()),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        })
        .on_conflict(on_conflict)
        .exec_without_returning(&self.db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqlStore {
    #[tracing::instrument(skip(self))]
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let model = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?;
        Ok(model.map(UserRecord::from))
    }

    #[tracing::instrument(skip(self, record), fields(username = %record.username))]
    async fn put_user(&self, record: UserRecord) -> Result<(), StoreError> {
        // created_at is kept from the first registration.
        let on_conflict = OnConflict::column(user::Column::Username)
            .update_columns([user::Column::PasswordDigest, user::Column::Role])
            .to_owned();
        user::Entity::insert(user::ActiveModel {
            username: ActiveValue::Set(record.username),
            password_digest: ActiveValue::Set(record.password_digest),
            role: ActiveValue::Set(record.role.as_str().to_string()),
            created_at: ActiveValue::Set(record.created_at),
            ..Default::default()
        })
        .on_conflict(on_conflict)
        .exec_without_returning(&self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqlStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
        let store = SqlStore::connect(&db_url).await.unwrap();
        (dir, store)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    async fn insert_row(store: &SqlStore, day: u32, text: &str) -> task::Model {
        let now = Utc::now();
        task::ActiveModel {
            task_date: ActiveValue::Set(date(day)),
            task: ActiveValue::Set(text.to_string()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&store.db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_date_is_a_unique_violation() {
        let (_dir, store) = temp_store().await;
        insert_row(&store, 1, "first").await;

        let now = Utc::now();
        let err = task::ActiveModel {
            task_date: ActiveValue::Set(date(1)),
            task: ActiveValue::Set("second".to_string()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&store.db)
        .await
        .unwrap_err();

        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&DbErr::RecordNotInserted));
    }

    #[tokio::test]
    async fn insert_declines_when_date_is_taken() {
        let (_dir, store) = temp_store().await;
        insert_row(&store, 1, "written elsewhere").await;

        let result = store.insert_if_absent(date(1), "mine", Utc::now()).await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_replace_is_declined() {
        let (_dir, store) = temp_store().await;
        let stale = insert_row(&store, 1, "original").await;
        store
            .upsert_by_date(date(1), "written elsewhere", Utc::now())
            .await
            .unwrap();

        let result = store
            .replace_if_unchanged(stale, "mine", Utc::now())
            .await
            .unwrap();

        assert!(result.is_none());
        let stored = store.find_by_date(date(1)).await.unwrap().unwrap();
        assert_eq!(stored.text(), "written elsewhere");
    }

    #[tokio::test]
    async fn upsert_after_lost_insert_takes_update_path() {
        let (_dir, store) = temp_store().await;
        insert_row(&store, 2, "written elsewhere").await;

        let upserted = store.upsert_by_date(date(2), "mine", Utc::now()).await.unwrap();

        assert_eq!(upserted.outcome(), crate::task::UpsertOutcome::Updated);
        assert_eq!(upserted.previous_text(), Some("written elsewhere"));
        assert_eq!(upserted.entry().text(), "mine");
    }

    #[tokio::test]
    async fn overwrite_reports_previous_text() {
        let (_dir, store) = temp_store().await;
        let created = store.overwrite(date(3), "first", Utc::now()).await.unwrap();
        assert_eq!(created.outcome(), crate::task::UpsertOutcome::Created);

        let updated = store.overwrite(date(3), "second", Utc::now()).await.unwrap();

        assert_eq!(updated.previous_text(), Some("first"));
        assert_eq!(updated.entry().id(), created.entry().id());
        assert_eq!(updated.entry().created_at(), created.entry().created_at());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn settings_and_users_are_replaced_in_place() {
        let (_dir, store) = temp_store().await;
        store.put_setting("start_date", "2025-01-01", Utc::now()).await.unwrap();
        store.put_setting("start_date", "2025-02-01", Utc::now()).await.unwrap();
        assert_eq!(
            store.get_setting("start_date").await.unwrap(),
            Some("2025-02-01".to_string())
        );
        assert_eq!(setting::Entity::find().count(&store.db).await.unwrap(), 1);

        let first = UserRecord::new("admin", "one", crate::identity::Role::Admin, Utc::now());
        store.put_user(first.clone()).await.unwrap();
        let second = UserRecord::new("admin", "two", crate::identity::Role::Admin, Utc::now());
        store.put_user(second.clone()).await.unwrap();

        let stored = store.find_user("admin").await.unwrap().unwrap();
        assert_eq!(stored.password_digest, second.password_digest);
        assert_eq!(user::Entity::find().count(&store.db).await.unwrap(), 1);
    }
}
