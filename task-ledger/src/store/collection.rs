use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ScanOrder, ScanQuery};
use crate::identity::UserRecord;
use crate::task::{TaskEntry, Upserted};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct SettingValue {
    pub(crate) value: String,
    pub(crate) updated_at: DateTime<Utc>,
}

/// Tasks, settings and users held in one serializable value.
///
/// Tasks are keyed by date, so a second entry for a date cannot exist.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Collection {
    #[serde(default)]
    tasks: BTreeMap<NaiveDate, TaskEntry>,
    next_id: u32,
    #[serde(default)]
    settings: BTreeMap<String, SettingValue>,
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    pub(crate) fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_id: 1,
            settings: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }

    pub(crate) fn find_by_date(&self, date: NaiveDate) -> Option<&TaskEntry> {
        self.tasks.get(&date)
    }

    pub(crate) fn find_by_id(&self, id: u32) -> Option<&TaskEntry> {
        self.tasks.values().find(|entry| entry.id() == id)
    }

    pub(crate) fn upsert(&mut self, date: NaiveDate, text: &str, now: DateTime<Utc>) -> Upserted {
        if let Some(existing) = self.tasks.get_mut(&date) {
            let previous = existing.replace_text(text, now);
            return Upserted::updated(existing.clone(), previous);
        }

        let id = self.next_id;
        self.next_id += 1;
        let entry = TaskEntry::new(id, date, text.to_string(), now, now);
        self.tasks.insert(date, entry.clone());
        Upserted::created(entry)
    }

    pub(crate) fn update_text(
        &mut self,
        id: u32,
        text: &str,
        now: DateTime<Utc>,
    ) -> Option<TaskEntry> {
        let entry = self.tasks.values_mut().find(|entry| entry.id() == id)?;
        entry.replace_text(text, now);
        Some(entry.clone())
    }

    pub(crate) fn delete(&mut self, id: u32) -> Option<TaskEntry> {
        let date = self.find_by_id(id)?.task_date();
        self.tasks.remove(&date)
    }

    /// Removes every task. IDs are not reused afterwards.
    pub(crate) fn clear(&mut self) -> u64 {
        let removed = self.tasks.len() as u64;
        self.tasks.clear();
        removed
    }

    pub(crate) fn scan(&self, query: &ScanQuery) -> Vec<TaskEntry> {
        let matching = self.tasks.values();
        let limit = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        match query.order {
            ScanOrder::Ascending => matching.take(limit).cloned().collect(),
            ScanOrder::Descending => matching.rev().take(limit).cloned().collect(),
        }
    }

    pub(crate) fn count(&self) -> u64 {
        self.tasks.len() as u64
    }

    pub(crate) fn date_bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (
            self.tasks.keys().next().copied(),
            self.tasks.keys().next_back().copied(),
        )
    }

    pub(crate) fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|setting| setting.value.clone())
    }

    pub(crate) fn put_setting(&mut self, key: &str, value: &str, now: DateTime<Utc>) {
        self.settings.insert(
            key.to_string(),
            SettingValue {
                value: value.to_string(),
                updated_at: now,
            },
        );
    }

    pub(crate) fn find_user(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).cloned()
    }

    pub(crate) fn put_user(&mut self, user: UserRecord) {
        self.users.insert(user.username.clone(), user);
    }
}
