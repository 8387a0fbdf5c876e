use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::task;

/// Date format accepted from users and stored in settings.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Input rejected before it reaches the ledger.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task text was empty or only whitespace.
    #[error("Task text must not be empty")]
    EmptyTaskText,
    /// A date could not be parsed as `YYYY-MM-DD`.
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Parses a `YYYY-MM-DD` date typed by a user.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), ISO_DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

/// Task text that is known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskText(String);

impl TaskText {
    /// Trims surrounding whitespace and rejects blank input.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTaskText);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One journal entry. At most one exists per `task_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    id: u32,
    task_date: NaiveDate,
    text: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskEntry {
    pub fn new(
        id: u32,
        task_date: NaiveDate,
        text: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_date,
            text,
            created_at,
            updated_at,
        }
    }

    /// Returns the ID of the entry.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the calendar date the entry is recorded for.
    pub fn task_date(&self) -> NaiveDate {
        self.task_date
    }

    /// Returns the task description.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the text in place and returns the previous text.
    pub(crate) fn replace_text(&mut self, text: &str, now: DateTime<Utc>) -> String {
        self.updated_at = now;
        std::mem::replace(&mut self.text, text.to_string())
    }
}

impl From<task::Model> for TaskEntry {
    fn from(model: task::Model) -> Self {
        TaskEntry::new(
            model.id as u32,
            model.task_date,
            model.task,
            model.created_at,
            model.updated_at,
        )
    }
}

/// Whether an upsert inserted a new row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Result of saving the task for a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    outcome: UpsertOutcome,
    entry: TaskEntry,
    previous_text: Option<String>,
}

impl Upserted {
    pub fn created(entry: TaskEntry) -> Self {
        Self {
            outcome: UpsertOutcome::Created,
            entry,
            previous_text: None,
        }
    }

    pub fn updated(entry: TaskEntry, previous_text: String) -> Self {
        Self {
            outcome: UpsertOutcome::Updated,
            entry,
            previous_text: Some(previous_text),
        }
    }

    pub fn outcome(&self) -> UpsertOutcome {
        self.outcome
    }

    /// Returns the entry as it is stored after the write.
    pub fn entry(&self) -> &TaskEntry {
        &self.entry
    }

    /// Returns the text that was overwritten, if the date already had an entry.
    pub fn previous_text(&self) -> Option<&str> {
        self.previous_text.as_deref()
    }
}
