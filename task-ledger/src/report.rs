//! Day numbering, progress and the chronological report built from ledger entries.

use chrono::NaiveDate;
use serde::Serialize;

use crate::task::TaskEntry;

/// Length of the tracked internship period, in days.
pub const DEFAULT_TOTAL_DAYS: u32 = 548;

/// Long human-readable date, e.g. "Wednesday, 05 March 2025".
pub const LONG_DATE_FORMAT: &str = "%A, %d %B %Y";

/// Returns the 1-based day of `task_date` counted from `start_date`.
///
/// Dates before the start date have no day number.
pub fn compute_day_number(task_date: NaiveDate, start_date: NaiveDate) -> Option<u32> {
    let day = (task_date - start_date).num_days() + 1;
    u32::try_from(day).ok().filter(|day| *day >= 1)
}

pub fn format_long_date(date: NaiveDate) -> String {
    date.format(LONG_DATE_FORMAT).to_string()
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub day_number: Option<u32>,
    pub date: NaiveDate,
    pub formatted_date: String,
    pub task: String,
}

impl ReportRow {
    pub fn from_entry(entry: &TaskEntry, start_date: NaiveDate) -> Self {
        Self {
            day_number: compute_day_number(entry.task_date(), start_date),
            date: entry.task_date(),
            formatted_date: format_long_date(entry.task_date()),
            task: entry.text().to_string(),
        }
    }
}

/// Every ledger entry with its day number, oldest date first.
///
/// Rows are ordered by calendar date, so entries that predate the start date
/// keep their calendar position instead of being grouped at either end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    start_date: NaiveDate,
    rows: Vec<ReportRow>,
}

impl Report {
    /// Builds the report, or `None` when there are no entries at all.
    pub fn build<I>(start_date: NaiveDate, entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = TaskEntry>,
    {
        let mut rows: Vec<ReportRow> = entries
            .into_iter()
            .map(|entry| ReportRow::from_entry(&entry, start_date))
            .collect();
        if rows.is_empty() {
            return None;
        }
        rows.sort_by_key(|row| row.date);
        Some(Self { start_date, rows })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps the rows matching `filter`. The result may be empty.
    pub fn filter(&self, filter: &ReportFilter) -> Report {
        Report {
            start_date: self.start_date,
            rows: self
                .rows
                .iter()
                .filter(|row| filter.matches(row))
                .cloned()
                .collect(),
        }
    }
}

/// Narrows a report by day window and text search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    /// Inclusive lower bound on the day number.
    pub min_day: Option<u32>,
    /// Inclusive upper bound on the day number.
    pub max_day: Option<u32>,
    /// Case-insensitive substring of the task text.
    pub search: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, row: &ReportRow) -> bool {
        self.matches_day(row.day_number) && self.matches_text(&row.task)
    }

    fn matches_day(&self, day_number: Option<u32>) -> bool {
        if self.min_day.is_none() && self.max_day.is_none() {
            return true;
        }
        // Rows without a day number fall outside any window.
        let Some(day) = day_number else {
            return false;
        };
        self.min_day.is_none_or(|min| day >= min) && self.max_day.is_none_or(|max| day <= max)
    }

    fn matches_text(&self, task: &str) -> bool {
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => task.to_lowercase().contains(&term.to_lowercase()),
        }
    }
}

/// How far into the tracked period `today` is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Whole days elapsed since the start date.
    pub completed: u32,
    pub remaining: u32,
    /// Share of the period elapsed, 0 to 100.
    pub percent: f64,
}

impl Progress {
    pub fn compute(start_date: NaiveDate, today: NaiveDate, total_days: u32) -> Self {
        let elapsed = (today - start_date).num_days().max(0);
        let completed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        let remaining = total_days.saturating_sub(completed);
        let percent = if total_days == 0 {
            100.0
        } else {
            (f64::from(completed) / f64::from(total_days)).min(1.0) * 100.0
        };
        Self {
            completed,
            remaining,
            percent,
        }
    }

    pub fn is_started(&self) -> bool {
        self.completed > 0
    }
}
