use anyhow::Context;
use chrono::{NaiveDate, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .with_context(|| format!("expected a YYYY-MM-DD date, got {s:?}"))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Walks a closed range one calendar day at a time. Yields nothing when
/// `start > end`.
#[derive(Debug, Clone)]
pub struct DayCursor {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl DayCursor {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            next: (start <= end).then_some(start),
            end,
        }
    }
}

impl Iterator for DayCursor {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = current.succ_opt().filter(|d| *d <= self.end);
        Some(current)
    }
}
