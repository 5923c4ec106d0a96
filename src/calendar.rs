//! Month calendar over dated records: grouping by (year, month, day), month
//! navigation, the month grid and the per-day detail.

use chrono::{Datelike, Months, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn days_in_month(&self) -> u32 {
        let first = self.first_day();
        first
            .checked_add_months(Months::new(1))
            .map(|next| next.signed_duration_since(first).num_days() as u32)
            .unwrap_or(31)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

/// (year, month) -> day -> records, in input order within a day.
pub type Buckets<T> = BTreeMap<YearMonth, BTreeMap<u32, Vec<T>>>;

pub fn bucket<T: Clone>(records: &[T], key: impl Fn(&T) -> NaiveDate) -> Buckets<T> {
    let mut buckets: Buckets<T> = BTreeMap::new();
    for record in records {
        let date = key(record);
        buckets
            .entry(YearMonth::of(date))
            .or_default()
            .entry(date.day())
            .or_default()
            .push(record.clone());
    }
    buckets
}

/// Local calendar date a schedule is filed under. Only `startDate` counts.
pub fn schedule_day(schedule: &Schedule, tz: Tz) -> NaiveDate {
    schedule.start_date.with_timezone(&tz).date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub day: u32,
    pub count: usize,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st, weeks starting on Sunday
    pub leading_blanks: u32,
    pub days: Vec<DayCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayDetail<T> {
    pub date: NaiveDate,
    pub records: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct CalendarView<T> {
    buckets: Buckets<T>,
    cursor: YearMonth,
    detail: Option<DayDetail<T>>,
}

impl<T: Clone> CalendarView<T> {
    /// Records must already be in display order (store order).
    pub fn new(records: &[T], key: impl Fn(&T) -> NaiveDate, today: NaiveDate) -> Self {
        Self {
            buckets: bucket(records, key),
            cursor: YearMonth::of(today),
            detail: None,
        }
    }

    pub fn cursor(&self) -> YearMonth {
        self.cursor
    }

    pub fn next_month(&mut self) {
        self.cursor = self.cursor.next();
    }

    pub fn prev_month(&mut self) {
        self.cursor = self.cursor.prev();
    }

    pub fn select_year(&mut self, year: i32) {
        if let Some(ym) = YearMonth::new(year, self.cursor.month) {
            self.cursor = ym;
        }
    }

    /// Months outside 1..=12 are ignored.
    pub fn select_month(&mut self, month: u32) {
        if let Some(ym) = YearMonth::new(self.cursor.year, month) {
            self.cursor = ym;
        }
    }

    /// Years offered by the year picker: two either side of the shown year.
    pub fn year_options(&self) -> Vec<i32> {
        (self.cursor.year - 2..=self.cursor.year + 2).collect()
    }

    pub fn records_on(&self, day: u32) -> &[T] {
        self.buckets
            .get(&self.cursor)
            .and_then(|days| days.get(&day))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn month_grid(&self, today: NaiveDate) -> MonthGrid {
        let first = self.cursor.first_day();
        let days = (1..=self.cursor.days_in_month())
            .map(|day| DayCell {
                day,
                count: self.records_on(day).len(),
                is_today: first.with_day(day) == Some(today),
            })
            .collect();

        MonthGrid {
            year: self.cursor.year,
            month: self.cursor.month,
            leading_blanks: first.weekday().num_days_from_sunday(),
            days,
        }
    }

    /// Opens the day detail when the day has at least one record.
    pub fn select_day(&mut self, day: u32) -> Option<&DayDetail<T>> {
        let records = self.records_on(day).to_vec();
        let date = self.cursor.first_day().with_day(day)?;
        if records.is_empty() {
            return None;
        }
        self.detail = Some(DayDetail { date, records });
        self.detail.as_ref()
    }

    pub fn detail(&self) -> Option<&DayDetail<T>> {
        self.detail.as_ref()
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }
}
