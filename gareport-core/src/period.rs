//! Reporting period names.
//!
//! Periods are calendar months named `YYYY-MM`. Two names are special:
//! [`CUMULATIVE_PERIOD`] holds per-url running totals and [`PURGE_ALL`]
//! selects every period when purging.

use crate::error::{Error, Result};
use crate::types::{CUMULATIVE_PERIOD, PURGE_ALL};
use chrono::{Datelike, NaiveDate};

/// Period name for the month containing `date`.
pub fn month_name(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Day of month through which data for `date`'s month is complete, as of `today`.
///
/// Past months are complete through their last day. The current month is
/// complete through yesterday (0 on the first of the month).
pub fn complete_day(date: NaiveDate, today: NaiveDate) -> u32 {
    if date.year() == today.year() && date.month() == today.month() {
        today.day() - 1
    } else {
        last_day_of_month(date)
    }
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

/// Reject period names that cannot receive ingested data.
pub fn ensure_ingestible(period_name: &str) -> Result<()> {
    if period_name.trim().is_empty()
        || period_name == CUMULATIVE_PERIOD
        || period_name == PURGE_ALL
    {
        return Err(Error::ReservedPeriod(period_name.to_string()));
    }
    Ok(())
}
