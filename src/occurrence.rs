//! Next-occurrence computation.
//!
//! Given a compiled [`CronExpression`] and a reference instant, finds the
//! earliest whole-second instant strictly after the second-truncated
//! reference that satisfies every field mask. The search is a classic
//! ripple-carry walk over the calendar: month, then day, hour, minute,
//! second, restarting from the month level whenever a coarser unit wraps.
//!
//! Day-of-month and day-of-week must BOTH match. This deviates from
//! traditional cron's OR-when-both-restricted rule on purpose.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use log::trace;

use crate::errors::CronflowError;
use crate::expression::CronExpression;
use crate::Result;

/// How many calendar years past the reference the search may scan before
/// giving up on an unsatisfiable expression (e.g. day 31 in February only).
pub(crate) const SEARCH_HORIZON_YEARS: i32 = 5;

/// Computes the next instant matching `expr` strictly after the
/// second-truncation of `reference`.
///
/// # Errors
///
/// Returns [`CronflowError::InvalidExpression`] when no matching instant
/// exists within [`SEARCH_HORIZON_YEARS`] of the reference.
pub(crate) fn next_occurrence(
    expr: &CronExpression,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let origin = reference.naive_utc();
    // exclusive start: drop sub-second precision, then advance one second,
    // so chained calls always move strictly forward
    let mut t = origin.with_nanosecond(0).unwrap_or(origin) + Duration::seconds(1);
    let year_limit = origin.year() + SEARCH_HORIZON_YEARS;

    'scan: while t.year() <= year_limit {
        while expr.month & month_bit(t.month()) == 0 {
            t = first_of_next_month(t);
            if t.month() == 1 {
                // wrapped into a new year, recheck the horizon
                continue 'scan;
            }
        }
        while expr.day & day_bit(t.day()) == 0 || expr.week & weekday_bit(&t) == 0 {
            t = start_of_next_day(t);
            if t.day() == 1 {
                continue 'scan;
            }
        }
        while expr.hour & (1 << t.hour()) == 0 {
            t = start_of_next_hour(t);
            if t.hour() == 0 {
                continue 'scan;
            }
        }
        while expr.minute & (1 << t.minute()) == 0 {
            t = start_of_next_minute(t);
            if t.minute() == 0 {
                continue 'scan;
            }
        }
        while expr.second & (1 << t.second()) == 0 {
            t += Duration::seconds(1);
            if t.second() == 0 {
                continue 'scan;
            }
        }
        trace!("next occurrence after {} is {}", reference, t);
        return Ok(DateTime::from_naive_utc_and_offset(t, Utc));
    }

    Err(CronflowError::InvalidExpression(format!(
        "no matching instant within {} years of {}",
        SEARCH_HORIZON_YEARS, reference
    )))
}

fn month_bit(month: u32) -> u64 {
    1 << (month - 1)
}

fn day_bit(day: u32) -> u64 {
    1 << (day - 1)
}

fn weekday_bit(t: &NaiveDateTime) -> u64 {
    1 << t.weekday().num_days_from_sunday()
}

/// Midnight on the first day of the following month. Zeroing the finer
/// fields here is what makes the carry propagate correctly.
fn first_of_next_month(t: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(NaiveDate::MAX) // only past chrono's year range; horizon ends the scan first
        .and_time(NaiveTime::MIN)
}

fn start_of_next_day(t: NaiveDateTime) -> NaiveDateTime {
    t.date()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
}

fn start_of_next_hour(t: NaiveDateTime) -> NaiveDateTime {
    t + Duration::seconds(i64::from(3600 - t.minute() * 60 - t.second()))
}

fn start_of_next_minute(t: NaiveDateTime) -> NaiveDateTime {
    t + Duration::seconds(i64::from(60 - t.second()))
}
