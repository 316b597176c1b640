use chrono::{DateTime, NaiveDate, Utc};

/// Calendar day used for streak bookkeeping. Streaks are counted in UTC days.
pub fn calendar_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Whole calendar days from `earlier` to `later` (negative if reversed).
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}
