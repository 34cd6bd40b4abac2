//! Usage period computation
//!
//! Periods are derived purely from a timestamp, so every instance agrees on
//! the active window without coordination and without the reset scheduler
//! having run.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// A half-open `[start, end)` usage window of one UTC calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    /// Midnight UTC, inclusive
    pub start: DateTime<Utc>,
    /// Next midnight UTC, exclusive
    pub end: DateTime<Utc>,
}

impl Period {
    /// The period containing `now`
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self::day_of(now.date_naive())
    }

    /// The period covering a calendar date
    pub fn day_of(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// Calendar date of the period
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Whether `at` falls within the period
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// The period immediately after this one
    pub fn next(&self) -> Self {
        Self::containing(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_midnight_belongs_to_new_day() {
        let before = Period::containing(ts("2025-06-30T23:59:59.999Z"));
        let after = Period::containing(ts("2025-07-01T00:00:00Z"));

        assert_eq!(before.end, after.start);
        assert_ne!(before, after);
        assert_eq!(after.start, ts("2025-07-01T00:00:00Z"));
        assert_eq!(before.next(), after);
    }

    #[test]
    fn test_offset_timestamps_use_utc_day() {
        let local = DateTime::parse_from_rfc3339("2025-07-01T01:30:00+03:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            Period::containing(local).date(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
        );
    }

    proptest! {
        /// Property: any two instants on the same UTC day share a period
        #[test]
        fn prop_same_day_same_period(day in 0i64..20_000, a in 0i64..86_400, b in 0i64..86_400) {
            let base = ts("1990-01-01T00:00:00Z") + Duration::days(day);
            let first = Period::containing(base + Duration::seconds(a));
            let second = Period::containing(base + Duration::seconds(b));
            prop_assert_eq!(first, second);
            prop_assert!(first.contains(base + Duration::seconds(a)));
        }

        /// Property: the period always contains the instant it was derived from
        #[test]
        fn prop_period_contains_origin(secs in 0i64..4_000_000_000) {
            let now = DateTime::from_timestamp(secs, 0).unwrap();
            let period = Period::containing(now);
            prop_assert!(period.contains(now));
            prop_assert_eq!(period.end - period.start, Duration::days(1));
        }
    }
}
