// Calendar-day arithmetic. All days are UTC calendar days.

use chrono::{DateTime, Days, NaiveTime, Utc};

/// Source of "now". The scheduler itself never reads the system clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Adds `n` calendar days, keeping the time of day. Saturates at chrono's range.
pub fn add_days(ts: DateTime<Utc>, n: i64) -> DateTime<Utc> {
    let shifted = if n >= 0 {
        ts.checked_add_days(Days::new(n as u64))
    } else {
        ts.checked_sub_days(Days::new(n.unsigned_abs()))
    };
    shifted.unwrap_or(if n >= 0 {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// Whole calendar days from `from` to `to`; time of day is ignored.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

pub fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn add_days_keeps_time_of_day() {
        assert_eq!(add_days(at(2026, 1, 1, 15), 30), at(2026, 1, 31, 15));
        assert_eq!(add_days(at(2026, 1, 1, 15), 90), at(2026, 4, 1, 15));
        assert_eq!(add_days(at(2026, 3, 1, 8), -1), at(2026, 2, 28, 8));
    }

    #[test]
    fn days_between_ignores_time() {
        assert_eq!(days_between(at(2026, 1, 4, 23), at(2026, 1, 11, 1)), 7);
        assert_eq!(days_between(at(2026, 1, 11, 1), at(2026, 1, 4, 23)), -7);
        assert_eq!(days_between(at(2026, 1, 4, 0), at(2026, 1, 4, 23)), 0);
    }

    #[test]
    fn start_of_day_truncates() {
        assert_eq!(start_of_day(at(2026, 5, 17, 19)), at(2026, 5, 17, 0));
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = FixedClock(at(2026, 1, 1, 9));
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), at(2026, 1, 1, 9));
    }
}
