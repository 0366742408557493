//! Operational calendar: day-key partitioning and the closing window.
//!
//! All wall-clock reasoning happens in WIB (UTC+7). Stored timestamps stay
//! UTC; only the day-key and the closing window look at local time.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// WIB offset from UTC, in hours.
const WIB_OFFSET_HOURS: i64 = 7;

/// Convert a UTC instant to WIB wall-clock time.
pub fn to_wib(at: DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc() + TimeDelta::hours(WIB_OFFSET_HOURS)
}

/// The UTC instant of a WIB wall-clock time on a given date.
pub fn from_wib(date: NaiveDate, time: ClockTime) -> DateTime<Utc> {
    let local = date.and_hms_opt(time.hour, time.minute, 0).unwrap_or_default();
    (local - TimeDelta::hours(WIB_OFFSET_HOURS)).and_utc()
}

/// Operational day-key for an instant: the WIB calendar date.
pub fn day_key(at: DateTime<Utc>) -> NaiveDate {
    to_wib(at).date()
}

/// Day-key `days` before the one containing `at`.
pub fn day_key_minus(at: DateTime<Utc>, days: i64) -> NaiveDate {
    day_key(at) - TimeDelta::days(days)
}

/// Midnight WIB on the first day of the month containing `at`.
pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let day = day_key(at);
    let first = day.with_day(1).unwrap_or(day);
    from_wib(first, ClockTime { hour: 0, minute: 0 })
}

/// Render a day-key the way it is stored (`YYYY-MM-DD`).
pub fn format_day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Render a day-key for people (`DD-MM-YYYY`).
pub fn display_day(day: NaiveDate) -> String {
    day.format("%d-%m-%Y").to_string()
}

/// A wall-clock time of day in WIB, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Parse `HH.MM`, `HH:MM` or a bare hour.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let mut parts = trimmed.split(['.', ':']);
        let hour = parts.next()?.trim().parse().ok()?;
        let minute = match parts.next() {
            Some(m) => m.trim().parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Self::new(hour, minute)
    }

    fn minutes(self) -> u32 {
        self.hour * 60 + self.minute
    }

    /// The minute after this one, wrapping at midnight.
    pub fn next_minute(self) -> Self {
        let total = (self.minutes() + 1) % (24 * 60);
        Self {
            hour: total / 60,
            minute: total % 60,
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.hour, self.minute)
    }
}

/// A manually scheduled long closure (holiday, stock-taking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualClosure {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Daily maintenance window plus an optional manual closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingWindow {
    pub start: ClockTime,
    pub end: ClockTime,
    #[serde(default)]
    pub manual: Option<ManualClosure>,
}

impl Default for ClosingWindow {
    fn default() -> Self {
        Self {
            start: ClockTime { hour: 4, minute: 1 },
            end: ClockTime { hour: 6, minute: 0 },
            manual: None,
        }
    }
}

impl ClosingWindow {
    pub fn daily(start: ClockTime, end: ClockTime) -> Self {
        Self {
            start,
            end,
            manual: None,
        }
    }

    /// Whether intake is closed at `at`. Both window ends are inclusive.
    pub fn is_closed(&self, at: DateTime<Utc>) -> bool {
        if self.manual_active(at) {
            return true;
        }

        let start = self.start.minutes();
        let end = self.end.minutes();
        if start == end {
            return false;
        }

        let local = to_wib(at);
        let now = local.hour() * 60 + local.minute();
        if start < end {
            now >= start && now <= end
        } else {
            now >= start || now <= end
        }
    }

    fn manual_active(&self, at: DateTime<Utc>) -> bool {
        self.manual.is_some_and(|m| at >= m.start && at <= m.end)
    }

    /// Human description of when intake reopens.
    pub fn reopens_at(&self, at: DateTime<Utc>) -> String {
        match self.manual {
            Some(m) if self.manual_active(at) => {
                let local = to_wib(m.end);
                format!("{} pukul {} WIB", local.format("%d-%m-%Y"), local.format("%H.%M"))
            }
            _ => format!("pukul {} WIB", self.end.next_minute()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Build a UTC instant from a WIB wall-clock time.
    fn wib(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap() - TimeDelta::hours(7)
    }

    #[test]
    fn from_wib_inverts_to_wib() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let at = from_wib(date, ClockTime::new(1, 30).unwrap());
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap());
        assert_eq!(day_key(at), date);
    }

    #[test]
    fn month_starts_at_wib_midnight() {
        let start = month_start(wib(2026, 3, 17, 9, 30));
        assert_eq!(start, wib(2026, 3, 1, 0, 0));
        // 00:30 WIB on the 1st is still the previous UTC day.
        assert_eq!(month_start(wib(2026, 4, 1, 0, 30)), wib(2026, 4, 1, 0, 0));
        assert_eq!(month_start(wib(2026, 3, 31, 23, 59)), wib(2026, 3, 1, 0, 0));
    }

    #[test]
    fn day_key_follows_wib_calendar() {
        // 18:30 UTC on the 1st is already 01:30 on the 2nd in WIB.
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap();
        assert_eq!(day_key(at), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(day_key_minus(at, 1), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn default_window_is_inclusive() {
        let window = ClosingWindow::default();
        let cases = [
            ((4, 0), false),
            ((4, 1), true),
            ((5, 30), true),
            ((6, 0), true),
            ((6, 1), false),
            ((23, 59), false),
        ];
        for ((h, m), closed) in cases {
            assert_eq!(
                window.is_closed(wib(2026, 3, 2, h, m)),
                closed,
                "{h:02}.{m:02} closed should be {closed}"
            );
        }
    }

    #[test]
    fn window_crossing_midnight() {
        let window =
            ClosingWindow::daily(ClockTime::new(23, 0).unwrap(), ClockTime::new(4, 0).unwrap());
        assert!(window.is_closed(wib(2026, 3, 2, 23, 30)));
        assert!(window.is_closed(wib(2026, 3, 2, 2, 0)));
        assert!(!window.is_closed(wib(2026, 3, 2, 12, 0)));
    }

    #[test]
    fn equal_bounds_never_close() {
        let t = ClockTime::new(0, 0).unwrap();
        let window = ClosingWindow::daily(t, t);
        for h in 0..24 {
            assert!(!window.is_closed(wib(2026, 3, 2, h, 0)));
        }
    }

    #[test]
    fn manual_closure_overrides_daily_window() {
        let mut window = ClosingWindow::default();
        window.manual = Some(ManualClosure {
            start: wib(2026, 3, 2, 8, 0),
            end: wib(2026, 3, 4, 12, 0),
        });
        assert!(window.is_closed(wib(2026, 3, 3, 15, 0)));
        assert!(!window.is_closed(wib(2026, 3, 5, 15, 0)));
        assert_eq!(
            window.reopens_at(wib(2026, 3, 3, 15, 0)),
            "04-03-2026 pukul 12.00 WIB"
        );
    }

    #[test]
    fn clock_time_parsing() {
        assert_eq!(ClockTime::parse("04.01"), ClockTime::new(4, 1));
        assert_eq!(ClockTime::parse("6:00"), ClockTime::new(6, 0));
        assert_eq!(ClockTime::parse("7"), ClockTime::new(7, 0));
        assert_eq!(ClockTime::parse("24.00"), None);
        assert_eq!(ClockTime::parse("1.2.3"), None);
        assert_eq!(
            ClockTime::new(23, 59).unwrap().next_minute(),
            ClockTime::new(0, 0).unwrap()
        );
        assert_eq!(ClockTime::new(6, 0).unwrap().to_string(), "06.00");
    }
}
