//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Per field: `*`, `N`, `A-B`, `*/N`, `A-B/N`, `A/N` and comma lists.
//! Months accept `jan`..`dec`, weekdays `sun`..`sat` (`0` and `7` are Sunday).
//! Example: "0 8 * * 1-5" = weekdays at 8:00
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either does (classic cron behaviour).

use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use lookout_core::{LookoutError, Result};

/// How far ahead `next_after` searches before giving up (covers Feb 29).
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

#[derive(Clone, Copy)]
enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            // 7 is accepted and folded onto Sunday.
            Field::DayOfWeek => (0, 7),
        }
    }

    fn value(self, token: &str) -> Option<u32> {
        if let Ok(n) = token.parse::<u32>() {
            return Some(n);
        }
        let lower = token.to_ascii_lowercase();
        let names: &[&str] = match self {
            Field::Month => &MONTH_NAMES,
            Field::DayOfWeek => &DAY_NAMES,
            _ => return None,
        };
        let offset = if matches!(self, Field::Month) { 1 } else { 0 };
        names
            .iter()
            .position(|n| *n == lower)
            .map(|i| i as u32 + offset)
    }
}

fn invalid(expression: &str, reason: impl std::fmt::Display) -> LookoutError {
    LookoutError::Validation(format!("invalid cron expression '{expression}': {reason}"))
}

/// Parse one field into a bitmask of allowed values.
fn parse_field(expression: &str, field: Field, spec: &str) -> Result<u64> {
    let (min, max) = field.bounds();
    let mut mask = 0u64;

    for part in spec.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(expression, format!("bad step in {} '{part}'", field.name())))?;
                if step == 0 {
                    return Err(invalid(expression, format!("zero step in {}", field.name())));
                }
                if step > max {
                    return Err(invalid(
                        expression,
                        format!("step {step} exceeds {} range {min}-{max}", field.name()),
                    ));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let a = field
                .value(a)
                .ok_or_else(|| invalid(expression, format!("bad {} '{a}'", field.name())))?;
            let b = field
                .value(b)
                .ok_or_else(|| invalid(expression, format!("bad {} '{b}'", field.name())))?;
            if a > b {
                return Err(invalid(expression, format!("reversed range in {} '{range}'", field.name())));
            }
            (a, b)
        } else {
            let n = field
                .value(range)
                .ok_or_else(|| invalid(expression, format!("bad {} '{range}'", field.name())))?;
            // `N/S` runs from N to the end of the field.
            if step.is_some() { (n, max) } else { (n, n) }
        };

        if start < min || end > max {
            return Err(invalid(
                expression,
                format!("{} out of range {min}-{max}", field.name()),
            ));
        }

        let step = step.unwrap_or(1);
        let mut v = start;
        while v <= end {
            mask |= 1 << v;
            let Some(next) = v.checked_add(step) else { break };
            v = next;
        }
    }

    if matches!(field, Field::DayOfWeek) && mask & (1 << 7) != 0 {
        mask = (mask & !(1 << 7)) | 1;
    }
    Ok(mask)
}

impl CronSchedule {
    /// Parse and validate a 5-field expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(
                expression,
                "need 5 fields: MIN HOUR DOM MON DOW",
            ));
        }

        Ok(Self {
            expression: parts.join(" "),
            minutes: parse_field(expression, Field::Minute, parts[0])?,
            hours: parse_field(expression, Field::Hour, parts[1])?,
            days_of_month: parse_field(expression, Field::DayOfMonth, parts[2])?,
            months: parse_field(expression, Field::Month, parts[3])?,
            days_of_week: parse_field(expression, Field::DayOfWeek, parts[4])?,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month & (1 << date.day()) != 0;
        let dow = self.days_of_week & (1 << date.weekday().num_days_from_sunday()) != 0;
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    fn matches_naive(&self, t: &NaiveDateTime) -> bool {
        self.months & (1 << t.month()) != 0
            && self.day_matches(t.date())
            && self.hours & (1 << t.hour()) != 0
            && self.minutes & (1 << t.minute()) != 0
    }

    /// Whether the minute containing `t` is a firing minute.
    pub fn matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        self.matches_naive(&t.naive_local())
    }

    /// First firing minute strictly after `after`, in `after`'s time zone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let mut t = after.naive_local().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = t + Duration::days(SEARCH_HORIZON_DAYS);

        while t <= limit {
            if self.months & (1 << t.month()) == 0 {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = (t.date() + Duration::days(1)).and_hms_opt(0, 0, 0)?;
                continue;
            }
            if self.hours & (1 << t.hour()) == 0 {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if self.minutes & (1 << t.minute()) == 0 {
                t += Duration::minutes(1);
                continue;
            }
            if let Some(found) = tz.from_local_datetime(&t).earliest() {
                return Some(found);
            }
            t += Duration::minutes(1);
        }
        None
    }

    /// The next `count` firing times after `after`.
    pub fn upcoming<Tz: TimeZone>(&self, after: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = after.clone();
        while out.len() < count {
            match self.next_after(&cursor) {
                Some(next) => {
                    cursor = next.clone();
                    out.push(next);
                }
                None => break,
            }
        }
        out
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

impl FromStr for CronSchedule {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Syntactic check used before a reminder is persisted.
pub fn is_valid_cron_expression(expression: &str) -> bool {
    CronSchedule::parse(expression).is_ok()
}

/// Parse a cron expression and compute the next run time in UTC.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression) {
        Ok(schedule) => schedule.next_after(&after),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Weekday};

    #[test]
    fn test_every_hour() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = next_run_from_cron("0 * * * *", after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_specific_time() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 0).unwrap();
        let next = next_run_from_cron("0 8 * * *", after).unwrap();
        assert_eq!(next.hour(), 8);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = next_run_from_cron("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_strictly_after() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 15, 0).unwrap();
        let next = next_run_from_cron("*/15 * * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_run_from_cron("bad", after).is_none());
        for expr in [
            "",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "30-10 * * * *",
            "a * * * *",
            "1,,2 * * * *",
            "1/4294967295 * * * *",
            "*/60 * * * *",
            "0 0 * * */99999999999",
        ] {
            assert!(!is_valid_cron_expression(expr), "{expr:?} should be rejected");
        }
    }

    #[test]
    fn test_valid_expressions() {
        for expr in [
            "* * * * *",
            "0 9 * * 1-5",
            "0,30 8-18/2 * * *",
            "15 14 1 * *",
            "0 0 1 jan *",
            "0 12 * * sun",
            "0 12 * * 7",
            "5/10 * * * *",
            "0 0 */31 * *",
        ] {
            assert!(is_valid_cron_expression(expr), "{expr:?} should be accepted");
        }
    }

    #[test]
    fn test_weekdays_only() {
        // 2026-02-21 is a Saturday.
        let after = Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap();
        let next = next_run_from_cron("0 9 * * mon-fri", after).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.day(), 23);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn test_sunday_as_seven() {
        let a = CronSchedule::parse("0 12 * * 7").unwrap();
        let b = CronSchedule::parse("0 12 * * 0").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap();
        assert_eq!(a.next_after(&after), b.next_after(&after));
        assert_eq!(a.next_after(&after).unwrap().weekday(), Weekday::Sun);
    }

    #[test]
    fn test_dom_or_dow_when_both_restricted() {
        // 1st of the month OR any Friday.
        let schedule = CronSchedule::parse("0 0 1 * fri").unwrap();
        // 2026-03-02 is a Monday; next Friday is 2026-03-06, before April 1st.
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let next = schedule.next_after(&after).unwrap();
        assert_eq!((next.month(), next.day()), (3, 6));
    }

    #[test]
    fn test_month_names_and_year_rollover() {
        let after = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap();
        let next = next_run_from_cron("0 0 1 jan *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_leap_day() {
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let next = next_run_from_cron("0 0 29 2 *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2028, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_impossible_date_has_no_next_run() {
        let schedule = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert!(schedule.next_after(&Utc::now()).is_none());
    }

    #[test]
    fn test_evaluated_in_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let after = Utc
            .with_ymd_and_hms(2026, 3, 1, 5, 0, 0)
            .unwrap()
            .with_timezone(&offset);
        let next = CronSchedule::parse("0 9 * * *").unwrap().next_after(&after).unwrap();
        assert_eq!(
            next.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_upcoming_and_matches() {
        let schedule = CronSchedule::parse("0,30 8 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap();
        let runs = schedule.upcoming(&after, 3);
        assert_eq!(runs.len(), 3);
        assert_eq!((runs[0].hour(), runs[0].minute()), (8, 0));
        assert_eq!((runs[1].hour(), runs[1].minute()), (8, 30));
        assert_eq!(runs[2].day(), 2);
        assert!(runs.iter().all(|r| schedule.matches(r)));
    }
}
