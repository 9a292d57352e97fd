//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds), evaluated in UTC.
//! Field syntax: *, */N, N, A-B, A-B/N and comma lists of those.
//! Example: "0 * * * *" = top of every hour.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use nudge_core::{NudgeError, Result};

/// How far ahead `next_after` searches before giving up.
const MAX_LOOKAHEAD_DAYS: u32 = 366 * 5;

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    /// 0 = Sunday.
    days_of_week: Vec<u32>,
    dom_any: bool,
    dow_any: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(NudgeError::Config(format!(
                "Invalid cron expression: '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            )));
        }

        let field = |spec: &str, min: u32, max: u32, name: &str| {
            parse_field(spec, min, max).ok_or_else(|| {
                NudgeError::Config(format!("Invalid {name} field '{spec}' in '{expression}'"))
            })
        };

        let minutes = field(parts[0], 0, 59, "minute")?;
        let hours = field(parts[1], 0, 23, "hour")?;
        let days_of_month = field(parts[2], 1, 31, "day-of-month")?;
        let months = field(parts[3], 1, 12, "month")?;
        let mut days_of_week = field(parts[4], 0, 7, "day-of-week")?;
        // 7 is Sunday too.
        if days_of_week.contains(&7) {
            days_of_week.retain(|d| *d != 7);
            if !days_of_week.contains(&0) {
                days_of_week.insert(0, 0);
            }
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_any: parts[2] == "*",
            dow_any: parts[4] == "*",
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = (after + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;

        let mut day = start.date_naive();
        for _ in 0..MAX_LOOKAHEAD_DAYS {
            if self.day_matches(day) {
                for &h in &self.hours {
                    for &m in &self.minutes {
                        let candidate = day.and_hms_opt(h, m, 0)?.and_utc();
                        if candidate >= start {
                            return Some(candidate);
                        }
                    }
                }
            }
            day = day.succ_opt()?;
        }
        None
    }

    /// Standard cron rule: when both day fields are restricted, either may match.
    fn day_matches(&self, day: NaiveDate) -> bool {
        if !self.months.contains(&day.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(&day.day());
        let dow = self
            .days_of_week
            .contains(&day.weekday().num_days_from_sunday());
        match (self.dom_any, self.dow_any) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }
}

/// Parse a cron expression and compute the next run time.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression) {
        Ok(schedule) => schedule.next_after(after),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}

/// Parse a cron field into a sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let mut values = Vec::new();
    for part in field.split(',') {
        values.extend(parse_part(part.trim(), min, max)?);
    }
    values.sort_unstable();
    values.dedup();
    if values.is_empty() { None } else { Some(values) }
}

fn parse_part(part: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let n: u32 = step.parse().ok()?;
            if n == 0 {
                return None;
            }
            (range, n)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        (a.parse().ok()?, b.parse().ok()?)
    } else {
        let n: u32 = range.parse().ok()?;
        // "5/15" means from 5 to the end.
        if step > 1 { (n, max) } else { (n, n) }
    };

    if lo < min || hi > max || lo > hi {
        return None;
    }
    Some((lo..=hi).step_by(step as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_every_hour() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = next_run_from_cron("0 * * * *", after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_specific_time_rolls_to_next_day() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 19, 0, 0).unwrap();
        let next = next_run_from_cron("0 19 * * *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 23, 19, 0, 0).unwrap());
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = next_run_from_cron("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_ranges_and_lists() {
        let schedule = CronSchedule::parse("30 8-10,17 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 45, 0).unwrap();
        assert_eq!(
            schedule.next_after(after).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 22, 17, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_day_of_week() {
        // 2026-02-22 is a Sunday; next Monday 09:00.
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap();
        let next = next_run_from_cron("0 9 * * 1", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0).unwrap());

        let sunday = next_run_from_cron("0 9 * * 7", after).unwrap();
        assert_eq!(sunday, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_month_and_day() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap();
        let next = next_run_from_cron("0 0 1 6 *", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_run_from_cron("bad", after).is_none());
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("0 5-2 * * *").is_err());
    }
}
