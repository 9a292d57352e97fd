//! Timezone Batcher — per-timezone cohorts and wall-clock helpers.

use chrono::{DateTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use nudge_core::User;

/// Users sharing one IANA timezone.
#[derive(Debug, Clone)]
pub struct TimezoneBatch {
    pub timezone: String,
    pub users: Vec<User>,
}

/// `None` for identifiers chrono-tz does not know.
pub fn parse_timezone(timezone: &str) -> Option<Tz> {
    timezone.parse::<Tz>().ok()
}

/// Partition users by timezone ("UTC" when unset), in first-seen order.
pub fn group_by_timezone(users: Vec<User>) -> Vec<TimezoneBatch> {
    let mut batches: Vec<TimezoneBatch> = Vec::new();
    for user in users {
        let timezone = user.timezone_or_utc().to_string();
        match batches.iter_mut().find(|b| b.timezone == timezone) {
            Some(batch) => batch.users.push(user),
            None => batches.push(TimezoneBatch {
                timezone,
                users: vec![user],
            }),
        }
    }
    batches
}

/// Reapply the wall-clock hour of `instant` in `timezone` to the instant.
/// Unknown identifiers return the input unchanged.
pub fn convert_to_user_timezone(instant: DateTime<Utc>, timezone: &str) -> DateTime<Utc> {
    let Some(tz) = parse_timezone(timezone) else {
        tracing::debug!("Unknown timezone '{}', keeping UTC", timezone);
        return instant;
    };
    let hour = instant.with_timezone(&tz).hour();
    instant.with_hour(hour).unwrap_or(instant)
}

/// Wall-clock hour of `instant` in `timezone`; the UTC hour for unknown zones.
pub fn local_hour(instant: DateTime<Utc>, timezone: &str) -> u32 {
    match parse_timezone(timezone) {
        Some(tz) => instant.with_timezone(&tz).hour(),
        None => instant.hour(),
    }
}

/// Whole-hour UTC offset of `timezone` at `at`; 0 for unknown zones.
pub fn timezone_offset_hours(timezone: &str, at: DateTime<Utc>) -> i32 {
    match parse_timezone(timezone) {
        Some(tz) => tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc() / 3600,
        None => 0,
    }
}
