//! Optimal-Time Resolver — when in the user's day a nudge should land.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use nudge_core::config::TimingConfig;
use nudge_core::traits::HistoryStore;
use nudge_core::{NudgePreferences, Result, User, EVENT_NUDGE_CLICKED, EVENT_NUDGE_OPENED};

use crate::timezone::parse_timezone;

pub struct OptimalTimeResolver {
    history: Arc<dyn HistoryStore>,
    config: TimingConfig,
}

impl OptimalTimeResolver {
    pub fn new(history: Arc<dyn HistoryStore>, config: TimingConfig) -> Self {
        Self { history, config }
    }

    /// Send time on the local date of `reference`, in the user's timezone.
    pub fn compute_optimal_time(&self, user: &User, reference: DateTime<Utc>) -> DateTime<Tz> {
        let tz = user_tz(user);
        let local = reference.with_timezone(&tz);
        let hour = optimal_hour(&user.preferences, local.weekday(), &self.config);

        let naive = local
            .date_naive()
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN));
        // Spring-forward gaps have no local 02:00; keep the reference instead.
        tz.from_local_datetime(&naive).earliest().unwrap_or(local)
    }

    /// The optimal hour for the user's current local day.
    pub fn optimal_hour_now(&self, user: &User, now: DateTime<Utc>) -> u32 {
        let local = now.with_timezone(&user_tz(user));
        optimal_hour(&user.preferences, local.weekday(), &self.config)
    }

    /// Today's send hour: the stated preference when there is one, otherwise
    /// the hour the user has been engaging at.
    pub async fn send_hour_now(&self, user: &User, now: DateTime<Utc>) -> Result<u32> {
        if preferred_hour(&user.preferences).is_some() {
            return Ok(self.optimal_hour_now(user, now));
        }
        let learned = self.compute_learned_hour(user).await?;
        let weekday = now.with_timezone(&user_tz(user)).weekday();
        Ok(adjust_hour(learned, &user.preferences, weekday, &self.config))
    }

    /// Rounded mean local hour of opens and clicks over the trailing window.
    pub async fn compute_learned_hour(&self, user: &User) -> Result<u32> {
        let since = Utc::now() - Duration::days(self.config.learned_window_days);
        let times = self
            .history
            .event_times(&user.id, &[EVENT_NUDGE_OPENED, EVENT_NUDGE_CLICKED], since)
            .await?;
        if times.is_empty() {
            return Ok(self.config.default_hour);
        }

        let tz = user_tz(user);
        let total: u32 = times.iter().map(|t| t.with_timezone(&tz).hour()).sum();
        let mean = f64::from(total) / times.len() as f64;
        Ok((mean.round() as u32).min(23))
    }
}

fn user_tz(user: &User) -> Tz {
    parse_timezone(user.timezone_or_utc()).unwrap_or(Tz::UTC)
}

/// Preferred hour (or the default), pushed later on weekends when asked,
/// and reset to the default if it lands in the sleep window.
pub fn optimal_hour(preferences: &NudgePreferences, weekday: Weekday, config: &TimingConfig) -> u32 {
    let hour = preferred_hour(preferences).unwrap_or(config.default_hour);
    adjust_hour(hour, preferences, weekday, config)
}

fn preferred_hour(preferences: &NudgePreferences) -> Option<u32> {
    preferences.preferred_nudge_time.as_deref().and_then(parse_hour)
}

fn adjust_hour(
    mut hour: u32,
    preferences: &NudgePreferences,
    weekday: Weekday,
    config: &TimingConfig,
) -> u32 {
    if preferences.weekend_delay && matches!(weekday, Weekday::Sat | Weekday::Sun) {
        hour = (hour + config.weekend_delay_hours) % 24;
    }

    if in_sleep_window(hour, config) {
        hour = config.default_hour;
    }
    hour
}

/// [sleep_start, 24) ∪ [0, sleep_end)
fn in_sleep_window(hour: u32, config: &TimingConfig) -> bool {
    hour >= config.sleep_start || hour < config.sleep_end
}

/// Hour part of "HH:MM".
fn parse_hour(time: &str) -> Option<u32> {
    let hour: u32 = time.split(':').next()?.trim().parse().ok()?;
    (hour < 24).then_some(hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::BehaviorEvent;
    use nudge_store::MemoryHistory;

    fn prefs(time: Option<&str>, weekend_delay: bool) -> NudgePreferences {
        NudgePreferences {
            preferred_nudge_time: time.map(str::to_string),
            weekend_delay,
            ..Default::default()
        }
    }

    fn resolver(history: Arc<MemoryHistory>) -> OptimalTimeResolver {
        OptimalTimeResolver::new(history, TimingConfig::default())
    }

    #[test]
    fn test_optimal_hour_rules() {
        let cfg = TimingConfig::default();
        assert_eq!(optimal_hour(&prefs(None, false), Weekday::Mon, &cfg), 9);
        assert_eq!(optimal_hour(&prefs(Some("21:15"), false), Weekday::Tue, &cfg), 21);
        // 23 is in the sleep window.
        assert_eq!(optimal_hour(&prefs(Some("23:30"), false), Weekday::Wed, &cfg), 9);
        assert_eq!(optimal_hour(&prefs(Some("06:00"), false), Weekday::Wed, &cfg), 9);
        assert_eq!(optimal_hour(&prefs(Some("08:00"), true), Weekday::Sat, &cfg), 10);
        assert_eq!(optimal_hour(&prefs(Some("08:00"), true), Weekday::Fri, &cfg), 8);
        // 22 + 2 wraps to 0, which is asleep.
        assert_eq!(optimal_hour(&prefs(Some("22:00"), true), Weekday::Sun, &cfg), 9);
        assert_eq!(optimal_hour(&prefs(Some("garbage"), false), Weekday::Mon, &cfg), 9);
    }

    #[test]
    fn test_weekend_is_judged_in_local_time() {
        let mut user = User::new("u1");
        user.timezone = Some("Asia/Ho_Chi_Minh".into());
        user.preferences = prefs(Some("08:00"), true);

        // Friday 20:00 UTC is Saturday 03:00 in Ho Chi Minh City.
        let reference = Utc.with_ymd_and_hms(2026, 3, 6, 20, 0, 0).unwrap();
        let at = resolver(Arc::new(MemoryHistory::new())).compute_optimal_time(&user, reference);
        assert_eq!(at.hour(), 10);
        assert_eq!(at.day(), 7);
        assert_eq!(at.with_timezone(&Utc).hour(), 3);
    }

    #[test]
    fn test_invalid_timezone_uses_utc() {
        let mut user = User::new("u1");
        user.timezone = Some("Nowhere/Land".into());
        let reference = Utc.with_ymd_and_hms(2026, 3, 4, 23, 0, 0).unwrap();
        let at = resolver(Arc::new(MemoryHistory::new())).compute_optimal_time(&user, reference);
        assert_eq!(at.hour(), 9);
        assert_eq!(at.day(), 4);
    }

    fn event_at(user: &str, event_type: &str, at: DateTime<Utc>) -> BehaviorEvent {
        let mut event = BehaviorEvent::new(user, event_type, "/nudge/engagement", serde_json::json!({}));
        event.timestamp = at;
        event
    }

    #[tokio::test]
    async fn test_learned_hour_average() {
        let history = Arc::new(MemoryHistory::new());
        let day = |days_ago: i64, hour: u32| {
            (Utc::now() - Duration::days(days_ago))
                .with_hour(hour)
                .unwrap()
        };
        for (days_ago, hour, kind) in [
            (2, 8, EVENT_NUDGE_CLICKED),
            (3, 11, EVENT_NUDGE_OPENED),
            // Outside the 30-day window.
            (40, 22, EVENT_NUDGE_CLICKED),
        ] {
            history.log_event(&event_at("u1", kind, day(days_ago, hour))).await.unwrap();
        }
        history
            .log_event(&event_at("u1", "NUDGE_SENT", day(1, 20)))
            .await
            .unwrap();

        let hour = resolver(history).compute_learned_hour(&User::new("u1")).await.unwrap();
        // (8 + 11) / 2 = 9.5
        assert_eq!(hour, 10);
    }

    #[tokio::test]
    async fn test_learned_hour_defaults_without_history() {
        let hour = resolver(Arc::new(MemoryHistory::new()))
            .compute_learned_hour(&User::new("u1"))
            .await
            .unwrap();
        assert_eq!(hour, 9);
    }

    #[tokio::test]
    async fn test_send_hour_prefers_stated_time_over_learned() {
        let history = Arc::new(MemoryHistory::new());
        let clicked = (Utc::now() - Duration::days(1)).with_hour(15).unwrap();
        history.log_event(&event_at("u1", EVENT_NUDGE_CLICKED, clicked)).await.unwrap();
        let resolver = resolver(history);
        // A Wednesday.
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 6, 0, 0).unwrap();

        let mut user = User::new("u1");
        assert_eq!(resolver.send_hour_now(&user, now).await.unwrap(), 15);

        user.preferences.preferred_nudge_time = Some("08:00".into());
        assert_eq!(resolver.send_hour_now(&user, now).await.unwrap(), 8);
    }
}
