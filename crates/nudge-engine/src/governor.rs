//! Frequency Governor — daily/weekly caps, opt-out and quiet hours.

use std::sync::Arc;

use chrono::Utc;
use nudge_core::config::GovernorConfig;
use nudge_core::traits::{HistoryStore, UserStore};
use nudge_core::{NudgePreferences, Period, Result, User};

/// Quiet-hour bounds used when only one side is configured.
const DEFAULT_QUIET_START: u32 = 22;
const DEFAULT_QUIET_END: u32 = 8;

/// Enforces per-user send caps over the history store.
pub struct FrequencyGovernor {
    users: Arc<dyn UserStore>,
    history: Arc<dyn HistoryStore>,
    config: GovernorConfig,
}

impl FrequencyGovernor {
    pub fn new(users: Arc<dyn UserStore>, history: Arc<dyn HistoryStore>, config: GovernorConfig) -> Self {
        Self { users, history, config }
    }

    /// False when the user is missing, opted out, or at the cap for `period`.
    pub async fn can_send(&self, user_id: &str, period: Period) -> Result<bool> {
        match self.users.get_user(user_id).await? {
            Some(user) => self.can_send_to(&user, period).await,
            None => Ok(false),
        }
    }

    /// Same check for an already-loaded user.
    pub async fn can_send_to(&self, user: &User, period: Period) -> Result<bool> {
        if !user.preferences.nudges_enabled {
            return Ok(false);
        }
        let since = Utc::now() - period.window();
        let sent = self.history.count_nudges_since(&user.id, since).await?;
        Ok(within_cap(&user.preferences, sent, period, &self.config))
    }

    pub fn limit_for(&self, preferences: &NudgePreferences, period: Period) -> u32 {
        period_limit(preferences, period, &self.config)
    }
}

/// Cap for a period: the user's daily max (or the configured default) per day,
/// a fixed weekly limit per week.
pub fn period_limit(preferences: &NudgePreferences, period: Period, config: &GovernorConfig) -> u32 {
    match period {
        Period::Daily => preferences
            .max_nudges_per_day
            .unwrap_or(config.default_daily_limit),
        Period::Weekly => config.weekly_limit,
    }
}

/// Pure cap check over an already-counted window.
pub fn within_cap(
    preferences: &NudgePreferences,
    sent_in_window: usize,
    period: Period,
    config: &GovernorConfig,
) -> bool {
    (sent_in_window as u64) < u64::from(period_limit(preferences, period, config))
}

/// Whether `local_hour` falls in the user's quiet window.
/// Neither bound set → never quiet. Windows may wrap midnight.
pub fn in_quiet_hours(preferences: &NudgePreferences, local_hour: u32) -> bool {
    if preferences.quiet_hours_start.is_none() && preferences.quiet_hours_end.is_none() {
        return false;
    }
    let start = preferences.quiet_hours_start.unwrap_or(DEFAULT_QUIET_START);
    let end = preferences.quiet_hours_end.unwrap_or(DEFAULT_QUIET_END);

    if start > end {
        local_hour >= start || local_hour < end
    } else {
        local_hour >= start && local_hour < end
    }
}
