//! Nudge engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NudgeError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NudgeConfig {
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
    #[serde(default)]
    pub social_proof: SocialProofConfig,
    #[serde(default)]
    pub streak: StreakConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl NudgeConfig {
    /// Load config from the default path (~/.nudge/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NudgeError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NudgeError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the nudge home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nudge")
    }
}

/// Send caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Daily cap when the user has no `max_nudges_per_day`.
    #[serde(default = "default_daily_limit")]
    pub default_daily_limit: u32,
    /// Weekly cap, same for every user.
    #[serde(default = "default_weekly_limit")]
    pub weekly_limit: u32,
}

fn default_daily_limit() -> u32 { 3 }
fn default_weekly_limit() -> u32 { 15 }

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: default_daily_limit(),
            weekly_limit: default_weekly_limit(),
        }
    }
}

/// Disengagement backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_hours")]
    pub base_hours: u64,
    #[serde(default = "default_max_hours")]
    pub max_hours: u64,
    /// How many recent records are inspected.
    #[serde(default = "default_backoff_window")]
    pub window: usize,
}

fn default_base_hours() -> u64 { 24 }
fn default_max_hours() -> u64 { 168 }
fn default_backoff_window() -> usize { 5 }

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_hours: default_base_hours(),
            max_hours: default_max_hours(),
            window: default_backoff_window(),
        }
    }
}

/// Send-time resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_hour")]
    pub default_hour: u32,
    #[serde(default = "default_weekend_delay_hours")]
    pub weekend_delay_hours: u32,
    /// Sleep window is [sleep_start, 24) ∪ [0, sleep_end).
    #[serde(default = "default_sleep_start")]
    pub sleep_start: u32,
    #[serde(default = "default_sleep_end")]
    pub sleep_end: u32,
    #[serde(default = "default_learned_window_days")]
    pub learned_window_days: i64,
}

fn default_hour() -> u32 { 9 }
fn default_weekend_delay_hours() -> u32 { 2 }
fn default_sleep_start() -> u32 { 23 }
fn default_sleep_end() -> u32 { 7 }
fn default_learned_window_days() -> i64 { 30 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_hour: default_hour(),
            weekend_delay_hours: default_weekend_delay_hours(),
            sleep_start: default_sleep_start(),
            sleep_end: default_sleep_end(),
            learned_window_days: default_learned_window_days(),
        }
    }
}

/// Localization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nConfig {
    /// Locale used when the requested one is unknown.
    #[serde(default = "default_base_locale")]
    pub base_locale: String,
}

fn default_base_locale() -> String { "vi".into() }

impl Default for I18nConfig {
    fn default() -> Self {
        Self { base_locale: default_base_locale() }
    }
}

/// Realtime social proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialProofConfig {
    #[serde(default = "default_social_window_hours")]
    pub window_hours: i64,
}

fn default_social_window_hours() -> i64 { 24 }

impl Default for SocialProofConfig {
    fn default() -> Self {
        Self { window_hours: default_social_window_hours() }
    }
}

/// Streak pass window: users whose last activity is between
/// `lapse_max_hours` and `lapse_min_hours` ago.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakConfig {
    #[serde(default = "default_lapse_min_hours")]
    pub lapse_min_hours: i64,
    #[serde(default = "default_lapse_max_hours")]
    pub lapse_max_hours: i64,
}

fn default_lapse_min_hours() -> i64 { 20 }
fn default_lapse_max_hours() -> i64 { 24 }

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            lapse_min_hours: default_lapse_min_hours(),
            lapse_max_hours: default_lapse_max_hours(),
        }
    }
}

/// Trigger cadences (5-field cron expressions). The passes compare against
/// each user's local hour, so hourly cadences cover every timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_hourly")]
    pub daily: String,
    #[serde(default = "default_hourly")]
    pub streak: String,
    #[serde(default = "default_hourly")]
    pub evening: String,
    /// Local hour for streak reminders.
    #[serde(default = "default_evening_hour")]
    pub evening_hour: u32,
    /// Context delivered by the daily pass.
    #[serde(default = "default_daily_context")]
    pub daily_context: String,
}

fn default_hourly() -> String { "0 * * * *".into() }
fn default_evening_hour() -> u32 { 19 }
fn default_daily_context() -> String { "BUDGETING".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily: default_hourly(),
            streak: default_hourly(),
            evening: default_hourly(),
            evening_hour: default_evening_hour(),
            daily_context: default_daily_context(),
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_users_path")]
    pub users_path: String,
}

fn default_db_path() -> String { "~/.nudge/history.db".into() }
fn default_users_path() -> String { "~/.nudge/users.json".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            users_path: default_users_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = NudgeConfig::from_toml("").unwrap();
        assert_eq!(config.governor.default_daily_limit, 3);
        assert_eq!(config.governor.weekly_limit, 15);
        assert_eq!(config.backoff.max_hours, 168);
        assert_eq!(config.timing.default_hour, 9);
        assert_eq!(config.i18n.base_locale, "vi");
    }

    #[test]
    fn test_partial_override() {
        let config = NudgeConfig::from_toml(
            "[governor]\nweekly_limit = 10\n\n[i18n]\nbase_locale = \"en\"\n",
        )
        .unwrap();
        assert_eq!(config.governor.weekly_limit, 10);
        assert_eq!(config.governor.default_daily_limit, 3);
        assert_eq!(config.i18n.base_locale, "en");
    }

    #[test]
    fn test_invalid_toml() {
        let err = NudgeConfig::from_toml("governor = [").unwrap_err();
        assert!(matches!(err, NudgeError::Config(_)));
    }
}
