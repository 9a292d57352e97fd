//! Backoff Calculator — hours until the next send is allowed, doubling with
//! each consecutive ignored nudge and resetting on engagement.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nudge_core::config::BackoffConfig;
use nudge_core::traits::HistoryStore;
use nudge_core::{NudgeHistoryRecord, Result};

pub struct BackoffCalculator {
    history: Arc<dyn HistoryStore>,
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(history: Arc<dyn HistoryStore>, config: BackoffConfig) -> Self {
        Self { history, config }
    }

    pub async fn compute_backoff_hours(&self, user_id: &str) -> Result<u64> {
        let recent = self.history.recent_nudges(user_id, self.config.window).await?;
        Ok(backoff_hours(&recent, &self.config))
    }

    /// Earliest instant the next nudge may go out: last send + backoff.
    /// `None` when the user has never been nudged.
    pub async fn next_allowed_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let recent = self.history.recent_nudges(user_id, self.config.window).await?;
        Ok(recent.first().map(|last| {
            last.sent_at + Duration::hours(backoff_hours(&recent, &self.config) as i64)
        }))
    }
}

/// `recent` must be ordered newest first.
pub fn backoff_hours(recent: &[NudgeHistoryRecord], config: &BackoffConfig) -> u64 {
    let Some(latest) = recent.first() else {
        return config.base_hours;
    };
    if latest.opened == Some(true) {
        return config.base_hours;
    }

    let ignored = recent
        .iter()
        .take_while(|r| r.opened == Some(false))
        .count() as u32;
    if ignored == 0 {
        // Latest has no engagement signal yet.
        return config.base_hours;
    }

    let factor = 1u64.checked_shl(ignored - 1).unwrap_or(u64::MAX);
    config
        .base_hours
        .saturating_mul(factor)
        .min(config.max_hours)
}
