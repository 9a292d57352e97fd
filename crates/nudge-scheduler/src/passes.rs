//! Scheduled passes — which users a trigger firing targets, and with what.
//!
//! ```text
//! daily-nudges       hourly: timezone batches → local hour == optimal hour → backoff → deliver
//! streak-checks      hourly: active streaks lapsing in 20–24h → loss-framed reminder
//! evening-reminders  hourly: active streaks at the local evening hour → STREAK_WARNING
//! ```
//!
//! A pass only fails as a whole when the candidate set cannot be loaded;
//! per-user errors are counted and logged.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nudge_core::config::{SchedulerConfig, StreakConfig};
use nudge_core::traits::{TranslationParams, UserStore};
use nudge_core::{NudgeContext, NudgeError, NudgePayload, Result, User, UserStreak};
use nudge_engine::delivery::{BatchReport, DeliveryOutcome, SkipReason};
use nudge_engine::framing::default_framing;
use nudge_engine::governor::in_quiet_hours;
use nudge_engine::{BackoffCalculator, DeliveryCoordinator, FramingService};

use crate::registry::{handler, Cadence, Overlap, TriggerRegistry};
use crate::timezone::{group_by_timezone, local_hour};
use crate::timing::OptimalTimeResolver;

pub const DAILY_TRIGGER: &str = "daily-nudges";
pub const STREAK_TRIGGER: &str = "streak-checks";
pub const EVENING_TRIGGER: &str = "evening-reminders";

/// Nudge type used for the send lock and history of streak reminders.
const STREAK_NUDGE_TYPE: &str = "STREAK_WARNING";

/// Passes run once per hourly slot; a backoff ending inside the slot counts
/// as elapsed.
const PASS_SLOT: Duration = Duration::hours(1);

/// Outcome counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Users the pass selected.
    pub candidates: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassReport {
    fn record(&mut self, user_id: &str, result: &Result<DeliveryOutcome>) {
        match result {
            Ok(DeliveryOutcome::Sent { .. }) => self.sent += 1,
            Ok(DeliveryOutcome::Skipped(_)) => self.skipped += 1,
            Err(e) => {
                tracing::warn!("⚠️ Scheduled nudge for {} failed: {}", user_id, e);
                self.failed += 1;
            }
        }
    }

    fn absorb(&mut self, batch: BatchReport) {
        self.candidates += batch.total();
        self.sent += batch.sent;
        self.skipped += batch.skipped;
        self.failed += batch.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Daily,
    Streak,
    Evening,
}

impl PassKind {
    pub fn trigger_name(&self) -> &'static str {
        match self {
            PassKind::Daily => DAILY_TRIGGER,
            PassKind::Streak => STREAK_TRIGGER,
            PassKind::Evening => EVENING_TRIGGER,
        }
    }
}

pub struct NudgePasses {
    users: Arc<dyn UserStore>,
    coordinator: Arc<DeliveryCoordinator>,
    backoff: BackoffCalculator,
    timing: OptimalTimeResolver,
    framing: FramingService,
    streak: StreakConfig,
    scheduler: SchedulerConfig,
}

impl NudgePasses {
    pub fn new(
        users: Arc<dyn UserStore>,
        coordinator: Arc<DeliveryCoordinator>,
        backoff: BackoffCalculator,
        timing: OptimalTimeResolver,
        framing: FramingService,
        streak: StreakConfig,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            users,
            coordinator,
            backoff,
            timing,
            framing,
            streak,
            scheduler,
        }
    }

    pub async fn run(&self, kind: PassKind, now: DateTime<Utc>) -> Result<PassReport> {
        let report = match kind {
            PassKind::Daily => self.daily_pass(now).await?,
            PassKind::Streak => self.streak_pass(now).await?,
            PassKind::Evening => self.evening_pass(now).await?,
        };
        tracing::info!(
            "📊 Pass '{}': {} candidates, {} sent, {} skipped, {} failed",
            kind.trigger_name(),
            report.candidates,
            report.sent,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Users whose local hour equals their send hour (stated or learned) and
    /// whose backoff has elapsed get the configured daily context.
    pub async fn daily_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let context = NudgeContext::parse(&self.scheduler.daily_context);
        let payload = NudgePayload::default();
        let mut report = PassReport::default();

        for batch in group_by_timezone(self.users.list_users().await?) {
            let hour = local_hour(now, &batch.timezone);
            for user in batch.users {
                let send_hour = match self.timing.send_hour_now(&user, now).await {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!("⚠️ Learned hour for {} unavailable: {}", user.id, e);
                        self.timing.optimal_hour_now(&user, now)
                    }
                };
                if send_hour != hour {
                    continue;
                }
                report.candidates += 1;

                let result = match self.daily_gate(&user, now).await {
                    Ok(None) => {
                        self.coordinator
                            .send_nudge_to_user(&user.id, &context, &payload)
                            .await
                    }
                    Ok(Some(reason)) => Ok(DeliveryOutcome::Skipped(reason)),
                    Err(e) => Err(e),
                };
                report.record(&user.id, &result);
            }
        }
        Ok(report)
    }

    /// Send one context to every user whose local hour is `target_hour`.
    pub async fn scheduled_batch(
        &self,
        context: &NudgeContext,
        target_hour: u32,
        now: DateTime<Utc>,
    ) -> Result<PassReport> {
        let mut report = PassReport::default();
        for batch in group_by_timezone(self.users.list_users().await?) {
            if local_hour(now, &batch.timezone) != target_hour {
                continue;
            }
            let ids: Vec<String> = batch
                .users
                .iter()
                .filter(|u| !in_quiet_hours(&u.preferences, target_hour))
                .map(|u| u.id.clone())
                .collect();
            let quiet = batch.users.len() - ids.len();
            report.candidates += quiet;
            report.skipped += quiet;

            let batch_report = self
                .coordinator
                .send_batch(&ids, context, &NudgePayload::default())
                .await;
            report.absorb(batch_report);
        }
        Ok(report)
    }

    /// Loss-framed reminder with the literal streak count, for active streaks
    /// whose last activity is inside the lapse window.
    pub async fn streak_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let oldest = now - Duration::hours(self.streak.lapse_max_hours);
        let newest = now - Duration::hours(self.streak.lapse_min_hours);
        let mut report = PassReport::default();

        for streak in self.users.list_streaks().await? {
            if !streak.is_active()
                || streak.last_activity_date < oldest
                || streak.last_activity_date > newest
            {
                continue;
            }
            report.candidates += 1;
            let result = self.remind_streak(&streak, now).await;
            report.record(&streak.user_id, &result);
        }
        Ok(report)
    }

    /// STREAK_WARNING to active streaks at the user's local evening hour.
    pub async fn evening_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let mut report = PassReport::default();

        for streak in self.users.list_streaks().await? {
            if !streak.is_active() {
                continue;
            }
            let user = match self.users.get_user(&streak.user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::debug!("Streak for unknown user {}", streak.user_id);
                    continue;
                }
                Err(e) => {
                    report.candidates += 1;
                    report.record(&streak.user_id, &Err(e));
                    continue;
                }
            };
            let hour = local_hour(now, user.timezone_or_utc());
            if hour != self.scheduler.evening_hour {
                continue;
            }
            report.candidates += 1;

            if !user.preferences.streak_nudges || in_quiet_hours(&user.preferences, hour) {
                tracing::debug!("Evening reminder for {} suppressed by preferences", user.id);
                report.skipped += 1;
                continue;
            }

            let mut payload = NudgePayload::default();
            payload
                .extra
                .insert("currentStreak".into(), streak.current_streak.into());
            let result = self
                .coordinator
                .send_nudge_to_user(&user.id, &NudgeContext::StreakWarning, &payload)
                .await;
            report.record(&user.id, &result);
        }
        Ok(report)
    }

    /// Quiet hours and backoff, both judged for the current slot.
    async fn daily_gate(&self, user: &User, now: DateTime<Utc>) -> Result<Option<SkipReason>> {
        let hour = local_hour(now, user.timezone_or_utc());
        if in_quiet_hours(&user.preferences, hour) {
            tracing::debug!("{} is in quiet hours", user.id);
            return Ok(Some(SkipReason::Governed));
        }
        match self.backoff.next_allowed_at(&user.id).await? {
            Some(next) if next >= now + PASS_SLOT => {
                tracing::debug!("{} backed off until {}", user.id, next);
                Ok(Some(SkipReason::Governed))
            }
            _ => Ok(None),
        }
    }

    async fn remind_streak(
        &self,
        streak: &UserStreak,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let user = self
            .users
            .get_user(&streak.user_id)
            .await?
            .ok_or_else(|| NudgeError::user_not_found(&streak.user_id))?;

        let prefs = &user.preferences;
        let hour = local_hour(now, user.timezone_or_utc());
        if !prefs.nudges_enabled || !prefs.streak_nudges || in_quiet_hours(prefs, hour) {
            tracing::debug!("Streak reminder for {} suppressed by preferences", user.id);
            return Ok(DeliveryOutcome::Skipped(SkipReason::Governed));
        }

        let mut params = TranslationParams::new();
        params.insert("days".into(), streak.current_streak.to_string());
        let metadata = serde_json::json!({
            "currentStreak": streak.current_streak,
            "lastActivityDate": streak.last_activity_date,
        });

        self.coordinator
            .deliver_with(&user.id, STREAK_NUDGE_TYPE, metadata, |user| async move {
                let framing = default_framing("streak_warning", user.persona);
                self.framing
                    .framed_content(&user.id, framing, "streak", &params, None)
                    .await
                    .map(|framed| Some(framed.content))
            })
            .await
    }
}

/// Register the daily, streak and evening triggers. Passes never pile up:
/// a firing is skipped while the previous run of the same pass is going.
pub fn register_default_triggers(
    registry: &TriggerRegistry,
    passes: Arc<NudgePasses>,
    config: &SchedulerConfig,
) -> Result<()> {
    for (kind, expression) in [
        (PassKind::Daily, &config.daily),
        (PassKind::Streak, &config.streak),
        (PassKind::Evening, &config.evening),
    ] {
        let cadence = Cadence::cron(expression)?;
        let passes = passes.clone();
        registry.register(
            kind.trigger_name(),
            cadence,
            Overlap::Skip,
            handler(move || {
                let passes = passes.clone();
                async move {
                    if let Err(e) = passes.run(kind, Utc::now()).await {
                        tracing::warn!("⚠️ Pass '{}' failed: {}", kind.trigger_name(), e);
                    }
                }
            }),
        );
    }
    Ok(())
}
