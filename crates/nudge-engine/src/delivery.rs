//! Delivery Coordinator — the send pipeline for a single (user, nudge type):
//!
//! ```text
//! IDLE → LOCKED → governor → content → commit (history + behavior log)
//!                                         → push → push retry → email
//!      → {SENT | SKIPPED | FAILED} → IDLE   (lock released on every path)
//! ```
//!
//! Once content is resolved the send decision is final: history is written
//! before the transport is tried, and transport failures are swallowed.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use nudge_core::traits::{HistoryStore, NotificationTransport, UserStore};
use nudge_core::{
    BehaviorEvent, EmailPayload, EVENT_NUDGE_CLICKED, EVENT_NUDGE_OPENED, EVENT_NUDGE_SENT,
    NudgeContent, NudgeContext, NudgeError, NudgeHistoryRecord, NudgePayload, Period, PushPayload,
    Result, User,
};

use crate::governor::FrequencyGovernor;
use crate::lock::SendLocks;
use crate::selector::TacticSelector;

/// Where a committed nudge ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryChannel {
    Push,
    /// Push succeeded on the single retry.
    PushRetry,
    /// Both push attempts failed; email fallback succeeded.
    Email,
    /// Every attempt failed. History is still recorded.
    Undelivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another delivery for the same (user, nudge type) is in flight.
    InProgress,
    /// Cap reached or user opted out.
    Governed,
    /// No tactic for this context, or nothing truthful to say.
    NoContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { nudge_id: String, channel: DeliveryChannel },
    Skipped(SkipReason),
}

/// External engagement signal for a delivered nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Opened,
    Clicked,
    Ignored,
}

/// Per-outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, result: &Result<DeliveryOutcome>) {
        match result {
            Ok(DeliveryOutcome::Sent { .. }) => self.sent += 1,
            Ok(DeliveryOutcome::Skipped(_)) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.sent + self.skipped + self.failed
    }
}

pub struct DeliveryCoordinator {
    users: Arc<dyn UserStore>,
    history: Arc<dyn HistoryStore>,
    governor: FrequencyGovernor,
    selector: TacticSelector,
    transport: Arc<dyn NotificationTransport>,
    locks: SendLocks,
}

impl DeliveryCoordinator {
    pub fn new(
        users: Arc<dyn UserStore>,
        history: Arc<dyn HistoryStore>,
        governor: FrequencyGovernor,
        selector: TacticSelector,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            users,
            history,
            governor,
            selector,
            transport,
            locks: SendLocks::new(),
        }
    }

    pub fn locks(&self) -> &SendLocks {
        &self.locks
    }

    pub fn governor(&self) -> &FrequencyGovernor {
        &self.governor
    }

    /// Generate content for `context` via the tactic selector and deliver it.
    pub async fn send_nudge_to_user(
        &self,
        user_id: &str,
        context: &NudgeContext,
        payload: &NudgePayload,
    ) -> Result<DeliveryOutcome> {
        let metadata = serde_json::to_value(payload)?;
        self.deliver_with(user_id, context.as_str(), metadata, |_user| {
            self.selector.generate(user_id, context, payload)
        })
        .await
    }

    /// The pipeline with a caller-supplied content source. `resolve` runs after
    /// the lock, user load and the daily and weekly cap checks; `Ok(None)` skips silently.
    pub async fn deliver_with<F, Fut>(
        &self,
        user_id: &str,
        nudge_type: &str,
        metadata: serde_json::Value,
        resolve: F,
    ) -> Result<DeliveryOutcome>
    where
        F: FnOnce(User) -> Fut,
        Fut: Future<Output = Result<Option<NudgeContent>>>,
    {
        let Some(_guard) = self.locks.try_acquire(user_id, nudge_type) else {
            return Ok(DeliveryOutcome::Skipped(SkipReason::InProgress));
        };

        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| NudgeError::user_not_found(user_id))?;

        for period in [Period::Daily, Period::Weekly] {
            if !self.governor.can_send_to(&user, period).await? {
                tracing::debug!("{} {} over its {:?} cap", user_id, nudge_type, period);
                return Ok(DeliveryOutcome::Skipped(SkipReason::Governed));
            }
        }

        let Some(content) = resolve(user).await? else {
            return Ok(DeliveryOutcome::Skipped(SkipReason::NoContent));
        };

        let record = self.commit(user_id, nudge_type, metadata, &content).await?;
        let channel = self.dispatch(&record, &content).await;
        Ok(DeliveryOutcome::Sent {
            nudge_id: record.id,
            channel,
        })
    }

    /// Run the pipeline for each user. A failing user never aborts the batch.
    pub async fn send_batch(
        &self,
        user_ids: &[String],
        context: &NudgeContext,
        payload: &NudgePayload,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for user_id in user_ids {
            let result = self.send_nudge_to_user(user_id, context, payload).await;
            if let Err(e) = &result {
                tracing::warn!("⚠️ Nudge {} for {} failed: {}", context.as_str(), user_id, e);
            }
            report.record(&result);
        }
        report
    }

    /// Apply an engagement event to a delivered nudge.
    pub async fn record_engagement(
        &self,
        user_id: &str,
        nudge_id: &str,
        engagement: Engagement,
    ) -> Result<bool> {
        let (opened, clicked_at, event_type) = match engagement {
            Engagement::Opened => (true, None, Some(EVENT_NUDGE_OPENED)),
            Engagement::Clicked => (true, Some(Utc::now()), Some(EVENT_NUDGE_CLICKED)),
            Engagement::Ignored => (false, None, None),
        };
        let found = self.history.mark_engagement(nudge_id, opened, clicked_at).await?;
        if !found {
            tracing::debug!("Engagement for unknown nudge {}", nudge_id);
            return Ok(false);
        }
        if let Some(event_type) = event_type {
            let event = BehaviorEvent::new(
                user_id,
                event_type,
                "/nudge/engagement",
                serde_json::json!({ "nudgeId": nudge_id }),
            );
            self.history.log_event(&event).await?;
        }
        Ok(true)
    }

    async fn commit(
        &self,
        user_id: &str,
        nudge_type: &str,
        context: serde_json::Value,
        content: &NudgeContent,
    ) -> Result<NudgeHistoryRecord> {
        let record = NudgeHistoryRecord {
            id: format!("nudge-{}", uuid::Uuid::new_v4()),
            user_id: user_id.to_string(),
            nudge_type: nudge_type.to_string(),
            sent_at: Utc::now(),
            opened: None,
            clicked_at: None,
            metadata: serde_json::json!({
                "context": context,
                "tactic": content.nudge_type,
                "priority": content.priority,
                "message": content.message,
            }),
        };
        self.history.append_nudge(&record).await?;

        let event = BehaviorEvent::new(
            user_id,
            EVENT_NUDGE_SENT,
            "/nudge/scheduled",
            serde_json::json!({
                "nudgeId": record.id,
                "nudgeType": nudge_type,
                "tactic": content.nudge_type,
            }),
        );
        self.history.log_event(&event).await?;

        tracing::info!(
            "📨 Nudge committed: {} {} → {} ({})",
            record.id,
            nudge_type,
            user_id,
            content.nudge_type.as_str()
        );
        Ok(record)
    }

    /// Push, one push retry, then email. Never more than three attempts.
    async fn dispatch(&self, record: &NudgeHistoryRecord, content: &NudgeContent) -> DeliveryChannel {
        let push = PushPayload {
            user_id: record.user_id.clone(),
            title: record.nudge_type.clone(),
            body: content.message.clone(),
            nudge_id: record.id.clone(),
        };

        match self.transport.send_push(&push).await {
            Ok(()) => return DeliveryChannel::Push,
            Err(e) => tracing::warn!("⚠️ Push failed for {} (attempt 1): {}", record.id, e),
        }
        match self.transport.send_push(&push).await {
            Ok(()) => return DeliveryChannel::PushRetry,
            Err(e) => tracing::warn!("⚠️ Push failed for {} (attempt 2): {}", record.id, e),
        }

        let email = EmailPayload {
            user_id: record.user_id.clone(),
            subject: record.nudge_type.clone(),
            body: content.message.clone(),
        };
        match self.transport.send_email(&email).await {
            Ok(()) => {
                tracing::info!("🔄 Fallback: push → email for {}", record.id);
                DeliveryChannel::Email
            }
            Err(e) => {
                tracing::warn!("⚠️ Email fallback failed for {}: {}", record.id, e);
                DeliveryChannel::Undelivered
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nudge_core::config::{GovernorConfig, SocialProofConfig};
    use nudge_core::traits::PersonaClassifier;
    use nudge_core::{NudgeType, Persona, Priority, LocalizedMessage};
    use nudge_store::{MemoryHistory, MemoryUserStore, StaticPersonas};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `push_failures` push calls; email fails if `email_fails`.
    #[derive(Default)]
    struct ScriptedTransport {
        push_failures: usize,
        email_fails: bool,
        delay: Option<Duration>,
        push_calls: AtomicUsize,
        email_calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationTransport for ScriptedTransport {
        async fn send_push(&self, _payload: &PushPayload) -> Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let n = self.push_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.push_failures {
                Err(NudgeError::Transport("push gateway 503".into()))
            } else {
                Ok(())
            }
        }

        async fn send_email(&self, _payload: &EmailPayload) -> Result<()> {
            self.email_calls.fetch_add(1, Ordering::SeqCst);
            if self.email_fails {
                Err(NudgeError::Transport("smtp refused".into()))
            } else {
                Ok(())
            }
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl PersonaClassifier for BrokenClassifier {
        async fn user_persona(&self, _: &str) -> Result<Option<Persona>> {
            Err(NudgeError::Persona("timeout".into()))
        }
    }

    struct Harness {
        coordinator: DeliveryCoordinator,
        history: Arc<MemoryHistory>,
        transport: Arc<ScriptedTransport>,
    }

    fn harness_with(
        users: Vec<User>,
        transport: ScriptedTransport,
        personas: Arc<dyn PersonaClassifier>,
    ) -> Harness {
        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::with_users(users));
        let history = Arc::new(MemoryHistory::new());
        let transport = Arc::new(transport);
        let governor = FrequencyGovernor::new(users.clone(), history.clone(), GovernorConfig::default());
        let selector = TacticSelector::new(users.clone(), personas, history.clone(), SocialProofConfig::default());
        let coordinator = DeliveryCoordinator::new(users, history.clone(), governor, selector, transport.clone());
        Harness {
            coordinator,
            history,
            transport,
        }
    }

    fn harness(transport: ScriptedTransport) -> Harness {
        let personas = Arc::new(StaticPersonas::new().with("u1", Persona::Hunter));
        harness_with(vec![User::new("u1"), User::new("u2")], transport, personas)
    }

    #[tokio::test]
    async fn test_sends_and_records() {
        let h = harness(ScriptedTransport::default());
        let out = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::InvestmentDecision, &NudgePayload::default())
            .await
            .unwrap();
        let DeliveryOutcome::Sent { nudge_id, channel } = out else {
            panic!("expected a send");
        };
        assert_eq!(channel, DeliveryChannel::Push);

        let records = h.history.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, nudge_id);
        assert_eq!(records[0].nudge_type, "INVESTMENT_DECISION");
        assert_eq!(records[0].metadata["tactic"], "SOCIAL_PROOF");
        assert!(records[0].metadata["message"]["en"].as_str().unwrap().contains("top 10%"));

        let events = h.history.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EVENT_NUDGE_SENT);
        assert!(!h.coordinator.locks().is_held("u1", "INVESTMENT_DECISION"));
    }

    #[tokio::test]
    async fn test_opted_out_never_recorded() {
        let mut user = User::new("u1");
        user.preferences.nudges_enabled = false;
        let h = harness_with(vec![user], ScriptedTransport::default(), Arc::new(StaticPersonas::new()));
        for ctx in [NudgeContext::StreakWarning, NudgeContext::Budgeting] {
            let out = h
                .coordinator
                .send_nudge_to_user("u1", &ctx, &NudgePayload::default())
                .await
                .unwrap();
            assert_eq!(out, DeliveryOutcome::Skipped(SkipReason::Governed));
        }
        assert!(h.history.records().is_empty());
        assert_eq!(h.transport.push_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_daily_cap_stops_fourth_send() {
        let h = harness(ScriptedTransport::default());
        for ctx in ["INVESTMENT_DECISION", "BUDGETING", "STREAK_WARNING", "INVESTMENT_DECISION"] {
            h.coordinator
                .send_nudge_to_user("u1", &NudgeContext::parse(ctx), &NudgePayload::default())
                .await
                .unwrap();
        }
        assert_eq!(h.history.records().len(), 3);
    }

    #[tokio::test]
    async fn test_weekly_cap_holds_with_quiet_last_day() {
        let h = harness(ScriptedTransport::default());
        for i in 0..15 {
            h.history
                .append_nudge(&NudgeHistoryRecord {
                    id: format!("old-{i}"),
                    user_id: "u1".into(),
                    nudge_type: "BUDGETING".into(),
                    sent_at: Utc::now() - chrono::Duration::hours(30 + i * 8),
                    opened: None,
                    clicked_at: None,
                    metadata: serde_json::json!({}),
                })
                .await
                .unwrap();
        }

        let out = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::StreakWarning, &NudgePayload::default())
            .await
            .unwrap();
        assert_eq!(out, DeliveryOutcome::Skipped(SkipReason::Governed));
        assert_eq!(h.history.records().len(), 15);
        assert_eq!(h.transport.push_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_sends_once() {
        let transport = ScriptedTransport {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let h = harness(transport);
        let ctx = NudgeContext::StreakWarning;
        let payload = NudgePayload::default();

        let sends = (0..5).map(|_| h.coordinator.send_nudge_to_user("u1", &ctx, &payload));
        let results = futures::future::join_all(sends).await;

        let sent = results
            .iter()
            .filter(|r| matches!(r, Ok(DeliveryOutcome::Sent { .. })))
            .count();
        let in_progress = results
            .iter()
            .filter(|r| matches!(r, Ok(DeliveryOutcome::Skipped(SkipReason::InProgress))))
            .count();
        assert_eq!(sent, 1);
        assert_eq!(in_progress, 4);
        assert_eq!(h.history.records().len(), 1);
        assert_eq!(h.coordinator.locks().held_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_then_fallback() {
        let h = harness(ScriptedTransport {
            push_failures: 1,
            ..Default::default()
        });
        let out = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::StreakWarning, &NudgePayload::default())
            .await
            .unwrap();
        assert!(matches!(out, DeliveryOutcome::Sent { channel: DeliveryChannel::PushRetry, .. }));

        let h = harness(ScriptedTransport {
            push_failures: 2,
            ..Default::default()
        });
        let out = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::StreakWarning, &NudgePayload::default())
            .await
            .unwrap();
        assert!(matches!(out, DeliveryOutcome::Sent { channel: DeliveryChannel::Email, .. }));
        assert_eq!(h.transport.push_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.transport.email_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_total_transport_failure_is_swallowed() {
        let h = harness(ScriptedTransport {
            push_failures: usize::MAX,
            email_fails: true,
            ..Default::default()
        });
        let out = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::StreakWarning, &NudgePayload::default())
            .await
            .unwrap();
        assert!(matches!(out, DeliveryOutcome::Sent { channel: DeliveryChannel::Undelivered, .. }));
        assert_eq!(h.history.records().len(), 1);
        let attempts = h.transport.push_calls.load(Ordering::SeqCst) + h.transport.email_calls.load(Ordering::SeqCst);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_missing_user_fails_and_releases_lock() {
        let h = harness(ScriptedTransport::default());
        let err = h
            .coordinator
            .send_nudge_to_user("ghost", &NudgeContext::StreakWarning, &NudgePayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NudgeError::NotFound(_)));
        assert!(!h.coordinator.locks().is_held("ghost", "STREAK_WARNING"));
        assert!(h.history.records().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_context_skips_silently() {
        let h = harness(ScriptedTransport::default());
        let out = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::parse("COURSE_COMPLETION"), &NudgePayload::default())
            .await
            .unwrap();
        assert_eq!(out, DeliveryOutcome::Skipped(SkipReason::NoContent));
        assert!(h.history.records().is_empty());
        assert!(h.history.events().is_empty());
    }

    #[tokio::test]
    async fn test_persona_failure_aborts_send() {
        let h = harness_with(vec![User::new("u1")], ScriptedTransport::default(), Arc::new(BrokenClassifier));
        let err = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::Budgeting, &NudgePayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NudgeError::Persona(_)));
        assert!(h.history.records().is_empty());
        assert_eq!(h.transport.push_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let h = harness(ScriptedTransport::default());
        let ids: Vec<String> = ["u1", "ghost", "u2"].iter().map(|s| s.to_string()).collect();
        let report = h
            .coordinator
            .send_batch(&ids, &NudgeContext::StreakWarning, &NudgePayload::default())
            .await;
        assert_eq!(report, BatchReport { sent: 2, skipped: 0, failed: 1 });
        assert_eq!(report.total(), 3);
    }

    #[tokio::test]
    async fn test_deliver_with_custom_content() {
        let h = harness(ScriptedTransport::default());
        let out = h
            .coordinator
            .deliver_with("u2", "STREAK_LOSS", serde_json::json!({"currentStreak": 4}), |user| async move {
                Ok::<_, NudgeError>(Some(NudgeContent {
                    nudge_type: NudgeType::LossAversion,
                    message: LocalizedMessage::new("vi", format!("hi {}", user.id), "zh"),
                    priority: Priority::High,
                }))
            })
            .await
            .unwrap();
        assert!(matches!(out, DeliveryOutcome::Sent { .. }));
        let records = h.history.records();
        assert_eq!(records[0].metadata["context"]["currentStreak"], 4);
        assert_eq!(records[0].metadata["message"]["en"], "hi u2");
    }

    #[tokio::test]
    async fn test_engagement_updates_record_and_logs() {
        let h = harness(ScriptedTransport::default());
        let DeliveryOutcome::Sent { nudge_id, .. } = h
            .coordinator
            .send_nudge_to_user("u1", &NudgeContext::StreakWarning, &NudgePayload::default())
            .await
            .unwrap()
        else {
            panic!("expected a send");
        };

        assert!(h.coordinator.record_engagement("u1", &nudge_id, Engagement::Clicked).await.unwrap());
        assert!(!h.coordinator.record_engagement("u1", "missing", Engagement::Opened).await.unwrap());

        let record = &h.history.records()[0];
        assert_eq!(record.opened, Some(true));
        assert!(record.clicked_at.is_some());
        let clicks = h
            .history
            .events()
            .iter()
            .filter(|e| e.event_type == EVENT_NUDGE_CLICKED)
            .count();
        assert_eq!(clicks, 1);
    }
}
