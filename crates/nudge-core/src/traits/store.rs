//! Storage ports — users (read-only) and nudge/behavior history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{BehaviorEvent, EventQuery, NudgeHistoryRecord, User, UserStreak};

/// Read-only access to users and their streaks.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    async fn list_streaks(&self) -> Result<Vec<UserStreak>>;
}

/// Durable nudge history and behavior log. This is the source of truth for
/// governance, backoff, learned send hours and realtime counts.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_nudge(&self, record: &NudgeHistoryRecord) -> Result<()>;

    /// Most recent records first.
    async fn recent_nudges(&self, user_id: &str, limit: usize) -> Result<Vec<NudgeHistoryRecord>>;

    /// Records with `sent_at` strictly after `since`.
    async fn count_nudges_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<usize>;

    /// Apply an engagement event. Returns false when the record is unknown.
    async fn mark_engagement(
        &self,
        nudge_id: &str,
        opened: bool,
        clicked_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn log_event(&self, event: &BehaviorEvent) -> Result<()>;

    async fn count_events(&self, query: &EventQuery) -> Result<usize>;

    /// Timestamps of a user's events of the given types since `since`.
    async fn event_times(
        &self,
        user_id: &str,
        event_types: &[&str],
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>>;
}
