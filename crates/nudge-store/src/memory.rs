//! In-memory stores and lookup tables.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nudge_core::traits::{HistoryStore, PersonaClassifier, UserStore, VariantAssigner};
use nudge_core::{
    BehaviorEvent, EventQuery, NudgeError, NudgeHistoryRecord, Persona, Result, User, UserStreak,
    VariantAssignment,
};
use serde::Deserialize;

fn poisoned<T>(_: T) -> NudgeError {
    NudgeError::Store("lock poisoned".into())
}

/// JSON seed: `{"users": [...], "streaks": [...]}`.
#[derive(Debug, Default, Deserialize)]
struct UserSeed {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    streaks: Vec<UserStreak>,
}

/// User store held in memory, in insertion order.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
    streaks: RwLock<Vec<UserStreak>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users),
            streaks: RwLock::new(Vec::new()),
        }
    }

    /// Load users and streaks from a JSON seed file. A missing file yields an empty store.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("⚠️ User seed {} not found, starting empty", path.display());
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let seed: UserSeed = serde_json::from_str(&json)?;
        tracing::info!(
            "👥 Loaded {} users, {} streaks from {}",
            seed.users.len(),
            seed.streaks.len(),
            path.display()
        );
        Ok(Self {
            users: RwLock::new(seed.users),
            streaks: RwLock::new(seed.streaks),
        })
    }

    /// Insert or replace a user.
    pub fn upsert_user(&self, user: User) -> Result<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
        Ok(())
    }

    /// Insert or replace a user's streak.
    pub fn upsert_streak(&self, streak: UserStreak) -> Result<()> {
        let mut streaks = self.streaks.write().map_err(poisoned)?;
        match streaks.iter_mut().find(|s| s.user_id == streak.user_id) {
            Some(existing) => *existing = streak,
            None => streaks.push(streak),
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.read().map_err(poisoned)?.clone())
    }

    async fn list_streaks(&self) -> Result<Vec<UserStreak>> {
        Ok(self.streaks.read().map_err(poisoned)?.clone())
    }
}

/// History and behavior log held in memory.
#[derive(Default)]
pub struct MemoryHistory {
    records: RwLock<Vec<NudgeHistoryRecord>>,
    events: RwLock<Vec<BehaviorEvent>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<NudgeHistoryRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Snapshot of every behavior event.
    pub fn events(&self) -> Vec<BehaviorEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append_nudge(&self, record: &NudgeHistoryRecord) -> Result<()> {
        self.records.write().map_err(poisoned)?.push(record.clone());
        Ok(())
    }

    async fn recent_nudges(&self, user_id: &str, limit: usize) -> Result<Vec<NudgeHistoryRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut mine: Vec<_> = records.iter().filter(|r| r.user_id == user_id).cloned().collect();
        mine.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        mine.truncate(limit);
        Ok(mine)
    }

    async fn count_nudges_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<usize> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .filter(|r| r.user_id == user_id && r.sent_at > since)
            .count())
    }

    async fn mark_engagement(
        &self,
        nudge_id: &str,
        opened: bool,
        clicked_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.iter_mut().find(|r| r.id == nudge_id) {
            Some(record) => {
                record.opened = Some(opened);
                if clicked_at.is_some() {
                    record.clicked_at = clicked_at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn log_event(&self, event: &BehaviorEvent) -> Result<()> {
        self.events.write().map_err(poisoned)?.push(event.clone());
        Ok(())
    }

    async fn count_events(&self, query: &EventQuery) -> Result<usize> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events.iter().filter(|e| query.matches(e)).count())
    }

    async fn event_times(
        &self,
        user_id: &str,
        event_types: &[&str],
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.timestamp >= since
                    && event_types.contains(&e.event_type.as_str())
            })
            .map(|e| e.timestamp)
            .collect())
    }
}

/// Persona table keyed by user id.
#[derive(Default)]
pub struct StaticPersonas {
    personas: HashMap<String, Persona>,
}

impl StaticPersonas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user_id: &str, persona: Persona) -> Self {
        self.personas.insert(user_id.to_string(), persona);
        self
    }
}

#[async_trait]
impl PersonaClassifier for StaticPersonas {
    async fn user_persona(&self, user_id: &str) -> Result<Option<Persona>> {
        Ok(self.personas.get(user_id).copied())
    }
}

/// Reads the persona already stored on the user profile.
pub struct ProfilePersonas {
    users: Arc<dyn UserStore>,
}

impl ProfilePersonas {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl PersonaClassifier for ProfilePersonas {
    async fn user_persona(&self, user_id: &str) -> Result<Option<Persona>> {
        Ok(self.users.get_user(user_id).await?.and_then(|u| u.persona))
    }
}

/// Fixed experiment assignments keyed by (user, experiment).
#[derive(Default)]
pub struct StaticVariants {
    assignments: HashMap<(String, String), String>,
}

impl StaticVariants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user_id: &str, experiment_id: &str, variant_id: &str) -> Self {
        self.assignments.insert(
            (user_id.to_string(), experiment_id.to_string()),
            variant_id.to_string(),
        );
        self
    }
}

#[async_trait]
impl VariantAssigner for StaticVariants {
    async fn assign_variant(&self, user_id: &str, experiment_id: &str) -> Result<Option<VariantAssignment>> {
        Ok(self
            .assignments
            .get(&(user_id.to_string(), experiment_id.to_string()))
            .map(|variant_id| VariantAssignment {
                variant_id: variant_id.clone(),
                experiment_id: experiment_id.to_string(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, user: &str, hours_ago: i64) -> NudgeHistoryRecord {
        NudgeHistoryRecord {
            id: id.into(),
            user_id: user.into(),
            nudge_type: "STREAK_WARNING".into(),
            sent_at: Utc::now() - Duration::hours(hours_ago),
            opened: None,
            clicked_at: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_recent_nudges_sorted_desc() {
        let history = MemoryHistory::new();
        history.append_nudge(&record("a", "u1", 5)).await.unwrap();
        history.append_nudge(&record("b", "u1", 1)).await.unwrap();
        history.append_nudge(&record("c", "u2", 0)).await.unwrap();
        history.append_nudge(&record("d", "u1", 3)).await.unwrap();

        let recent = history.recent_nudges("u1", 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_count_since_and_engagement() {
        let history = MemoryHistory::new();
        history.append_nudge(&record("a", "u1", 30)).await.unwrap();
        history.append_nudge(&record("b", "u1", 2)).await.unwrap();

        let since = Utc::now() - Duration::hours(24);
        assert_eq!(history.count_nudges_since("u1", since).await.unwrap(), 1);

        assert!(history.mark_engagement("b", true, None).await.unwrap());
        assert!(!history.mark_engagement("missing", true, None).await.unwrap());
        assert_eq!(history.records()[1].opened, Some(true));
    }

    #[tokio::test]
    async fn test_user_store_upsert() {
        let store = MemoryUserStore::new();
        store.upsert_user(User::new("u1")).unwrap();
        let mut updated = User::new("u1");
        updated.timezone = Some("Asia/Ho_Chi_Minh".into());
        store.upsert_user(updated).unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].timezone_or_utc(), "Asia/Ho_Chi_Minh");
        assert!(store.get_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_personas_reads_user() {
        let store = MemoryUserStore::new();
        let mut user = User::new("u1");
        user.persona = Some(Persona::Hunter);
        store.upsert_user(user).unwrap();

        let personas = ProfilePersonas::new(Arc::new(store));
        assert_eq!(personas.user_persona("u1").await.unwrap(), Some(Persona::Hunter));
        assert_eq!(personas.user_persona("u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_json_seed() {
        let dir = std::env::temp_dir().join("nudge-test-seed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("users.json");
        std::fs::write(
            &path,
            r#"{"users":[{"id":"u1","timezone":"Asia/Tokyo"}],
                "streaks":[{"userId":"u1","currentStreak":4,"lastActivityDate":"2026-10-18T08:00:00Z"}]}"#,
        )
        .unwrap();

        let store = MemoryUserStore::load_json(&path).unwrap();
        assert_eq!(store.list_users().await.unwrap().len(), 1);
        assert_eq!(store.list_streaks().await.unwrap()[0].current_streak, 4);
        std::fs::remove_dir_all(&dir).ok();
    }
}
