//! Data model — users (read-only here), nudge content, history and behavior events.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Behavior event written for every committed send.
pub const EVENT_NUDGE_SENT: &str = "NUDGE_SENT";
/// Engagement events, written when a user opens or clicks a nudge.
pub const EVENT_NUDGE_OPENED: &str = "NUDGE_OPENED";
pub const EVENT_NUDGE_CLICKED: &str = "NUDGE_CLICKED";

/// Event types the engine writes about itself. Never user activity.
pub const ENGINE_EVENTS: [&str; 3] = [EVENT_NUDGE_SENT, EVENT_NUDGE_OPENED, EVENT_NUDGE_CLICKED];

/// Behavioral archetype used for tactic selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Persona {
    Saver,
    Hunter,
    General,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Saver => "SAVER",
            Persona::Hunter => "HUNTER",
            Persona::General => "GENERAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SAVER" => Some(Persona::Saver),
            "HUNTER" => Some(Persona::Hunter),
            "GENERAL" => Some(Persona::General),
            _ => None,
        }
    }
}

fn bool_true() -> bool { true }

/// Per-user nudge preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgePreferences {
    /// "HH:MM" local time.
    #[serde(default)]
    pub preferred_nudge_time: Option<String>,
    #[serde(default)]
    pub weekend_delay: bool,
    #[serde(default)]
    pub max_nudges_per_day: Option<u32>,
    #[serde(default = "bool_true")]
    pub nudges_enabled: bool,
    #[serde(default = "bool_true")]
    pub streak_nudges: bool,
    /// Local hours, 0..=23. Zero is a real hour, not "unset".
    #[serde(default)]
    pub quiet_hours_start: Option<u32>,
    #[serde(default)]
    pub quiet_hours_end: Option<u32>,
}

impl Default for NudgePreferences {
    fn default() -> Self {
        Self {
            preferred_nudge_time: None,
            weekend_delay: false,
            max_nudges_per_day: None,
            nudges_enabled: true,
            streak_nudges: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }
}

/// A user as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// IANA identifier; `None` means UTC.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub preferences: NudgePreferences,
    #[serde(default)]
    pub persona: Option<Persona>,
    #[serde(default)]
    pub preferred_locale: Option<String>,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            timezone: None,
            preferences: NudgePreferences::default(),
            persona: None,
            preferred_locale: None,
        }
    }

    pub fn timezone_or_utc(&self) -> &str {
        self.timezone.as_deref().unwrap_or("UTC")
    }
}

/// Streak state for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStreak {
    pub user_id: String,
    pub current_streak: u32,
    #[serde(default)]
    pub streak_frozen: bool,
    pub last_activity_date: DateTime<Utc>,
}

impl UserStreak {
    /// A streak worth protecting: non-zero and not frozen.
    pub fn is_active(&self) -> bool {
        self.current_streak > 0 && !self.streak_frozen
    }
}

/// Supported message locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Vi,
    En,
    Zh,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::Vi, Locale::En, Locale::Zh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Vi => "vi",
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vi" => Some(Locale::Vi),
            "en" => Some(Locale::En),
            "zh" => Some(Locale::Zh),
            _ => None,
        }
    }
}

/// A message in every supported locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedMessage {
    pub vi: String,
    pub en: String,
    pub zh: String,
}

impl LocalizedMessage {
    pub fn new(vi: impl Into<String>, en: impl Into<String>, zh: impl Into<String>) -> Self {
        Self {
            vi: vi.into(),
            en: en.into(),
            zh: zh.into(),
        }
    }

    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::Vi => &self.vi,
            Locale::En => &self.en,
            Locale::Zh => &self.zh,
        }
    }

    /// All three strings are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.vi.trim().is_empty() && !self.en.trim().is_empty() && !self.zh.trim().is_empty()
    }
}

/// Behavioral-economics technique a nudge applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NudgeType {
    SocialProof,
    LossAversion,
    GoalGradient,
    Salience,
    Default,
}

impl NudgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeType::SocialProof => "SOCIAL_PROOF",
            NudgeType::LossAversion => "LOSS_AVERSION",
            NudgeType::GoalGradient => "GOAL_GRADIENT",
            NudgeType::Salience => "SALIENCE",
            NudgeType::Default => "DEFAULT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Content of a single nudge, ready to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NudgeContent {
    #[serde(rename = "type")]
    pub nudge_type: NudgeType,
    pub message: LocalizedMessage,
    pub priority: Priority,
}

/// Trigger context a nudge is generated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NudgeContext {
    InvestmentDecision,
    Budgeting,
    StreakWarning,
    SocialProofRealtime,
    /// Anything else. Resolves to no nudge.
    Unrecognized(String),
}

impl NudgeContext {
    pub fn parse(s: &str) -> Self {
        match s {
            "INVESTMENT_DECISION" => NudgeContext::InvestmentDecision,
            "BUDGETING" => NudgeContext::Budgeting,
            "STREAK_WARNING" => NudgeContext::StreakWarning,
            "SOCIAL_PROOF_REALTIME" => NudgeContext::SocialProofRealtime,
            other => NudgeContext::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NudgeContext::InvestmentDecision => "INVESTMENT_DECISION",
            NudgeContext::Budgeting => "BUDGETING",
            NudgeContext::StreakWarning => "STREAK_WARNING",
            NudgeContext::SocialProofRealtime => "SOCIAL_PROOF_REALTIME",
            NudgeContext::Unrecognized(s) => s,
        }
    }
}

/// Caller-supplied data a tactic may interpolate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<f64>,
    /// Amount in VND.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Percent toward the savings goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_progress: Option<f64>,
    /// Behavior event type counted by realtime social proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Append-only record of a send decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeHistoryRecord {
    pub id: String,
    pub user_id: String,
    pub nudge_type: String,
    pub sent_at: DateTime<Utc>,
    /// `None` until an engagement event arrives.
    #[serde(default)]
    pub opened: Option<bool>,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Row in the behavior log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    pub user_id: String,
    pub session_id: String,
    pub event_type: String,
    pub path: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BehaviorEvent {
    pub fn new(user_id: &str, event_type: &str, path: &str, payload: serde_json::Value) -> Self {
        let timestamp = Utc::now();
        Self {
            user_id: user_id.to_string(),
            session_id: format!("nudge-session-{}", timestamp.timestamp_millis()),
            event_type: event_type.to_string(),
            path: path.to_string(),
            payload,
            timestamp,
        }
    }
}

/// Filter for counting behavior events.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub event_type: Option<String>,
    /// Case-sensitive substring of the event path.
    pub path_contains: Option<String>,
    pub since: DateTime<Utc>,
    /// Drop the engine's own `NUDGE_*` rows from the result.
    pub user_activity_only: bool,
}

impl EventQuery {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            event_type: None,
            path_contains: None,
            since,
            user_activity_only: false,
        }
    }

    pub fn matches(&self, event: &BehaviorEvent) -> bool {
        event.timestamp >= self.since
            && self.event_type.as_deref().is_none_or(|t| event.event_type == t)
            && self
                .path_contains
                .as_deref()
                .is_none_or(|p| event.path.contains(p))
            && !(self.user_activity_only && ENGINE_EVENTS.contains(&event.event_type.as_str()))
    }
}

/// Governance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
}

impl Period {
    pub fn window(&self) -> Duration {
        match self {
            Period::Daily => Duration::hours(24),
            Period::Weekly => Duration::days(7),
        }
    }
}

/// Experiment arm handed out by the A/B service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantAssignment {
    pub variant_id: String,
    pub experiment_id: String,
}

/// Push notification payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub user_id: String,
    pub title: String,
    pub body: LocalizedMessage,
    pub nudge_id: String,
}

/// Email fallback payload; same content as the push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPayload {
    pub user_id: String,
    pub subject: String,
    pub body: LocalizedMessage,
}
