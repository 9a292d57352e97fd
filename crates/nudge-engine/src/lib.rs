//! # Nudge Engine
//!
//! Decides whether, what and how a nudge is sent to one user.
//!
//! ## Pipeline
//! ```text
//! send_nudge_to_user(user, context, payload)
//!   ├── SendLocks: one in-flight delivery per (user, nudge type)
//!   ├── FrequencyGovernor: opt-out, daily cap
//!   ├── TacticSelector: persona × context → NudgeContent (vi / en / zh)
//!   ├── HistoryStore: record + NUDGE_SENT behavior event
//!   └── NotificationTransport: push → push retry → email
//! ```
//!
//! `BackoffCalculator` and `FramingService` are used by the scheduled passes
//! to pace sends and phrase streak reminders.

pub mod backoff;
pub mod delivery;
pub mod framing;
pub mod governor;
pub mod i18n;
pub mod lock;
pub mod selector;
pub mod tactics;

pub use backoff::BackoffCalculator;
pub use delivery::{
    BatchReport, DeliveryChannel, DeliveryCoordinator, DeliveryOutcome, Engagement, SkipReason,
};
pub use framing::{FramedContent, FramedMessage, Framing, FramingService};
pub use governor::FrequencyGovernor;
pub use i18n::CatalogTranslator;
pub use lock::{SendLockGuard, SendLocks};
pub use selector::TacticSelector;
pub use tactics::Tactic;
