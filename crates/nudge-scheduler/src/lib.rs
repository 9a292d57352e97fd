//! # Nudge Scheduler
//!
//! Timer-driven passes that decide *who* gets nudged and *when*.
//!
//! ## Architecture
//! ```text
//! TriggerRegistry (one tokio timer per name)
//!   ├── "daily-nudges"      0 * * * * → NudgePasses::daily_pass
//!   ├── "streak-checks"     0 * * * * → NudgePasses::streak_pass
//!   └── "evening-reminders" 0 * * * * → NudgePasses::evening_pass
//!                               │
//!                               ├── group_by_timezone / local_hour
//!                               ├── OptimalTimeResolver + BackoffCalculator
//!                               └── DeliveryCoordinator (nudge-engine)
//! ```

pub mod cron;
pub mod passes;
pub mod registry;
pub mod timezone;
pub mod timing;

pub use cron::CronSchedule;
pub use passes::{register_default_triggers, NudgePasses, PassKind, PassReport};
pub use registry::{handler, Cadence, Overlap, TriggerHandler, TriggerRegistry};
pub use timezone::{convert_to_user_timezone, group_by_timezone, TimezoneBatch};
pub use timing::OptimalTimeResolver;
