//! # Nudge Core
//!
//! Shared vocabulary for the nudge delivery engine: the data model, the error
//! type, configuration, and the traits every external collaborator implements.
//!
//! ## Architecture
//! ```text
//! Trigger fires (nudge-scheduler)
//!   ├── candidate users ── UserStore
//!   ├── FrequencyGovernor ── HistoryStore
//!   └── DeliveryCoordinator (nudge-engine)
//!         ├── TacticSelector ── PersonaClassifier
//!         ├── FramingService ── Translator + VariantAssigner
//!         ├── HistoryStore (record + behavior log)
//!         └── NotificationTransport (push → retry → email)
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use types::*;
