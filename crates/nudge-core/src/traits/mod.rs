//! Ports to the engine's external collaborators.

pub mod collaborators;
pub mod store;

pub use collaborators::{NotificationTransport, PersonaClassifier, TranslationParams, Translator, VariantAssigner};
pub use store::{HistoryStore, UserStore};
