//! Lookup and delivery collaborators.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EmailPayload, Persona, PushPayload, VariantAssignment};

/// Interpolation parameters, by name.
pub type TranslationParams = BTreeMap<String, String>;

/// Persona classifier. `Ok(None)` means "not classified yet".
#[async_trait]
pub trait PersonaClassifier: Send + Sync {
    async fn user_persona(&self, user_id: &str) -> Result<Option<Persona>>;
}

/// A/B assignment service. `Ok(None)` means the user is not enrolled.
#[async_trait]
pub trait VariantAssigner: Send + Sync {
    async fn assign_variant(&self, user_id: &str, experiment_id: &str) -> Result<Option<VariantAssignment>>;
}

/// Message catalog. Implementations interpolate `params` and echo unknown keys.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, locale: &str, params: &TranslationParams) -> Result<String>;
}

/// Notification transport. Channels fail independently.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send_push(&self, payload: &PushPayload) -> Result<()>;

    async fn send_email(&self, payload: &EmailPayload) -> Result<()>;
}
