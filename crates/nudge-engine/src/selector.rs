//! Persona & Tactic Selector — loads the user, resolves the persona and turns
//! (context, persona, payload) into localized nudge content.

use std::sync::Arc;

use chrono::{Duration, Utc};
use nudge_core::config::SocialProofConfig;
use nudge_core::traits::{HistoryStore, PersonaClassifier, UserStore};
use nudge_core::{EventQuery, NudgeContent, NudgeContext, NudgeError, NudgePayload, Result};

use crate::tactics::resolve_tactic;

pub struct TacticSelector {
    users: Arc<dyn UserStore>,
    personas: Arc<dyn PersonaClassifier>,
    history: Arc<dyn HistoryStore>,
    social_proof: SocialProofConfig,
}

impl TacticSelector {
    pub fn new(
        users: Arc<dyn UserStore>,
        personas: Arc<dyn PersonaClassifier>,
        history: Arc<dyn HistoryStore>,
        social_proof: SocialProofConfig,
    ) -> Self {
        Self {
            users,
            personas,
            history,
            social_proof,
        }
    }

    /// `Ok(None)` means "no nudge for this context"; callers skip silently.
    pub async fn generate(
        &self,
        user_id: &str,
        context: &NudgeContext,
        payload: &NudgePayload,
    ) -> Result<Option<NudgeContent>> {
        if self.users.get_user(user_id).await?.is_none() {
            return Err(NudgeError::user_not_found(user_id));
        }
        let persona = self.personas.user_persona(user_id).await?;

        let Some(tactic) = resolve_tactic(context, persona, payload) else {
            return Ok(None);
        };

        let live_count = if tactic.needs_live_count() {
            Some(self.live_count(payload).await?)
        } else {
            None
        };
        Ok(tactic.render(payload, live_count))
    }

    /// Matching user activity in the trailing social-proof window. The
    /// engine's own send and engagement rows never count.
    pub async fn live_count(&self, payload: &NudgePayload) -> Result<usize> {
        let query = EventQuery {
            event_type: payload.action.clone(),
            path_contains: payload.target_id.clone(),
            since: Utc::now() - Duration::hours(self.social_proof.window_hours),
            user_activity_only: true,
        };
        self.history.count_events(&query).await
    }
}
