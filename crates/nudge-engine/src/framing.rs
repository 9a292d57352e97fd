//! Framing Service — gain vs loss phrasing of the same fact, with optional
//! A/B variant override.

use std::sync::Arc;

use nudge_core::traits::{TranslationParams, Translator, VariantAssigner};
use nudge_core::{
    Locale, LocalizedMessage, NudgeContent, NudgeError, NudgeType, Persona, Priority, Result,
};

/// Context fragments that call for loss framing.
const LOSS_CONTEXTS: [&str; 4] = ["streak", "deadline", "risk", "warning"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Gain,
    Loss,
    Default,
}

impl Framing {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GAIN" => Some(Framing::Gain),
            "LOSS" => Some(Framing::Loss),
            "DEFAULT" => Some(Framing::Default),
            _ => None,
        }
    }
}

/// A single-locale framed message plus experiment tracking data.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedMessage {
    pub message: String,
    /// Framing actually used; `None` when an experiment variant did not name one.
    pub framing: Option<Framing>,
    pub variant_id: Option<String>,
    pub experiment_id: Option<String>,
}

/// Full three-locale content for a framing.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedContent {
    pub content: NudgeContent,
    pub variant_id: Option<String>,
    pub experiment_id: Option<String>,
}

pub struct FramingService {
    translator: Arc<dyn Translator>,
    variants: Arc<dyn VariantAssigner>,
}

impl FramingService {
    pub fn new(translator: Arc<dyn Translator>, variants: Arc<dyn VariantAssigner>) -> Self {
        Self { translator, variants }
    }

    /// Render `context` under `framing` in one locale. With an experiment, the
    /// assigned variant overrides the requested framing.
    pub async fn generate_framed_message(
        &self,
        user_id: &str,
        framing: Framing,
        context: &str,
        locale: &str,
        params: &TranslationParams,
        experiment_id: Option<&str>,
    ) -> Result<FramedMessage> {
        let (selected, variant_id) = self.select_framing(user_id, framing, experiment_id).await?;
        let key = message_key(selected, context);
        let message = self.translator.translate(&key, locale, params)?;
        Ok(FramedMessage {
            message,
            framing: selected,
            variant_id,
            experiment_id: experiment_id.map(str::to_string),
        })
    }

    /// Same as `generate_framed_message` but for every locale at once; the
    /// experiment is consulted a single time.
    pub async fn framed_content(
        &self,
        user_id: &str,
        framing: Framing,
        context: &str,
        params: &TranslationParams,
        experiment_id: Option<&str>,
    ) -> Result<FramedContent> {
        let (selected, variant_id) = self.select_framing(user_id, framing, experiment_id).await?;
        let key = message_key(selected, context);
        let message = self.translate_all(&key, params)?;
        if !message.is_complete() {
            return Err(NudgeError::Translation(format!("empty translation for {key}")));
        }

        let (nudge_type, priority) = match selected {
            Some(Framing::Loss) => (NudgeType::LossAversion, Priority::High),
            _ => (NudgeType::Default, Priority::Medium),
        };
        Ok(FramedContent {
            content: NudgeContent {
                nudge_type,
                message,
                priority,
            },
            variant_id,
            experiment_id: experiment_id.map(str::to_string),
        })
    }

    /// `nudge.<context>` in every locale.
    pub fn localized_templates(&self, context: &str) -> Result<LocalizedMessage> {
        self.translate_all(&format!("nudge.{context}"), &TranslationParams::new())
    }

    fn translate_all(&self, key: &str, params: &TranslationParams) -> Result<LocalizedMessage> {
        let [vi, en, zh] = Locale::ALL;
        Ok(LocalizedMessage::new(
            self.translator.translate(key, vi.as_str(), params)?,
            self.translator.translate(key, en.as_str(), params)?,
            self.translator.translate(key, zh.as_str(), params)?,
        ))
    }

    async fn select_framing(
        &self,
        user_id: &str,
        requested: Framing,
        experiment_id: Option<&str>,
    ) -> Result<(Option<Framing>, Option<String>)> {
        let Some(experiment_id) = experiment_id else {
            return Ok((Some(requested), None));
        };
        match self.variants.assign_variant(user_id, experiment_id).await? {
            Some(assignment) => {
                tracing::debug!(
                    "🧪 {} assigned variant {} in {}",
                    user_id,
                    assignment.variant_id,
                    experiment_id
                );
                Ok((Framing::parse(&assignment.variant_id), Some(assignment.variant_id)))
            }
            None => Ok((Some(requested), None)),
        }
    }
}

/// LOSS → `nudge.loss_aversion`, GAIN → `nudge.framing_gain`, anything else
/// → `nudge.<context>`.
pub fn message_key(framing: Option<Framing>, context: &str) -> String {
    match framing {
        Some(Framing::Loss) => "nudge.loss_aversion".to_string(),
        Some(Framing::Gain) => "nudge.framing_gain".to_string(),
        Some(Framing::Default) | None => format!("nudge.{context}"),
    }
}

/// LOSS for risk-flavoured contexts or SAVER users, GAIN otherwise.
pub fn default_framing(context: &str, persona: Option<Persona>) -> Framing {
    let lowered = context.to_lowercase();
    if LOSS_CONTEXTS.iter().any(|c| lowered.contains(c)) {
        return Framing::Loss;
    }
    if persona == Some(Persona::Saver) {
        return Framing::Loss;
    }
    Framing::Gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::CatalogTranslator;
    use async_trait::async_trait;
    use nudge_core::VariantAssignment;
    use nudge_store::StaticVariants;

    struct BrokenAssigner;

    #[async_trait]
    impl VariantAssigner for BrokenAssigner {
        async fn assign_variant(&self, _: &str, _: &str) -> Result<Option<VariantAssignment>> {
            Err(NudgeError::Experiment("ab service down".into()))
        }
    }

    fn service(variants: Arc<dyn VariantAssigner>) -> FramingService {
        FramingService::new(Arc::new(CatalogTranslator::builtin("vi").unwrap()), variants)
    }

    fn params(pairs: &[(&str, &str)]) -> TranslationParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_framing() {
        assert_eq!(default_framing("streak_warning", None), Framing::Loss);
        assert_eq!(default_framing("investment_RISK", None), Framing::Loss);
        assert_eq!(default_framing("bonus_available", None), Framing::Gain);
        assert_eq!(default_framing("investment", Some(Persona::Saver)), Framing::Loss);
        assert_eq!(default_framing("opportunity", Some(Persona::Hunter)), Framing::Gain);
    }

    #[test]
    fn test_message_keys() {
        assert_eq!(message_key(Some(Framing::Loss), "x"), "nudge.loss_aversion");
        assert_eq!(message_key(Some(Framing::Gain), "x"), "nudge.framing_gain");
        assert_eq!(message_key(Some(Framing::Default), "savings"), "nudge.savings");
        assert_eq!(message_key(None, "savings"), "nudge.savings");
    }

    #[tokio::test]
    async fn test_gain_and_loss_messages() {
        let svc = service(Arc::new(StaticVariants::new()));
        let gain = svc
            .generate_framed_message("u1", Framing::Gain, "savings", "en", &params(&[("amount", "$100")]), None)
            .await
            .unwrap();
        assert_eq!(gain.message, "You will save $100 if you act now.");
        assert_eq!(gain.variant_id, None);

        let loss = svc
            .generate_framed_message("u1", Framing::Loss, "streak", "en", &params(&[("days", "7")]), None)
            .await
            .unwrap();
        assert!(loss.message.contains("7-day streak"));
    }

    #[tokio::test]
    async fn test_unknown_locale_uses_base() {
        let svc = service(Arc::new(StaticVariants::new()));
        let out = svc
            .generate_framed_message("u1", Framing::Loss, "streak", "fr", &params(&[("days", "3")]), None)
            .await
            .unwrap();
        assert_eq!(out.message, "Đừng để mất chuỗi 3 ngày của bạn!");
    }

    #[tokio::test]
    async fn test_variant_overrides_framing() {
        let variants = StaticVariants::new().with("u1", "exp-framing", "LOSS");
        let svc = service(Arc::new(variants));
        let out = svc
            .generate_framed_message(
                "u1",
                Framing::Gain,
                "streak",
                "en",
                &params(&[("days", "5")]),
                Some("exp-framing"),
            )
            .await
            .unwrap();
        assert_eq!(out.framing, Some(Framing::Loss));
        assert_eq!(out.variant_id.as_deref(), Some("LOSS"));
        assert_eq!(out.experiment_id.as_deref(), Some("exp-framing"));
        assert!(out.message.contains("5-day streak"));
    }

    #[tokio::test]
    async fn test_unresolved_variant_uses_context_key() {
        let variants = StaticVariants::new().with("u1", "exp", "control-b");
        let svc = service(Arc::new(variants));
        let out = svc
            .generate_framed_message("u1", Framing::Gain, "savings", "en", &TranslationParams::new(), Some("exp"))
            .await
            .unwrap();
        assert_eq!(out.framing, None);
        assert_eq!(out.message, "Every small saving brings you closer to your goal.");
    }

    #[tokio::test]
    async fn test_not_enrolled_keeps_requested() {
        let svc = service(Arc::new(StaticVariants::new()));
        let out = svc
            .generate_framed_message("u1", Framing::Gain, "savings", "en", &TranslationParams::new(), Some("exp"))
            .await
            .unwrap();
        assert_eq!(out.framing, Some(Framing::Gain));
        assert_eq!(out.variant_id, None);
    }

    #[tokio::test]
    async fn test_assigner_failure_propagates() {
        let svc = service(Arc::new(BrokenAssigner));
        let err = svc
            .generate_framed_message("u1", Framing::Gain, "savings", "en", &TranslationParams::new(), Some("exp"))
            .await
            .unwrap_err();
        assert!(matches!(err, NudgeError::Experiment(_)));
    }

    #[tokio::test]
    async fn test_framed_content_all_locales() {
        let svc = service(Arc::new(StaticVariants::new()));
        let framed = svc
            .framed_content("u1", Framing::Loss, "streak", &params(&[("days", "15")]), None)
            .await
            .unwrap();
        assert_eq!(framed.content.nudge_type, NudgeType::LossAversion);
        assert_eq!(framed.content.priority, Priority::High);
        assert!(framed.content.message.en.contains("15-day streak"));
        assert!(framed.content.message.zh.contains("15"));
        assert!(framed.content.message.vi.contains("15"));
    }

    #[test]
    fn test_localized_templates() {
        let svc = service(Arc::new(StaticVariants::new()));
        let t = svc.localized_templates("savings").unwrap();
        assert!(t.is_complete());
        assert_eq!(t.en, "Every small saving brings you closer to your goal.");
    }
}
