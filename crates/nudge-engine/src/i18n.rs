//! Built-in message catalog implementing `Translator`.
//!
//! Lookup order: requested locale → base locale → the key itself.
//! `{{name}}` placeholders are replaced from params; a missing param renders
//! as an empty string so no raw token ever reaches a user.

use nudge_core::traits::{TranslationParams, Translator};
use nudge_core::{Locale, NudgeError, Result};

const BUILTIN_CATALOG: &str = include_str!("../locales/catalog.toml");

/// TOML-backed catalog: `[<locale>.<namespace>] key = "text"`.
pub struct CatalogTranslator {
    catalog: toml::Table,
    base_locale: Locale,
}

impl CatalogTranslator {
    /// The catalog shipped with the engine.
    pub fn builtin(base_locale: &str) -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG, base_locale)
    }

    pub fn from_toml_str(content: &str, base_locale: &str) -> Result<Self> {
        let catalog: toml::Table = content
            .parse()
            .map_err(|e| NudgeError::Config(format!("Failed to parse message catalog: {e}")))?;
        let base_locale = Locale::parse(base_locale)
            .ok_or_else(|| NudgeError::Config(format!("Unsupported base locale: {base_locale}")))?;
        Ok(Self { catalog, base_locale })
    }

    pub fn base_locale(&self) -> Locale {
        self.base_locale
    }

    fn lookup(&self, locale: Locale, key: &str) -> Option<&str> {
        let mut node = self.catalog.get(locale.as_str())?;
        for part in key.split('.') {
            node = node.as_table()?.get(part)?;
        }
        node.as_str()
    }
}

impl Translator for CatalogTranslator {
    fn translate(&self, key: &str, locale: &str, params: &TranslationParams) -> Result<String> {
        let locale = Locale::parse(locale).unwrap_or(self.base_locale);
        let template = self
            .lookup(locale, key)
            .or_else(|| self.lookup(self.base_locale, key))
            .unwrap_or(key);
        Ok(interpolate(template, params))
    }
}

/// Replace `{{name}}` placeholders. Unknown names become empty strings.
pub fn interpolate(template: &str, params: &TranslationParams) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = params.get(name) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated: keep the text, drop the opening braces.
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
