use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::Arc;
use unic_langid::LanguageIdentifier;

/// Languages with a bundled `locales/<lang>/main.ftl`
pub const SUPPORTED_LANGUAGES: &[&str] = &["ru", "en"];

const RESOURCES: &[(&str, &str)] = &[
    ("ru", include_str!("../locales/ru/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

/// Localization manager for the courier bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
    default_language: String,
}

impl LocalizationManager {
    /// Create a localization manager falling back to `default_language`
    pub fn new(default_language: &str) -> Result<Self> {
        let mut bundles = HashMap::new();

        for (locale_str, source) in RESOURCES {
            let locale: LanguageIdentifier = locale_str.parse()?;
            let bundle = Self::create_bundle(locale, source)?;
            bundles.insert(locale_str.to_string(), bundle);
        }

        if !bundles.contains_key(default_language) {
            return Err(anyhow!("Unsupported default language: {}", default_language));
        }

        Ok(Self {
            bundles,
            default_language: default_language.to_string(),
        })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(
        locale: LanguageIdentifier,
        source: &str,
    ) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Telegram renders the isolation marks as visible garbage around ids
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid {} resource: {:?}", locale, errors))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate messages in {} resource: {:?}", locale, errors))?;

        Ok(bundle)
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&FluentArgs>,
    ) -> String {
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(&self.default_language))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None => {
                tracing::warn!(key = %key, language = %language, "Missing translation");
                return format!("Missing translation: {}", key);
            }
        };

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            tracing::warn!(key = %key, errors = ?errors, "Failed to format translation");
        }
        value.into_owned()
    }

    /// Get a localized message with arguments in a specific language
    pub fn get_message_with_args_in_language(
        &self,
        key: &str,
        language: &str,
        args: &[(&str, &str)],
    ) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(*value));
        }
        self.get_message_in_language(key, language, Some(&fluent_args))
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Pick the bundle for a Telegram language code ("en-US" -> "en")
    pub fn detect_language(&self, language_code: Option<&str>) -> String {
        if let Some(code) = language_code {
            let lang = code.split('-').next().unwrap_or(code).to_lowercase();
            if self.is_language_supported(&lang) {
                return lang;
            }
        }

        self.default_language.clone()
    }
}

/// A localization manager bound to one recipient's language
#[derive(Clone)]
pub struct Translator<'a> {
    manager: &'a LocalizationManager,
    language: String,
}

impl<'a> Translator<'a> {
    pub fn new(manager: &'a LocalizationManager, language: impl Into<String>) -> Self {
        Self {
            manager,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn t(&self, key: &str) -> String {
        t_lang(self.manager, key, &self.language)
    }

    pub fn t_args(&self, key: &str, args: &[(&str, &str)]) -> String {
        t_args_lang(self.manager, key, args, &self.language)
    }
}

/// Create the shared localization manager
pub fn create_localization_manager(default_language: &str) -> Result<Arc<LocalizationManager>> {
    Ok(Arc::new(LocalizationManager::new(default_language)?))
}

/// Convenience function to get a localized message in an already detected language
pub fn t_lang(manager: &LocalizationManager, key: &str, language: &str) -> String {
    manager.get_message_in_language(key, language, None)
}

/// Convenience function to get a localized message with arguments
pub fn t_args_lang(
    manager: &LocalizationManager,
    key: &str,
    args: &[(&str, &str)],
    language: &str,
) -> String {
    manager.get_message_with_args_in_language(key, language, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection_falls_back_to_default() {
        let manager = LocalizationManager::new("ru").unwrap();
        assert_eq!(manager.detect_language(Some("en-US")), "en");
        assert_eq!(manager.detect_language(Some("EN")), "en");
        assert_eq!(manager.detect_language(Some("de")), "ru");
        assert_eq!(manager.detect_language(None), "ru");
    }

    #[test]
    fn test_arguments_render_without_isolation_marks() {
        let manager = LocalizationManager::new("ru").unwrap();
        let text = t_args_lang(&manager, "order-accepted-courier", &[("id", "42")], "en");
        assert!(text.contains("#42"));
        assert!(!text.contains('\u{2068}'));
    }

    #[test]
    fn test_missing_key_is_reported_inline() {
        let manager = LocalizationManager::new("en").unwrap();
        assert_eq!(
            t_lang(&manager, "no-such-key", "en"),
            "Missing translation: no-such-key"
        );
    }

    #[test]
    fn test_translator_uses_bound_language() {
        let manager = LocalizationManager::new("ru").unwrap();
        let en = Translator::new(&manager, "en");
        let ru = Translator::new(&manager, "ru");
        assert_eq!(en.language(), "en");
        assert_ne!(en.t("btn-back"), ru.t("btn-back"));
    }

    #[test]
    fn test_unsupported_default_language_is_rejected() {
        assert!(LocalizationManager::new("de").is_err());
    }

    #[test]
    fn test_status_labels_exist_in_every_language() {
        let manager = LocalizationManager::new("ru").unwrap();
        for lang in SUPPORTED_LANGUAGES {
            for status in crate::models::DetailedStatus::OPERATOR_TARGETS {
                let label = t_lang(&manager, status.label_key(), lang);
                assert!(!label.starts_with("Missing"), "{} in {}", status, lang);
            }
        }
    }
}
