use std::fmt;
use std::time::Duration;

use crate::config::{BackupKind, BackupSlotConfig, ProviderSlotConfig, ProvidersConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    Gemini,
    OpenRouter,
    OpenAi,
}

impl ProviderKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Groq => "Groq (Llama 3)",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::OpenRouter => "OpenRouter (Backup)",
            ProviderKind::OpenAi => "OpenAI (Backup)",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Groq => "llama-3.1-8b-instant",
            ProviderKind::Gemini => "gemini-flash-latest",
            ProviderKind::OpenRouter => "google/gemini-2.0-flash-exp:free",
            ProviderKind::OpenAi => "gpt-4o",
        }
    }

    fn extra_headers(self) -> Vec<(String, String)> {
        match self {
            ProviderKind::OpenRouter => vec![("X-Title".to_string(), "ToolsVault".to_string())],
            _ => Vec::new(),
        }
    }
}

impl From<BackupKind> for ProviderKind {
    fn from(kind: BackupKind) -> Self {
        match kind {
            BackupKind::OpenRouter => ProviderKind::OpenRouter,
            BackupKind::OpenAi => ProviderKind::OpenAi,
        }
    }
}

/// One configured provider. Immutable for the duration of a generation run.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub headers: Vec<(String, String)>,
    /// Mandatory wait before every call to this provider.
    pub pre_call_delay: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.display_name().to_string(),
            api_key: api_key.into(),
            base_url: kind.default_base_url().to_string(),
            model: kind.default_model().to_string(),
            headers: kind.extra_headers(),
            pre_call_delay: None,
        }
    }

    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model.to_string();
        }
        self
    }

    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_pre_call_delay(mut self, delay: Duration) -> Self {
        self.pre_call_delay = Some(delay).filter(|d| !d.is_zero());
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("headers", &self.headers)
            .field("pre_call_delay", &self.pre_call_delay)
            .finish()
    }
}

/// Ordered provider list: groq, then gemini (paced), then the backup slot.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn from_config(config: &ProvidersConfig, gemini_delay: Duration) -> Self {
        let mut providers = Vec::new();

        if let Some(p) = slot(ProviderKind::Groq, &config.groq) {
            providers.push(p);
        }
        if let Some(p) = slot(ProviderKind::Gemini, &config.gemini) {
            providers.push(p.with_pre_call_delay(gemini_delay));
        }
        if let Some(p) = backup_slot(&config.backup) {
            providers.push(p);
        }

        Self::from_providers(providers)
    }

    pub fn from_providers(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    pub fn list_available(&self) -> Vec<ProviderConfig> {
        self.providers.clone()
    }

    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }
}

fn credential(api_key: &Option<String>) -> Option<&str> {
    api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

fn slot(kind: ProviderKind, config: &ProviderSlotConfig) -> Option<ProviderConfig> {
    let key = credential(&config.api_key)?;
    Some(
        ProviderConfig::new(kind, key)
            .with_model(config.model.as_deref())
            .with_base_url(config.base_url.as_deref()),
    )
}

fn backup_slot(config: &BackupSlotConfig) -> Option<ProviderConfig> {
    let key = credential(&config.api_key)?;
    Some(
        ProviderConfig::new(config.kind.into(), key)
            .with_model(config.model.as_deref())
            .with_base_url(config.base_url.as_deref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Option<String> {
        Some(k.to_string())
    }

    #[test]
    fn no_credentials_means_empty_registry() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default(), Duration::from_millis(1500));
        assert!(!registry.is_available());
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn priority_order_and_pacing() {
        let mut config = ProvidersConfig::default();
        config.backup.api_key = key("backup-key");
        config.gemini.api_key = key("gemini-key");
        config.groq.api_key = key("groq-key");

        let providers = ProviderRegistry::from_config(&config, Duration::from_millis(1500)).list_available();
        let kinds: Vec<_> = providers.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![ProviderKind::Groq, ProviderKind::Gemini, ProviderKind::OpenRouter]);

        assert_eq!(providers[0].pre_call_delay, None);
        assert_eq!(providers[1].pre_call_delay, Some(Duration::from_millis(1500)));
        assert_eq!(providers[2].headers, vec![("X-Title".to_string(), "ToolsVault".to_string())]);
        assert_eq!(providers[2].model, "google/gemini-2.0-flash-exp:free");
    }

    #[test]
    fn backup_routes_by_kind_not_key_prefix() {
        let mut config = ProvidersConfig::default();
        config.backup.kind = BackupKind::OpenAi;
        config.backup.api_key = key("sk-or-looks-like-openrouter");

        let providers = ProviderRegistry::from_config(&config, Duration::ZERO).list_available();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "OpenAI (Backup)");
        assert_eq!(providers[0].base_url, "https://api.openai.com/v1");
        assert_eq!(providers[0].model, "gpt-4o");
        assert!(providers[0].headers.is_empty());
    }

    #[test]
    fn overrides_and_blank_keys() {
        let mut config = ProvidersConfig::default();
        config.groq.api_key = key("   ");
        config.gemini.api_key = key("g");
        config.gemini.model = Some("gemini-2.5-pro".to_string());
        config.gemini.base_url = Some("http://localhost:9000/v1/".to_string());

        let providers = ProviderRegistry::from_config(&config, Duration::ZERO).list_available();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].model, "gemini-2.5-pro");
        assert_eq!(providers[0].base_url, "http://localhost:9000/v1");
        assert_eq!(providers[0].pre_call_delay, None);
    }

    #[test]
    fn debug_redacts_key() {
        let provider = ProviderConfig::new(ProviderKind::Groq, "super-secret");
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
