use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::generate::GenerationSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Shared secret expected in the `x-admin-token` header.
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            admin_token: None,
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "quillpress.db".to_string()
}

/// Credential slots, in priority order: groq, gemini, backup.
#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub groq: ProviderSlotConfig,
    #[serde(default)]
    pub gemini: ProviderSlotConfig,
    #[serde(default)]
    pub backup: BackupSlotConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProviderSlotConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Which service the backup credential belongs to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    #[default]
    OpenRouter,
    OpenAi,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BackupSlotConfig {
    #[serde(default)]
    pub kind: BackupKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
    #[serde(default = "default_gemini_delay")]
    pub gemini_delay: String,
    #[serde(default = "default_batch_delay")]
    pub batch_delay: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            gemini_delay: default_gemini_delay(),
            batch_delay: default_batch_delay(),
            request_timeout: default_request_timeout(),
            min_content_length: default_min_content_length(),
            max_count: default_max_count(),
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> String {
    "2s".to_string()
}
fn default_gemini_delay() -> String {
    "1500ms".to_string()
}
fn default_batch_delay() -> String {
    "2s".to_string()
}
fn default_request_timeout() -> String {
    "120s".to_string()
}
fn default_min_content_length() -> usize {
    100
}
fn default_max_count() -> u32 {
    10
}

impl Config {
    /// Resolve the database path (relative to data_dir if not absolute).
    pub fn db_path(&self) -> PathBuf {
        let db_path = Path::new(&self.database.path);
        if db_path.is_absolute() {
            db_path.to_path_buf()
        } else {
            self.server.data_dir.join(db_path)
        }
    }

    /// Fill empty credential slots from the environment-style `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fill = |slot: &mut Option<String>, var: &str| {
            if slot.as_deref().is_none_or(|v| v.trim().is_empty()) {
                *slot = lookup(var).filter(|v| !v.trim().is_empty());
            }
        };
        fill(&mut self.providers.groq.api_key, "GROQ_API_KEY");
        fill(&mut self.providers.gemini.api_key, "GEMINI_API_KEY");
        fill(&mut self.providers.backup.api_key, "OPENROUTER_API_KEY");
        fill(&mut self.server.admin_token, "ADMIN_SECRET_KEY");
    }
}

impl GenerationConfig {
    pub fn settings(&self) -> Result<GenerationSettings, ConfigError> {
        Ok(GenerationSettings {
            temperature: self.temperature,
            max_retries: self.max_retries,
            retry_delay: parse_duration("retry_delay", &self.retry_delay)?,
            batch_delay: parse_duration("batch_delay", &self.batch_delay)?,
            min_content_length: self.min_content_length,
            max_count: self.max_count,
        })
    }

    pub fn gemini_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration("gemini_delay", &self.gemini_delay)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("request_timeout", &self.request_timeout)
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::Validation(format!("generation {field} '{value}': {e}")))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(ConfigError::ReadFile)
        .context("reading config file")?;
    let mut config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    config.server.listen.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!("server listen address '{}': {}", config.server.listen, e))
    })?;

    for origin in &config.server.cors_origins {
        if !is_http_url(origin) {
            return Err(ConfigError::Validation(format!("cors origin '{origin}' must be an http(s) URL")).into());
        }
    }

    let slots = [
        ("groq", config.providers.groq.base_url.as_deref()),
        ("gemini", config.providers.gemini.base_url.as_deref()),
        ("backup", config.providers.backup.base_url.as_deref()),
    ];
    for (name, base_url) in slots {
        if let Some(url) = base_url
            && !is_http_url(url)
        {
            return Err(ConfigError::Validation(format!("providers.{name}: base_url '{url}' must be an http(s) URL")).into());
        }
    }

    let generation = &config.generation;
    if !(0.0..=2.0).contains(&generation.temperature) {
        return Err(ConfigError::Validation(format!(
            "generation temperature {} out of range (0.0 to 2.0)",
            generation.temperature
        ))
        .into());
    }
    if !(1..=10).contains(&generation.max_count) {
        return Err(ConfigError::Validation(format!(
            "generation max_count {} out of range (1 to 10)",
            generation.max_count
        ))
        .into());
    }
    if generation.min_content_length == 0 {
        return Err(ConfigError::Validation("generation min_content_length must be positive".to_string()).into());
    }

    generation.settings()?;
    generation.gemini_delay()?;
    generation.request_timeout()?;

    Ok(())
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    rest.is_some_and(|r| !r.is_empty())
}
