use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Failure of a single call against a generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is rate limited")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
    #[error("HTTP request to {provider} failed: {source}")]
    Http {
        provider: String,
        source: reqwest::Error,
    },
    #[error("{provider} returned status {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ProviderError {
    /// Only throttling is considered transient; everything else fails over immediately.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("topic is required")]
    EmptyTopic,
    #[error("count must be between 1 and {max}, got {count}")]
    CountOutOfRange { count: u32, max: u32 },
    #[error("internal link {index} needs both an anchor and a url")]
    InvalidLink { index: usize },
    #[error("generation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
}
