use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::{ChatClient, ChatRequest};
use crate::error::{GenerationError, ProviderError};
use crate::extract::ResponseExtractor;
use crate::models::{GenerationOutcome, InternalLink};
use crate::prompt::PromptBuilder;
use crate::providers::{ProviderConfig, ProviderRegistry};

pub const NO_PROVIDERS: &str = "No AI providers configured";

/// Tunables for one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f64,
    /// Retries after the first rate-limited call to the same provider.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between posts of a batch.
    pub batch_delay: Duration,
    pub min_content_length: usize,
    pub max_count: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            batch_delay: Duration::from_secs(2),
            min_content_length: 100,
            max_count: 10,
        }
    }
}

/// Per-attempt states. Every transition is a value returned by the step that produced it.
#[derive(Debug)]
enum State {
    SelectProvider,
    Pace { index: usize },
    Call { index: usize, attempt: u32 },
    Accept { index: usize, raw: String },
    Done(GenerationOutcome),
}

/// What to do after a provider call.
#[derive(Debug)]
enum Verdict {
    Accept(String),
    Retry(ProviderError),
    NextProvider(ProviderError),
}

fn judge(result: Result<String, ProviderError>, attempt: u32, max_retries: u32) -> Verdict {
    match result {
        Ok(raw) => Verdict::Accept(raw),
        Err(e) if e.is_rate_limit() && attempt < max_retries => Verdict::Retry(e),
        Err(e) => Verdict::NextProvider(e),
    }
}

/// Tries providers in priority order and returns the first usable post.
#[derive(Clone)]
pub struct Generator {
    registry: ProviderRegistry,
    client: Arc<dyn ChatClient>,
    prompts: PromptBuilder,
    extractor: ResponseExtractor,
    settings: GenerationSettings,
}

impl Generator {
    pub fn new(registry: ProviderRegistry, client: Arc<dyn ChatClient>, settings: GenerationSettings) -> Self {
        Self {
            registry,
            client,
            prompts: PromptBuilder::default(),
            extractor: ResponseExtractor::new(settings.min_content_length),
            settings,
        }
    }

    /// Swap the topic catalog used to resolve topic ids in prompts.
    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn is_available(&self) -> bool {
        self.registry.is_available()
    }

    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.registry.list_available()
    }

    /// Generate a single post. Only cancellation is an `Err`; exhaustion is a failure outcome.
    pub async fn generate_post(
        &self,
        topic: &str,
        internal_links: &[InternalLink],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let providers = self.registry.list_available();
        if providers.is_empty() {
            warn!(topic = %topic, "no generation providers configured");
            return Ok(GenerationOutcome::Failure(NO_PROVIDERS.to_string()));
        }

        let topic_info = self.prompts.resolve(topic);
        let prompt = self.prompts.build(topic, internal_links);
        let request = ChatRequest {
            system: prompt.system,
            user: prompt.user,
            temperature: self.settings.temperature,
        };

        let mut next = 0;
        let mut last_error: Option<ProviderError> = None;
        let mut state = State::SelectProvider;

        loop {
            state = match state {
                State::SelectProvider => match providers.get(next) {
                    Some(provider) => {
                        info!(provider = %provider.name, model = %provider.model, "attempting generation");
                        next += 1;
                        State::Pace { index: next - 1 }
                    }
                    None => {
                        let message = match &last_error {
                            Some(e) => format!("All AI providers failed. Last error: {e}"),
                            None => "All AI providers failed".to_string(),
                        };
                        error!(topic = %topic, "{message}");
                        State::Done(GenerationOutcome::Failure(message))
                    }
                },
                State::Pace { index } => {
                    if let Some(delay) = providers[index].pre_call_delay {
                        info!(provider = %providers[index].name, delay_ms = delay.as_millis() as u64, "pacing before call");
                        pause(delay, cancel).await?;
                    }
                    State::Call { index, attempt: 0 }
                }
                State::Call { index, attempt } => {
                    let provider = &providers[index];
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                        r = self.client.complete(provider, &request) => r,
                    };

                    match judge(result, attempt, self.settings.max_retries) {
                        Verdict::Accept(raw) => State::Accept { index, raw },
                        Verdict::Retry(e) => {
                            let retry_after_secs = match &e {
                                ProviderError::RateLimited { retry_after_secs, .. } => *retry_after_secs,
                                _ => None,
                            };
                            warn!(
                                provider = %provider.name,
                                retry_after_secs = ?retry_after_secs,
                                retries_left = self.settings.max_retries - attempt,
                                delay_ms = self.settings.retry_delay.as_millis() as u64,
                                "rate limited, retrying"
                            );
                            pause(self.settings.retry_delay, cancel).await?;
                            State::Call {
                                index,
                                attempt: attempt + 1,
                            }
                        }
                        Verdict::NextProvider(e) => {
                            error!(provider = %provider.name, error = %e, "provider failed");
                            last_error = Some(e);
                            State::SelectProvider
                        }
                    }
                }
                State::Accept { index, raw } => {
                    let mut post = self.extractor.extract(&raw, &topic_info);
                    post.provider = providers[index].name.clone();
                    info!(provider = %post.provider, title = %post.title, "post generated");
                    State::Done(GenerationOutcome::Success(post))
                }
                State::Done(outcome) => return Ok(outcome),
            };
        }
    }
}

/// Sleep unless cancelled first.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), GenerationError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
