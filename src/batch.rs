use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::GenerationError;
use crate::generate::{Generator, NO_PROVIDERS, pause};
use crate::models::{GenerationOutcome, GenerationRequest};

impl Generator {
    /// Generate `request.count` posts one after another, pausing between attempts.
    ///
    /// Individual failures are recorded as outcomes; only an invalid request or cancellation
    /// aborts the batch.
    pub async fn generate_batch(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<GenerationOutcome>, GenerationError> {
        request.validate(self.settings().max_count)?;

        if !self.is_available() {
            return Ok(vec![GenerationOutcome::Failure(NO_PROVIDERS.to_string())]);
        }

        let count = request.count as usize;
        let mut outcomes = Vec::with_capacity(count);
        for i in 0..count {
            info!(topic = %request.topic, post = i + 1, total = count, "generating post");
            let outcome = self
                .generate_post(&request.topic, &request.internal_links, cancel)
                .await?;
            outcomes.push(outcome);

            if i + 1 < count {
                pause(self.settings().batch_delay, cancel).await?;
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(topic = %request.topic, succeeded, failed = count - succeeded, "batch finished");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::client::testing::{Reply, ScriptedClient};
    use crate::generate::GenerationSettings;
    use crate::providers::{ProviderConfig, ProviderKind, ProviderRegistry};

    const GROQ: &str = "Groq (Llama 3)";

    fn generator(providers: Vec<ProviderConfig>, client: Arc<ScriptedClient>) -> Generator {
        Generator::new(
            ProviderRegistry::from_providers(providers),
            client,
            GenerationSettings::default(),
        )
    }

    fn groq() -> Vec<ProviderConfig> {
        vec![ProviderConfig::new(ProviderKind::Groq, "g")]
    }

    #[tokio::test(start_paused = true)]
    async fn failures_keep_the_batch_going() {
        let client = Arc::new(ScriptedClient::new().script(GROQ, vec![Reply::Fail(500)]));
        let generator = generator(groq(), client.clone());

        let start = Instant::now();
        let outcomes = generator
            .generate_batch(&GenerationRequest::new("design", 3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| !o.is_success()));
        assert_eq!(client.calls_for(GROQ), 3);
        // Two pauses between three posts, none after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_outcomes_keep_request_order() {
        let client = Arc::new(ScriptedClient::new().script(
            GROQ,
            vec![Reply::Fail(400), Reply::Text("plain text body".to_string())],
        ));
        let generator = generator(groq(), client);

        let outcomes = generator
            .generate_batch(&GenerationRequest::new("seo", 2), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn no_providers_short_circuits() {
        let client = Arc::new(ScriptedClient::new());
        let generator = generator(Vec::new(), client.clone());

        let outcomes = generator
            .generate_batch(&GenerationRequest::new("design", 5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes, vec![GenerationOutcome::Failure(NO_PROVIDERS.to_string())]);
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_is_rejected_before_any_call() {
        let client = Arc::new(ScriptedClient::new());
        let generator = generator(groq(), client.clone());

        let result = generator
            .generate_batch(&GenerationRequest::new("design", 11), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(GenerationError::CountOutOfRange { count: 11, max: 10 })));

        let result = generator
            .generate_batch(&GenerationRequest::new("", 1), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(GenerationError::EmptyTopic)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_batch_returns_error() {
        let client = Arc::new(ScriptedClient::new().script(GROQ, vec![Reply::Fail(500)]));
        let generator = generator(groq(), client.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = generator
            .generate_batch(&GenerationRequest::new("design", 3), &cancel)
            .await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));
        assert!(client.calls().is_empty());
    }
}
