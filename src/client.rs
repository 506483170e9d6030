use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::providers::ProviderConfig;

/// One chat-completion request: a system and a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

/// Transport to a generation provider. Returns the raw completion text.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, provider: &ProviderConfig, request: &ChatRequest) -> Result<String, ProviderError>;
}

/// OpenAI-compatible `/chat/completions` client over reqwest.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    client: reqwest::Client,
}

impl HttpChatClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quillpress/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, provider: &ProviderConfig, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", provider.base_url);
        let body = serde_json::json!({
            "model": provider.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
        });

        let mut builder = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", provider.api_key))
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &provider.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(provider = %provider.name, model = %provider.model, url = %url, "sending completion request");

        let response = builder.json(&body).send().await.map_err(|source| ProviderError::Http {
            provider: provider.name.clone(),
            source,
        })?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(ProviderError::RateLimited {
                provider: provider.name.clone(),
                retry_after_secs,
            });
        }

        let text = response.text().await.map_err(|source| ProviderError::Http {
            provider: provider.name.clone(),
            source,
        })?;

        let json: Option<Value> = serde_json::from_str(&text).ok();
        let error_body = json.as_ref().and_then(error_object);

        if let Some(error) = error_body
            && signals_rate_limit(error)
        {
            return Err(ProviderError::RateLimited {
                provider: provider.name.clone(),
                retry_after_secs: None,
            });
        }

        if !status.is_success() || error_body.is_some() {
            let message = error_body
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| text.chars().take(500).collect());
            return Err(ProviderError::Api {
                provider: provider.name.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let content = json
            .as_ref()
            .and_then(|j| j.get("choices"))
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: provider.name.clone(),
                message: "missing choices[0].message.content".to_string(),
            })?;

        if content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: provider.name.clone(),
                message: "empty completion".to_string(),
            });
        }

        Ok(content.to_string())
    }
}

/// `{"error": {...}}`, or the first element of `[{"error": {...}}]`.
fn error_object(json: &Value) -> Option<&Value> {
    let root = match json {
        Value::Array(items) => items.first()?,
        other => other,
    };
    root.get("error").filter(|e| e.is_object())
}

fn signals_rate_limit(error: &Value) -> bool {
    let code_is_429 = match error.get("code") {
        Some(Value::Number(n)) => n.as_u64() == Some(429),
        Some(Value::String(s)) => s == "429",
        _ => false,
    };
    code_is_429 || error.get("status").and_then(Value::as_str) == Some("RESOURCE_EXHAUSTED")
}


/// Scripted transport for exercising the orchestrator without a network.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChatClient, ChatRequest};
    use crate::error::ProviderError;
    use crate::providers::ProviderConfig;

    #[derive(Debug, Clone)]
    pub enum Reply {
        Text(String),
        RateLimited,
        Fail(u16),
    }

    /// Replies are consumed per provider name; the last one repeats forever.
    #[derive(Default)]
    pub struct ScriptedClient {
        scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, provider: &str, replies: Vec<Reply>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(provider.to_string(), replies.into());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_for(&self, provider: &str) -> usize {
            self.calls().iter().filter(|c| c.as_str() == provider).count()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, provider: &ProviderConfig, _request: &ChatRequest) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push(provider.name.clone());

            let reply = {
                let mut scripts = self.scripts.lock().unwrap();
                match scripts.get_mut(&provider.name) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };

            match reply {
                Some(Reply::Text(text)) => Ok(text),
                Some(Reply::RateLimited) => Err(ProviderError::RateLimited {
                    provider: provider.name.clone(),
                    retry_after_secs: None,
                }),
                Some(Reply::Fail(status)) => Err(ProviderError::Api {
                    provider: provider.name.clone(),
                    status,
                    message: "scripted failure".to_string(),
                }),
                None => Err(ProviderError::Api {
                    provider: provider.name.clone(),
                    status: 500,
                    message: "no script".to_string(),
                }),
            }
        }
    }
}
