use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::limiter::HostRateLimiter;
use crate::predict::prompt::SYSTEM_PROMPT;

/// A text-completion endpoint. Implementations return the raw model text;
/// validation happens in the fan-out.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpChatProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    limiter: Arc<HostRateLimiter>,
}

impl HttpChatProvider {
    pub fn new(config: ProviderConfig, limiter: Arc<HostRateLimiter>, timeout: Duration) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Arc::new(Self {
            client,
            config,
            limiter,
        }))
    }

    fn error(&self, reason: impl Into<String>) -> AppError {
        AppError::Provider {
            provider: self.config.name.clone(),
            reason: reason.into(),
        }
    }
}

fn first_content(resp: ChatResponse) -> Option<String> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl PredictionProvider for HttpChatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.limiter.acquire_url(&self.config.api_url).await;

        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.3,
        });

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(self.error(format!("HTTP {status}: {snippet}")));
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = first_content(parsed).ok_or_else(|| self.error("empty completion"))?;
        debug!(provider = %self.config.name, chars = content.len(), "Completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_content_is_extracted() {
        let raw = r#"{"id":"c1","object":"chat.completion","choices":[
            {"index":0,"message":{"role":"assistant","content":"{\"homeWin\":50}"},"finish_reason":"stop"},
            {"index":1,"message":{"role":"assistant","content":"ignored"}}
        ]}"#;
        let resp: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_content(resp).as_deref(), Some("{\"homeWin\":50}"));
    }

    #[test]
    fn empty_or_missing_content_is_none() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_content(resp).is_none());
        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#).unwrap();
        assert!(first_content(resp).is_none());
        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(first_content(resp).is_none());
    }
}
