use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    retry_base_ms: u64,
}

// OpenAI-compatible chat completions format (used by OpenRouter)
#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    cost: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl LlmClient {
    pub fn new(api_key: &str, base_url: &str, max_retries: u32, retry_base_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            max_retries,
            retry_base_ms,
        }
    }

    /// Single chat completion round-trip, no retries.
    pub async fn complete(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        user_message: &str,
    ) -> Result<LlmResponse> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user_message.to_string(),
        });

        let request = ChatCompletionRequest {
            model: model.to_string(),
            max_tokens: 4096,
            messages,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(30))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, body);
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        let text = api_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
            .trim()
            .to_string();

        let usage = api_response.usage.unwrap_or(ChatUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            cost: None,
        });

        Ok(LlmResponse {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost: usage.cost.unwrap_or(0.0),
        })
    }

    /// Chat completion with exponential backoff. Delay doubles per attempt
    /// starting from `retry_base_ms`.
    pub async fn complete_with_retry(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        user_message: &str,
    ) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match self.complete(model, system_prompt, user_message).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    let delay = self.retry_base_ms * 2u64.pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max = self.max_retries,
                        delay_ms = delay,
                        "LLM call failed, retrying: {err:#}"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }
}
