use crate::provider::{truncate_prompt, DescriptionProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are documenting a codebase. Answer with one or two plain \
sentences describing what the given code does. Do not repeat the code.";

/// Configuration for OpenAI-compatible endpoints (Ollama, LM Studio, hosted APIs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAICompatibleConfig {
    /// Base URL for the API (e.g., "http://localhost:11434/v1")
    pub base_url: String,
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Optional API key (local providers usually need none)
    pub api_key: Option<String>,
    /// Prompt length cap in characters
    pub max_chars: usize,
    pub max_tokens: u32,
    pub provider_name: String,
}

impl Default for OpenAICompatibleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            timeout_secs: 30,
            max_retries: 1,
            api_key: None,
            max_chars: 4000,
            max_tokens: 160,
            provider_name: "openai-compatible".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAICompatibleConfig {
        &self.config
    }

    /// Send a request with retry logic
    async fn send_request(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }

            match self.try_chat_completions_request(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        warn!(
                            "{} request failed (attempt {}/{}), retrying...",
                            self.config.provider_name,
                            attempt + 1,
                            self.config.max_retries.saturating_add(1)
                        );
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    async fn try_chat_completions_request(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: 0.2,
        };

        let mut request_builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            request_builder =
                request_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request_builder.send().await.with_context(|| {
            format!(
                "Failed to send request to {} at {}",
                self.config.provider_name, self.config.base_url
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "{} API error ({}): {}",
                self.config.provider_name,
                status,
                error_text
            ));
        }

        let chat_response: ChatCompletionsResponse =
            response.json().await.with_context(|| {
                format!(
                    "Failed to parse {} chat completions response",
                    self.config.provider_name
                )
            })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in response"))?;
        Ok(choice.message.content.trim().to_string())
    }
}

#[async_trait]
impl DescriptionProvider for OpenAICompatibleProvider {
    async fn describe(&self, prompt: &str) -> String {
        let prompt = truncate_prompt(prompt, self.config.max_chars);
        match self.send_request(prompt).await {
            Ok(text) => {
                debug!("Description received ({} chars)", text.len());
                text
            }
            Err(e) => {
                warn!("Description request failed: {:#}", e);
                String::new()
            }
        }
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }
}

/// Exponential backoff before retry `attempt` (1-based): 1s, 2s, 4s, up to
/// 32s.
fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_secs(2u64.pow(exponent))
}

const MAX_BACKOFF_EXPONENT: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(3), Duration::from_secs(4));
        assert_eq!(retry_delay(6), Duration::from_secs(32));
        assert_eq!(retry_delay(7), Duration::from_secs(32));
        assert_eq!(retry_delay(u32::MAX), Duration::from_secs(32));
    }
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves exactly one HTTP response and returns the request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (base, handle)
    }

    fn provider(base_url: String, max_chars: usize) -> OpenAICompatibleProvider {
        OpenAICompatibleProvider::new(OpenAICompatibleConfig {
            base_url,
            max_retries: 0,
            timeout_secs: 5,
            max_chars,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_describe_returns_first_choice() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"  Parses input.  "}}]}"#,
        )
        .await;
        let text = provider(base, 8).describe("fn parse_input() {}").await;
        assert_eq!(text, "Parses input.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        // prompt truncated to 8 chars
        assert!(request.contains("\"fn parse\""));
    }

    #[tokio::test]
    async fn test_http_error_degrades_to_empty() {
        let (base, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        assert_eq!(provider(base, 100).describe("x").await, "");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades_to_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let text = provider(format!("http://{}/v1", addr), 100).describe("x").await;
        assert_eq!(text, "");
    }
}
