//! OpenAI-compatible chat-completions oracle over blocking HTTP.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ChatOracleConfig;
use crate::io::oracle::{ChatMessage, Oracle};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatOracle {
    config: ChatOracleConfig,
    api_key: String,
    http: Client,
}

impl ChatOracle {
    /// Build the client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &ChatOracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("read API key from ${}", config.api_key_env))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("autoplay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            config: config.clone(),
            api_key,
            http,
        })
    }

    fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, Attempt> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| Attempt::Retryable(anyhow!(e).context("send chat request")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let err = anyhow!("chat endpoint returned {status}: {}", text.trim());
            return Err(if is_retryable_status(status) {
                Attempt::Retryable(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        let text = response
            .text()
            .map_err(|e| Attempt::Retryable(anyhow!(e).context("read chat response")))?;
        parse_reply(&text).map_err(Attempt::Fatal)
    }
}

enum Attempt {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl Oracle for ChatOracle {
    #[instrument(skip_all, fields(model = %self.config.model, messages = messages.len()))]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut attempt = 0u32;
        loop {
            info!(attempt, "consulting chat oracle");
            match self.send_once(&body) {
                Ok(reply) => {
                    debug!(reply_bytes = reply.len(), "chat oracle replied");
                    return Ok(reply);
                }
                Err(Attempt::Retryable(err)) if attempt < self.config.max_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(
                        err = %format!("{err:#}"),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "chat request failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(Attempt::Retryable(err) | Attempt::Fatal(err)) => return Err(err),
            }
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Extract the first choice's content from a chat-completions response body.
fn parse_reply(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body).context("parse chat response")?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("chat response has no choices"))?;
    Ok(choice.message.content.unwrap_or_default())
}
