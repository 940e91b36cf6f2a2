//! Planner client for OpenAI-compatible chat completion APIs.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use super::types::{ActionDecision, PlanRequest};
use crate::config::planner_system_prompt;
use crate::retry::{retry_with, Backoff};

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Default timeout for a single planner call, in seconds.
pub const DEFAULT_PLANNER_TIMEOUT_SECS: u64 = 30;

/// Planner client errors.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    #[error("Planner timed out after {0:?}")]
    Timeout(Duration),
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

impl PlannerError {
    /// Network errors, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlannerError::RequestFailed(_) => true,
            PlannerError::ApiError { status, .. } => *status == 429 || *status >= 500,
            PlannerError::ParseError(_)
            | PlannerError::Timeout(_)
            | PlannerError::MaxRetriesExceeded(_, _) => false,
        }
    }
}

/// Anything that can turn a plan request into one action decision.
#[async_trait]
pub trait PlannerClient: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<ActionDecision, PlannerError>;
}

/// Configuration for the planner model.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Base delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Whether the screenshot is attached as an image part.
    pub send_screenshot: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_PLANNER_TIMEOUT_SECS,
            send_screenshot: true,
        }
    }
}

impl PlannerConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Disable image parts for text-only planner models.
    pub fn text_only(mut self) -> Self {
        self.send_screenshot = false;
        self
    }
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Planner backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// Each call is stateless: the request already carries the bounded history.
pub struct HttpPlanner {
    config: PlannerConfig,
    client: Client,
}

impl HttpPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self, PlannerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn build_messages(&self, request: &PlanRequest) -> Vec<Value> {
        let context = request.to_context_json().to_string();
        let mut content = Vec::new();

        if self.config.send_screenshot && !request.state.screenshot_base64.is_empty() {
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/png;base64,{}", request.state.screenshot_base64)
                }
            }));
        }
        content.push(json!({ "type": "text", "text": context }));

        vec![
            json!({ "role": "system", "content": planner_system_prompt(request.actions) }),
            json!({ "role": "user", "content": content }),
        ]
    }

    /// Send a single request to the API.
    async fn send_request(&self, body: &Value) -> Result<ActionDecision, PlannerError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlannerError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PlannerError::ParseError("No choices in response".to_string()))?;

        parse_decision(&content)
    }
}

#[async_trait]
impl PlannerClient for HttpPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<ActionDecision, PlannerError> {
        let body = json!({
            "model": self.config.model_name,
            "messages": self.build_messages(request),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let max_attempts = self.config.max_retries + 1;
        let backoff = Backoff::linear(Duration::from_secs(self.config.retry_delay_secs));

        retry_with(max_attempts, backoff, PlannerError::is_retryable, |attempt| {
            let body = &body;
            async move {
                let result = self.send_request(body).await;
                if let Err(e) = &result {
                    tracing::warn!(attempt, max_attempts, "Planner request failed: {}", e);
                }
                result
            }
        })
        .await
        .map_err(|e| {
            if e.is_retryable() {
                PlannerError::MaxRetriesExceeded(self.config.max_retries, e.to_string())
            } else {
                e
            }
        })
    }
}

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced json regex")
});

/// Extract the decision object from the model's reply.
///
/// Accepts bare JSON, JSON in a fenced code block, or JSON embedded after
/// free-form reasoning text.
pub fn parse_decision(content: &str) -> Result<ActionDecision, PlannerError> {
    let trimmed = content.trim();

    let candidate = if let Some(caps) = FENCED_JSON.captures(trimmed) {
        caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed)
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => {
                return Err(PlannerError::ParseError(format!(
                    "No JSON object in planner reply: {}",
                    truncate(trimmed, 120)
                )))
            }
        }
    };

    serde_json::from_str::<ActionDecision>(candidate)
        .map_err(|e| PlannerError::ParseError(format!("{}: {}", e, truncate(candidate, 120))))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_config_default() {
        let config = PlannerConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.send_screenshot);
    }

    #[test]
    fn test_planner_config_builder() {
        let config = PlannerConfig::default()
            .with_base_url("https://api.example.com/v1")
            .with_model_name("planner-large")
            .with_timeout(5)
            .text_only();
        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.model_name, "planner-large");
        assert_eq!(config.timeout_secs, 5);
        assert!(!config.send_screenshot);
    }

    #[test]
    fn test_parse_bare_json() {
        let decision = parse_decision(r#"{"action": "back", "isComplete": false}"#).unwrap();
        assert_eq!(decision.action, "back");
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "I should open settings.\n```json\n{\"action\": \"start_app\", \"parameters\": {\"app_name\": \"settings\"}}\n```";
        let decision = parse_decision(content).unwrap();
        assert_eq!(decision.action, "start_app");
        assert_eq!(decision.parameters["app_name"], "settings");
    }

    #[test]
    fn test_parse_json_after_reasoning() {
        let content = r#"The task is done. {"action": "complete", "isComplete": true}"#;
        let decision = parse_decision(content).unwrap();
        assert!(decision.completes_task());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_decision("tap the button please").unwrap_err();
        assert!(matches!(err, PlannerError::ParseError(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_statuses() {
        let server = PlannerError::ApiError {
            status: 503,
            body: String::new(),
        };
        let client = PlannerError::ApiError {
            status: 400,
            body: String::new(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }
}
