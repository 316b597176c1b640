//! Language model seam used by the flows.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AiConfig;
use crate::utils::retry::{retry_async_when, RetryConfig};

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(String),
    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model request timed out after {0}s")]
    Timeout(u64),
    #[error("model returned invalid JSON: {0}")]
    InvalidJson(String),
    #[error("model returned an empty response")]
    EmptyResponse,
}

impl ModelError {
    fn is_transient(&self) -> bool {
        match self {
            ModelError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            ModelError::Http(_) => true,
            _ => false,
        }
    }
}

/// One JSON-mode generation call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub flow: &'static str,
    pub system: String,
    pub prompt: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model's reply parsed as JSON.
    async fn generate_json(&self, request: &ModelRequest) -> Result<Value, ModelError>;
}

/// Client for the Generative Language `generateContent` endpoint.
pub struct GeminiModel {
    client: Client,
    config: AiConfig,
    retry: RetryConfig,
}

impl GeminiModel {
    pub fn new(config: AiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            config,
            retry: RetryConfig {
                max_attempts: 3,
                base_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(4),
                jitter_max: Some(Duration::from_millis(250)),
            },
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn call_once(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": self.config.temperature,
            },
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.config.timeout_seconds)
                } else {
                    ModelError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidJson(format!("Failed to parse response: {}", e)))?;

        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        parse_reply(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate_json(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        tracing::debug!(flow = request.flow, model = %self.config.model, "Calling model");
        retry_async_when(
            self.retry.clone(),
            || self.call_once(request),
            |err| {
                let transient = err.is_transient();
                if transient {
                    tracing::warn!(flow = request.flow, "Model call failed, retrying: {}", err);
                }
                transient
            },
        )
        .await
    }
}

/// Parses a JSON-mode reply, tolerating a Markdown code fence around it.
pub fn parse_reply(text: &str) -> Result<Value, ModelError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| ModelError::InvalidJson(format!("model output is not valid JSON: {}", e)))
}

/// Replays canned replies in order; the last one repeats. Used by tests and
/// local runs without model credentials.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Value, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Value) -> Self {
        Self::new(vec![Ok(reply)])
    }

    pub fn failing(error: ModelError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate_json(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let mut replies = self
            .replies
            .lock()
            .map_err(|_| ModelError::Http("scripted model poisoned".to_string()))?;
        match replies.len() {
            0 => Err(ModelError::EmptyResponse),
            1 => replies[0].clone(),
            _ => replies.pop_front().unwrap_or(Err(ModelError::EmptyResponse)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            flow: "test",
            system: "system".to_string(),
            prompt: "prompt".to_string(),
        }
    }

    #[test]
    fn parse_reply_strips_code_fence() {
        let fenced = "```json\n{\"summary\": \"ok\"}\n```";
        assert_eq!(parse_reply(fenced).unwrap()["summary"], "ok");
        assert_eq!(parse_reply(" {\"a\": 1} ").unwrap()["a"], 1);
        assert!(matches!(
            parse_reply("not json"),
            Err(ModelError::InvalidJson(_))
        ));
    }

    #[test]
    fn transient_errors() {
        assert!(ModelError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(ModelError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::EmptyResponse.is_transient());
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new(vec![
            Ok(json!({ "n": 1 })),
            Err(ModelError::Timeout(5)),
            Ok(json!({ "n": 3 })),
        ]);

        assert_eq!(model.generate_json(&request()).await.unwrap()["n"], 1);
        assert!(model.generate_json(&request()).await.is_err());
        assert_eq!(model.generate_json(&request()).await.unwrap()["n"], 3);
        assert_eq!(model.generate_json(&request()).await.unwrap()["n"], 3);
        assert_eq!(model.requests().len(), 4);
    }
}
