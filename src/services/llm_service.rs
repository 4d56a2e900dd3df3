use crate::api::middleware::AppError;
use crate::config::LlmConfig;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Text completion used for SQL generation and result explanation
#[async_trait::async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AppError>;
}

/// Generative backend reached over an HTTP messages gateway
pub struct HttpGenerativeBackend {
    gateway_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    http_client: HttpClient,
}

impl HttpGenerativeBackend {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            gateway_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            http_client: HttpClient::new(),
        }
    }

    /// Pull the generated text out of a gateway response.
    ///
    /// Accepts the messages shape (`content[0].text`) as well as flat
    /// `text` / `content` / `response` fields.
    fn extract_text(result: &Value) -> Option<&str> {
        result["content"][0]["text"]
            .as_str()
            .or_else(|| result["text"].as_str())
            .or_else(|| result["content"].as_str())
            .or_else(|| result["response"].as_str())
    }
}

#[async_trait::async_trait]
impl GenerativeBackend for HttpGenerativeBackend {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AppError> {
        let mut request = self
            .http_client
            .post(&self.gateway_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "temperature": self.temperature,
                "messages": [{"role": "user", "content": prompt}],
            }));

        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to call LLM service: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LlmService(format!(
                "LLM service returned error {}: {}",
                status, error_text
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to parse LLM response: {}", e)))?;

        Self::extract_text(&result)
            .map(str::to_string)
            .ok_or_else(|| AppError::LlmService("LLM response does not contain any text".to_string()))
    }
}
