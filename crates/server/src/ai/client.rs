//! Claude API client for the Anthropic Messages API

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AiError, CompletionService, GenerationOptions, ResponseFormat};
use crate::BoxFuture;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const JSON_SYSTEM_PROMPT: &str = "You are a clinical data assistant that answers only with valid JSON. \
Do not wrap the JSON in Markdown code fences and do not add any text before or after it.";

/// Client for the Anthropic Claude Messages API
#[derive(Clone)]
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

/// Content block within a response
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Request body for the Messages API
#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'static str>,
    messages: Vec<Message>,
}

/// Response from the Messages API
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

/// Error detail from the Messages API
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ClaudeClient {
    /// Create a new client. `timeout` bounds every request end to end.
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Result<Self, AiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single user turn and return the first text block
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String, AiError> {
        let request = ApiRequest {
            model: &self.model,
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
            system: match options.response_format {
                ResponseFormat::Json => Some(JSON_SYSTEM_PROMPT),
                ResponseFormat::Text => None,
            },
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AiError::Api { status, message });
        }

        let response = response.json::<ApiResponse>().await?;
        extract_text(&response)
    }
}

/// Extract text content from an API response
fn extract_text(response: &ApiResponse) -> Result<String, AiError> {
    response
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.clone()),
            ContentBlock::Other => None,
        })
        .ok_or(AiError::EmptyResponse)
}

impl CompletionService for ClaudeClient {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String, AiError>> {
        Box::pin(self.complete(prompt, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_block_wins() {
        let response: ApiResponse = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "content": [
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "{\"requiredTerms\": []}"}
                ],
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();
        assert_eq!(extract_text(&response).unwrap(), "{\"requiredTerms\": []}");
    }

    #[test]
    fn response_without_text_is_empty() {
        let response: ApiResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(matches!(extract_text(&response), Err(AiError::EmptyResponse)));
    }

    #[test]
    fn json_requests_carry_system_prompt() {
        let request = ApiRequest {
            model: DEFAULT_MODEL,
            max_tokens: 512,
            temperature: 0.0,
            system: Some(JSON_SYSTEM_PROMPT),
            messages: vec![Message {
                role: "user",
                content: "hi".into(),
            }],
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body["system"].as_str().unwrap().contains("valid JSON"));
    }

    #[test]
    fn defaults_model() {
        let client = ClaudeClient::new("key".into(), None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
    }
}
